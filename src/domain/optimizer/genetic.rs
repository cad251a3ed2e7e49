//! Genetic search over factor weight vectors.
//!
//! Each generation: evaluate, keep the top `elitism` individuals, draw the
//! remaining parents by roulette wheel, pair them for convex crossover,
//! mutate with Gaussian noise and renormalize to the simplex. A single
//! seeded `Pcg64` stream drives every random draw, so a seed fully
//! determines the run.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use tracing::info;

use super::FitnessOracle;
use crate::domain::error::RotatraderError;
use crate::domain::indicator::Factor;
use crate::domain::metrics::FITNESS_FLOOR;
use crate::domain::scoring::FactorWeights;

const GENES: usize = Factor::ALL.len();

/// Added to shifted fitness so the worst individual keeps a non-zero slice.
const ROULETTE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct GaConfig {
    pub seed: u64,
    pub pop_size: usize,
    pub generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub mutation_scale: f64,
    pub elitism: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            seed: 42,
            pop_size: 16,
            generations: 12,
            crossover_rate: 0.8,
            mutation_rate: 0.15,
            mutation_scale: 0.1,
            elitism: 2,
        }
    }
}

impl GaConfig {
    pub fn validate(&self) -> Result<(), RotatraderError> {
        if self.pop_size == 0 {
            return Err(RotatraderError::invalid("ga", "pop_size", "must be at least 1"));
        }
        if self.generations == 0 {
            return Err(RotatraderError::invalid("ga", "generations", "must be at least 1"));
        }
        if self.elitism > self.pop_size {
            return Err(RotatraderError::invalid(
                "ga",
                "elitism",
                "must not exceed pop_size",
            ));
        }
        for (key, rate) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(RotatraderError::invalid("ga", key, "must be within [0, 1]"));
            }
        }
        if !(self.mutation_scale >= 0.0) || !self.mutation_scale.is_finite() {
            return Err(RotatraderError::invalid(
                "ga",
                "mutation_scale",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// One weight per factor, in `Factor::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Individual {
    pub genes: [f64; GENES],
}

impl Individual {
    /// Clip negatives to zero and rescale to sum 1; all-zero becomes uniform.
    pub fn normalized(genes: [f64; GENES]) -> Self {
        let clipped = genes.map(|g| if g > 0.0 { g } else { 0.0 });
        let sum: f64 = clipped.iter().sum();
        let genes = if sum > 0.0 && sum.is_finite() {
            clipped.map(|g| g / sum)
        } else {
            [1.0 / GENES as f64; GENES]
        };
        Individual { genes }
    }

    pub fn to_weights(&self) -> FactorWeights {
        Factor::ALL.into_iter().zip(self.genes).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    /// The evaluated population, in order.
    pub population: Vec<Individual>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaOutcome {
    pub best: Individual,
    pub best_fitness: f64,
    pub history: Vec<GenerationSummary>,
}

impl GaOutcome {
    pub fn best_weights(&self) -> FactorWeights {
        self.best.to_weights()
    }
}

pub struct GeneticOptimizer {
    config: GaConfig,
}

impl GeneticOptimizer {
    pub fn new(config: GaConfig) -> Self {
        GeneticOptimizer { config }
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    pub fn run<O>(&self, oracle: &O) -> Result<GaOutcome, RotatraderError>
    where
        O: FitnessOracle + ?Sized,
    {
        self.config.validate()?;
        let cfg = &self.config;
        let mut rng = Pcg64::seed_from_u64(cfg.seed);
        let noise = Normal::new(0.0, cfg.mutation_scale)
            .map_err(|e| RotatraderError::invalid("ga", "mutation_scale", e.to_string()))?;

        let mut population: Vec<Individual> = (0..cfg.pop_size)
            .map(|_| Individual::normalized(std::array::from_fn(|_| rng.r#gen::<f64>())))
            .collect();

        let mut best: Option<(Individual, f64)> = None;
        let mut history = Vec::with_capacity(cfg.generations);

        for generation in 0..cfg.generations {
            let fitness = evaluate_population(oracle, &population);

            let (gen_idx, gen_best) = argmax(&fitness);
            let mean = fitness.iter().sum::<f64>() / fitness.len() as f64;
            if best.as_ref().is_none_or(|(_, f)| gen_best > *f) {
                best = Some((population[gen_idx], gen_best));
            }
            info!(generation, best = gen_best, mean, "ga generation");
            history.push(GenerationSummary {
                generation,
                best_fitness: gen_best,
                mean_fitness: mean,
                population: population.clone(),
            });

            let n_children = cfg.pop_size - cfg.elitism;
            let mut next = elites(&population, &fitness, cfg.elitism);
            let parents = roulette_select(&population, &fitness, n_children, &mut rng);
            next.extend(breed(&parents, n_children, cfg, &noise, &mut rng));
            next.truncate(cfg.pop_size);
            population = next;
        }

        let (best, best_fitness) = best.ok_or_else(|| {
            RotatraderError::degenerate("genetic search evaluated no individuals")
        })?;
        Ok(GaOutcome {
            best,
            best_fitness,
            history,
        })
    }
}

fn evaluate_population<O>(oracle: &O, population: &[Individual]) -> Vec<f64>
where
    O: FitnessOracle + ?Sized,
{
    population
        .par_iter()
        .map(|ind| {
            let f = oracle.fitness(&ind.to_weights());
            if f.is_finite() { f } else { FITNESS_FLOOR }
        })
        .collect()
}

/// First index of the maximum.
fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) })
}

/// Top `count` individuals by fitness, descending; ties keep population order.
fn elites(population: &[Individual], fitness: &[f64], count: usize) -> Vec<Individual> {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]));
    order.into_iter().take(count).map(|i| population[i]).collect()
}

/// Fitness-proportionate draws with replacement, one uniform per draw.
pub fn roulette_select<R: Rng>(
    population: &[Individual],
    fitness: &[f64],
    count: usize,
    rng: &mut R,
) -> Vec<Individual> {
    if population.is_empty() {
        return Vec::new();
    }
    let min = fitness.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = fitness.iter().map(|f| f - min + ROULETTE_EPSILON).collect();
    let total: f64 = shifted.iter().sum();
    let n = population.len();
    let probs: Vec<f64> = shifted
        .iter()
        .map(|s| if total > 0.0 { s / total } else { 1.0 / n as f64 })
        .collect();

    (0..count)
        .map(|_| {
            let r: f64 = rng.r#gen();
            let mut cum = 0.0;
            let idx = probs
                .iter()
                .position(|p| {
                    cum += p;
                    r <= cum
                })
                .unwrap_or(n - 1);
            population[idx]
        })
        .collect()
}

/// Children from consecutive parent pairs, the last parent wrapping to the
/// first when the count is odd.
fn breed<R: Rng>(
    parents: &[Individual],
    count: usize,
    cfg: &GaConfig,
    noise: &Normal<f64>,
    rng: &mut R,
) -> Vec<Individual> {
    let mut children = Vec::with_capacity(parents.len() + 1);
    for i in (0..parents.len()).step_by(2) {
        let p1 = &parents[i];
        let p2 = &parents[(i + 1) % parents.len()];
        let (c1, c2) = crossover(p1, p2, cfg.crossover_rate, rng);
        let c1 = mutate(c1, cfg.mutation_rate, noise, rng);
        let c2 = mutate(c2, cfg.mutation_rate, noise, rng);
        children.push(Individual::normalized(c1));
        children.push(Individual::normalized(c2));
    }
    children.truncate(count);
    children
}

/// Convex blend with a single shared coefficient, or plain copies when the
/// crossover draw exceeds `rate`.
pub fn crossover<R: Rng>(
    p1: &Individual,
    p2: &Individual,
    rate: f64,
    rng: &mut R,
) -> ([f64; GENES], [f64; GENES]) {
    if rng.r#gen::<f64>() > rate {
        return (p1.genes, p2.genes);
    }
    let alpha: f64 = rng.r#gen();
    let c1 = std::array::from_fn(|k| alpha * p1.genes[k] + (1.0 - alpha) * p2.genes[k]);
    let c2 = std::array::from_fn(|k| alpha * p2.genes[k] + (1.0 - alpha) * p1.genes[k]);
    (c1, c2)
}

/// Per gene: with probability `rate`, add noise and floor at zero.
pub fn mutate<R: Rng>(
    mut genes: [f64; GENES],
    rate: f64,
    noise: &Normal<f64>,
    rng: &mut R,
) -> [f64; GENES] {
    for g in genes.iter_mut() {
        if rng.r#gen::<f64>() < rate {
            *g += noise.sample(rng);
            if *g < 0.0 {
                *g = 0.0;
            }
        }
    }
    genes
}
