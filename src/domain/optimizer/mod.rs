//! Parameter search over the backtest engine.
//!
//! - [`genetic`]: evolves factor weight vectors, fitness = CAGR
//! - [`grid`]: exhaustive search over discrete parameter sets, fitness = Sharpe
//!
//! Fitness evaluations are independent and run on the rayon pool; results are
//! gathered in input order so every run is reproducible.

pub mod genetic;
pub mod grid;

use crate::domain::backtest::{run_backtest, StrategyParams};
use crate::domain::indicator::IndicatorSet;
use crate::domain::matrix::PriceMatrix;
use crate::domain::metrics::{cagr_fitness, FITNESS_FLOOR};
use crate::domain::scoring::{score_from_weights, FactorWeights};

/// Scores one weight mapping. Implementations must be pure.
pub trait FitnessOracle: Sync {
    fn fitness(&self, weights: &FactorWeights) -> f64;
}

impl<F> FitnessOracle for F
where
    F: Fn(&FactorWeights) -> f64 + Sync,
{
    fn fitness(&self, weights: &FactorWeights) -> f64 {
        self(weights)
    }
}

/// CAGR of a full backtest over fixed prices. Indicators do not depend on
/// the weights, so they are computed once up front.
pub struct BacktestFitness<'a> {
    prices: &'a PriceMatrix,
    indicators: IndicatorSet,
    params: StrategyParams,
}

impl<'a> BacktestFitness<'a> {
    pub fn new(prices: &'a PriceMatrix, indicators: IndicatorSet, params: StrategyParams) -> Self {
        BacktestFitness {
            prices,
            indicators,
            params,
        }
    }
}

impl FitnessOracle for BacktestFitness<'_> {
    fn fitness(&self, weights: &FactorWeights) -> f64 {
        let scores = score_from_weights(&self.indicators, weights);
        match run_backtest(self.prices, &scores, &self.params) {
            Ok(result) => cagr_fitness(&result.value_series()),
            Err(_) => FITNESS_FLOOR,
        }
    }
}
