//! Exhaustive search over a discrete parameter grid.
//!
//! Every combination is merged over [`ParamSet::default`], scored with the
//! three-factor signal model and backtested. The winner is the combination
//! with the strictly highest finite Sharpe ratio, first in enumeration order
//! on ties.

use itertools::iproduct;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::backtest::{run_backtest, StrategyParams};
use crate::domain::matrix::PriceMatrix;
use crate::domain::signals::{compute_signals, SignalParams};

/// One point of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    pub lookback_mom_days: usize,
    pub skip_last_days_for_mom: usize,
    pub donchian_high_days: usize,
    pub top_n: usize,
    pub fixed_stop_loss: f64,
    pub trailing_stop: f64,
    /// Momentum, proximity, breakout.
    pub weights: [f64; 3],
}

impl Default for ParamSet {
    fn default() -> Self {
        ParamSet {
            lookback_mom_days: 252,
            skip_last_days_for_mom: 21,
            donchian_high_days: 100,
            top_n: 20,
            fixed_stop_loss: 0.10,
            trailing_stop: 0.15,
            weights: [0.6, 0.3, 0.1],
        }
    }
}

impl ParamSet {
    pub fn signal_params(&self) -> SignalParams {
        SignalParams {
            lookback_mom_days: self.lookback_mom_days,
            skip_last_days_for_mom: self.skip_last_days_for_mom,
            donchian_high_days: self.donchian_high_days,
            weights: self.weights,
        }
    }

    /// `base` with this set's top-N and stop thresholds.
    pub fn strategy_params(&self, base: &StrategyParams) -> StrategyParams {
        StrategyParams {
            top_n: self.top_n,
            fixed_stop_loss: self.fixed_stop_loss,
            trailing_stop: self.trailing_stop,
            ..base.clone()
        }
    }
}

/// Candidate values per parameter. An empty axis uses the default value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub lookback_mom_days: Vec<usize>,
    pub skip_last_days_for_mom: Vec<usize>,
    pub donchian_high_days: Vec<usize>,
    pub top_n: Vec<usize>,
    pub fixed_stop_loss: Vec<f64>,
    pub trailing_stop: Vec<f64>,
    pub weights: Vec<[f64; 3]>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            lookback_mom_days: vec![252, 126],
            skip_last_days_for_mom: vec![21],
            donchian_high_days: vec![55, 100],
            top_n: vec![15, 20],
            fixed_stop_loss: vec![0.08, 0.10],
            trailing_stop: vec![0.12, 0.15],
            weights: vec![[0.6, 0.3, 0.1], [0.5, 0.3, 0.2]],
        }
    }
}

fn axis<T: Clone>(values: &[T], default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values.to_vec()
    }
}

impl ParamGrid {
    /// Cartesian product, first axis varying slowest.
    pub fn combinations(&self) -> Vec<ParamSet> {
        let d = ParamSet::default();
        iproduct!(
            axis(&self.lookback_mom_days, d.lookback_mom_days),
            axis(&self.skip_last_days_for_mom, d.skip_last_days_for_mom),
            axis(&self.donchian_high_days, d.donchian_high_days),
            axis(&self.top_n, d.top_n),
            axis(&self.fixed_stop_loss, d.fixed_stop_loss),
            axis(&self.trailing_stop, d.trailing_stop),
            axis(&self.weights, d.weights)
        )
        .map(
            |(lookback, skip, donchian, top_n, fixed, trailing, weights)| ParamSet {
                lookback_mom_days: lookback,
                skip_last_days_for_mom: skip,
                donchian_high_days: donchian,
                top_n,
                fixed_stop_loss: fixed,
                trailing_stop: trailing,
                weights,
            },
        )
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridWinner {
    pub params: ParamSet,
    pub sharpe: f64,
}

/// Evaluate every combination in parallel and pick the strictly best finite
/// score. `None` when no combination produced one.
pub fn search_grid<F>(combinations: &[ParamSet], evaluate: F) -> Option<GridWinner>
where
    F: Fn(&ParamSet) -> Option<f64> + Sync,
{
    let scores: Vec<Option<f64>> = combinations.par_iter().map(&evaluate).collect();

    let mut winner: Option<GridWinner> = None;
    for (params, score) in combinations.iter().zip(scores) {
        let Some(sharpe) = score.filter(|s| s.is_finite()) else {
            continue;
        };
        if winner.as_ref().is_none_or(|w| sharpe > w.sharpe) {
            winner = Some(GridWinner {
                params: params.clone(),
                sharpe,
            });
        }
    }
    winner
}

/// Sharpe ratio of one combination's backtest over `prices`.
pub fn evaluate_params(
    prices: &PriceMatrix,
    params: &ParamSet,
    base: &StrategyParams,
) -> Option<f64> {
    let signals = compute_signals(prices, &params.signal_params());
    match run_backtest(prices, &signals.score, &params.strategy_params(base)) {
        Ok(result) => result.stats.sharpe_ratio,
        Err(e) => {
            warn!(?params, error = %e, "grid combination skipped");
            None
        }
    }
}

pub fn grid_search(
    prices: &PriceMatrix,
    grid: &ParamGrid,
    base: &StrategyParams,
) -> Option<GridWinner> {
    let combinations = grid.combinations();
    let winner = search_grid(&combinations, |p| evaluate_params(prices, p, base));
    match &winner {
        Some(w) => info!(
            combinations = combinations.len(),
            sharpe = w.sharpe,
            params = ?w.params,
            "grid winner"
        ),
        None => warn!(
            combinations = combinations.len(),
            "no grid combination produced a finite Sharpe ratio"
        ),
    }
    winner
}
