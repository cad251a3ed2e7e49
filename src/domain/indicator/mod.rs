//! Factor indicators computed from a price matrix.
//!
//! This module provides:
//! - `Factor`: the seven ranking factors, named as they appear in weight files
//! - `IndicatorWindows`: lookback windows behind each factor
//! - `IndicatorSet`: one matrix per factor, aligned to the price matrix axes
//!
//! Every factor is computed column by column with the primitives in
//! [`rolling`], so values at one date are independent of other tickers.

pub mod rolling;
pub mod rsi;

use std::fmt;
use std::str::FromStr;

use crate::domain::matrix::{Matrix, PriceMatrix};
use rolling::{default_min_periods, pct_change, ratio, rolling_max, rolling_mean, rolling_std, shift};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Factor {
    Mom12_1,
    Mom6_1,
    Prox52w,
    Breakout100,
    DistSma200,
    LowVol252,
    Rsi14,
}

impl Factor {
    pub const ALL: [Factor; 7] = [
        Factor::Mom12_1,
        Factor::Mom6_1,
        Factor::Prox52w,
        Factor::Breakout100,
        Factor::DistSma200,
        Factor::LowVol252,
        Factor::Rsi14,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Factor::Mom12_1 => "mom_12_1",
            Factor::Mom6_1 => "mom_6_1",
            Factor::Prox52w => "prox_52w",
            Factor::Breakout100 => "breakout_100",
            Factor::DistSma200 => "dist_sma200",
            Factor::LowVol252 => "low_vol_252",
            Factor::Rsi14 => "rsi_14",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Factor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Factor::ALL
            .into_iter()
            .find(|f| f.name() == s.trim())
            .ok_or_else(|| format!("unknown factor '{}'", s.trim()))
    }
}

/// Lookback windows, in trading days. Rolling factors require
/// `ceil(window / 3)` observations before emitting a value.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorWindows {
    pub skip_days: usize,
    pub mom_long_days: usize,
    pub mom_medium_days: usize,
    pub high_window: usize,
    pub breakout_window: usize,
    pub sma_window: usize,
    pub vol_window: usize,
    pub rsi_period: usize,
}

impl Default for IndicatorWindows {
    fn default() -> Self {
        IndicatorWindows {
            skip_days: 21,
            mom_long_days: 252,
            mom_medium_days: 126,
            high_window: 252,
            breakout_window: 100,
            sma_window: 200,
            vol_window: 252,
            rsi_period: 14,
        }
    }
}

/// Factor matrices in `Factor::ALL` order.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    entries: Vec<(Factor, Matrix)>,
}

impl IndicatorSet {
    pub fn get(&self, factor: Factor) -> Option<&Matrix> {
        self.entries
            .iter()
            .find(|(f, _)| *f == factor)
            .map(|(_, m)| m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, &Matrix)> {
        self.entries.iter().map(|(f, m)| (*f, m))
    }

    /// Any factor matrix; all share the price matrix axes.
    pub fn shape(&self) -> &Matrix {
        &self.entries[0].1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Price `skip` rows ago over price `lookback` rows ago, minus one.
pub fn momentum(column: &[Option<f64>], lookback: usize, skip: usize) -> Vec<Option<f64>> {
    ratio(&shift(column, skip), &shift(column, lookback))
        .into_iter()
        .map(|r| r.map(|v| v - 1.0))
        .collect()
}

/// 1.0 when the price is at or above its rolling high, else 0.0 (including
/// rows where either side is missing).
pub fn breakout(column: &[Option<f64>], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    column
        .iter()
        .zip(rolling_max(column, window, min_periods))
        .map(|(price, high)| match (price, high) {
            (Some(p), Some(h)) if *p >= h => Some(1.0),
            _ => Some(0.0),
        })
        .collect()
}

fn compute_factor(factor: Factor, column: &[Option<f64>], w: &IndicatorWindows) -> Vec<Option<f64>> {
    match factor {
        Factor::Mom12_1 => momentum(column, w.mom_long_days, w.skip_days),
        Factor::Mom6_1 => momentum(column, w.mom_medium_days, w.skip_days),
        Factor::Prox52w => ratio(
            column,
            &rolling_max(column, w.high_window, default_min_periods(w.high_window)),
        ),
        Factor::Breakout100 => breakout(
            column,
            w.breakout_window,
            default_min_periods(w.breakout_window),
        ),
        Factor::DistSma200 => ratio(
            column,
            &rolling_mean(column, w.sma_window, default_min_periods(w.sma_window)),
        ),
        Factor::LowVol252 => rolling_std(
            &pct_change(column),
            w.vol_window,
            default_min_periods(w.vol_window),
        )
        .into_iter()
        .map(|s| s.map(|v| -v))
        .collect(),
        Factor::Rsi14 => rsi::calculate_rsi(column, w.rsi_period),
    }
}

pub fn compute_indicators(prices: &PriceMatrix, windows: &IndicatorWindows) -> IndicatorSet {
    let entries = Factor::ALL
        .into_iter()
        .map(|factor| {
            let matrix = prices.map_columns(|column| compute_factor(factor, column, windows));
            (factor, matrix)
        })
        .collect();
    IndicatorSet { entries }
}
