//! Per-column window primitives.
//!
//! Every function takes one ticker column (`None` = missing) and returns a
//! column of the same length. Windows count trading-date rows, not
//! observations; a window emits a value only once it holds at least
//! `min_periods` present observations.

use crate::domain::metrics::mean_and_sample_std;

/// Minimum observations for a rolling window of `window` rows.
pub fn default_min_periods(window: usize) -> usize {
    window.div_ceil(3).max(1)
}

/// Value `periods` rows earlier.
pub fn shift(column: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..column.len())
        .map(|i| i.checked_sub(periods).and_then(|j| column[j]))
        .collect()
}

/// `a / b`, missing when either side is missing or `b` is zero.
pub fn ratio(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if *y != 0.0 => Some(x / y),
            _ => None,
        })
        .collect()
}

/// Simple return against the previous row. Gaps are padded with the last
/// observed price: a missing row returns 0.0 and the next observation is
/// measured against the price before the gap. Rows before the first
/// observation are missing.
pub fn pct_change(column: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last: Option<f64> = None;
    column
        .iter()
        .map(|value| {
            let prev = last;
            if value.is_some() {
                last = *value;
            }
            match (prev, last) {
                (Some(prev), Some(curr)) if prev != 0.0 => Some(curr / prev - 1.0),
                _ => None,
            }
        })
        .collect()
}

fn rolling<F>(column: &[Option<f64>], window: usize, min_periods: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut buf = Vec::with_capacity(window);
    (0..column.len())
        .map(|i| {
            if window == 0 {
                return None;
            }
            let start = (i + 1).saturating_sub(window);
            buf.clear();
            buf.extend(column[start..=i].iter().flatten());
            if buf.len() >= min_periods.max(1) {
                f(&buf)
            } else {
                None
            }
        })
        .collect()
}

pub fn rolling_max(column: &[Option<f64>], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    rolling(column, window, min_periods, |w| {
        w.iter().copied().reduce(f64::max)
    })
}

pub fn rolling_mean(column: &[Option<f64>], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    rolling(column, window, min_periods, |w| {
        Some(w.iter().sum::<f64>() / w.len() as f64)
    })
}

/// Sample standard deviation (n − 1 denominator); needs two observations.
pub fn rolling_std(column: &[Option<f64>], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    rolling(column, window, min_periods, |w| {
        mean_and_sample_std(w).map(|(_, std)| std)
    })
}
