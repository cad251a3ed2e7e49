//! RSI (Relative Strength Index) with exponential smoothing.
//!
//! Gains and losses are smoothed with an exponentially weighted mean at decay
//! `alpha = 1/n` (recursive form, seeded with the first observation):
//! - avg[t] = (1 - alpha) * avg[t-1] + alpha * x[t]
//! - a run of k missing rows before an observation discounts the previous
//!   average by (1 - alpha)^(k+1), renormalized against alpha
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI is missing.

use super::rolling::shift;

/// Exponentially weighted mean, recursive form. Missing rows before the first
/// observation stay missing; after it the last average carries forward.
pub fn ewm_mean(column: &[Option<f64>], alpha: f64) -> Vec<Option<f64>> {
    let decay = 1.0 - alpha;
    let mut avg: Option<f64> = None;
    let mut old_weight = 1.0;
    column
        .iter()
        .map(|x| {
            match (avg, x) {
                (None, Some(x)) => avg = Some(*x),
                (None, None) => {}
                (Some(prev), obs) => {
                    old_weight *= decay;
                    if let Some(x) = obs {
                        if prev != *x {
                            avg = Some((old_weight * prev + alpha * x) / (old_weight + alpha));
                        }
                        old_weight = 1.0;
                    }
                }
            }
            avg
        })
        .collect()
}

pub fn calculate_rsi(column: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; column.len()];
    }
    let prev = shift(column, 1);
    let (gains, losses): (Vec<Option<f64>>, Vec<Option<f64>>) = column
        .iter()
        .zip(&prev)
        .map(|(c, p)| match (c, p) {
            (Some(c), Some(p)) => {
                let change = c - p;
                (Some(change.max(0.0)), Some((-change).max(0.0)))
            }
            _ => (None, None),
        })
        .unzip();

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_mean(&gains, alpha);
    let avg_loss = ewm_mean(&losses, alpha);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) if *l != 0.0 => Some(100.0 - 100.0 / (1.0 + g / l)),
            _ => None,
        })
        .collect()
}
