//! Three-factor signal model used by the grid search.
//!
//! Momentum, proximity to the lookback high and a Donchian breakout flag.
//! Each is z-scored per ticker over the whole date range and blended with a
//! weight triple.

use crate::domain::indicator::rolling::{ratio, rolling_max};
use crate::domain::indicator::{breakout, momentum};
use crate::domain::matrix::{Matrix, PriceMatrix, ScoreMatrix};
use crate::domain::scoring::time_series_zscore;

/// Rolling windows here need half their length, and at least ten rows.
fn min_observations(window: usize) -> usize {
    (window / 2).max(10)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalParams {
    pub lookback_mom_days: usize,
    pub skip_last_days_for_mom: usize,
    pub donchian_high_days: usize,
    /// Momentum, proximity, breakout.
    pub weights: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct Signals {
    pub momentum: PriceMatrix,
    pub proximity: PriceMatrix,
    pub breakout: PriceMatrix,
    pub score: ScoreMatrix,
}

pub fn compute_signals(prices: &PriceMatrix, params: &SignalParams) -> Signals {
    let lookback = params.lookback_mom_days;
    let donchian = params.donchian_high_days;

    let mom = prices.map_columns(|c| momentum(c, lookback, params.skip_last_days_for_mom));
    let prox =
        prices.map_columns(|c| ratio(c, &rolling_max(c, lookback, min_observations(lookback))));
    let brk = prices.map_columns(|c| breakout(c, donchian, min_observations(donchian)));

    let [w_mom, w_prox, w_brk] = params.weights;
    let score = blend([(&mom, w_mom), (&prox, w_prox), (&brk, w_brk)], prices);

    Signals {
        momentum: mom,
        proximity: prox,
        breakout: brk,
        score,
    }
}

/// Sum of weighted time z-scores. Every part enters the sum, so a missing
/// z-score leaves the cell missing even when its weight is zero.
fn blend(parts: [(&Matrix, f64); 3], shape: &Matrix) -> ScoreMatrix {
    let z = parts.map(|(m, w)| (time_series_zscore(m), w));
    let columns = (0..shape.n_tickers())
        .map(|j| {
            (0..shape.n_dates())
                .map(|i| {
                    z.iter()
                        .try_fold(0.0, |acc, (m, w)| m.get(i, j).map(|v| acc + v * w))
                })
                .collect()
        })
        .collect();
    shape.with_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::mean_and_sample_std;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    /// Rising with a wave, so breakouts come and go.
    fn wavy(n: usize, base: f64) -> Vec<Option<f64>> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                Some(base + 0.5 * t + 5.0 * (t / 3.0).sin())
            })
            .collect()
    }

    fn sample_prices(n: usize) -> PriceMatrix {
        let columns = vec![
            wavy(n, 100.0),
            (0..n).map(|i| Some(100.0 - 0.1 * i as f64)).collect(),
        ];
        Matrix::new(dates(n), vec!["WAVY".into(), "DOWN".into()], columns).unwrap()
    }

    fn sample_params() -> SignalParams {
        SignalParams {
            lookback_mom_days: 20,
            skip_last_days_for_mom: 5,
            donchian_high_days: 10,
            weights: [0.6, 0.3, 0.1],
        }
    }

    fn zscore_at(column: &[Option<f64>], row: usize) -> f64 {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        let (mean, std) = mean_and_sample_std(&present).unwrap();
        (column[row].unwrap() - mean) / std
    }

    #[test]
    fn min_observations_floor() {
        assert_eq!(min_observations(252), 126);
        assert_eq!(min_observations(55), 27);
        assert_eq!(min_observations(8), 10);
    }

    #[test]
    fn warmup_is_missing() {
        let s = compute_signals(&sample_prices(40), &sample_params());
        // momentum needs 20 rows of history
        assert_eq!(s.momentum.get(19, 0), None);
        assert!(s.momentum.get(20, 0).is_some());
        // proximity needs 10 observations
        assert_eq!(s.proximity.get(8, 0), None);
        assert!(s.proximity.get(9, 0).is_some());
        assert_eq!(s.score.get(19, 0), None);
    }

    #[test]
    fn single_ticker_is_scored_after_warmup() {
        let n = 300;
        let prices = Matrix::new(dates(n), vec!["ONLY".into()], vec![wavy(n, 50.0)]).unwrap();
        let s = compute_signals(&prices, &sample_params());
        let scored = s.score.column(0).iter().filter(|v| v.is_some()).count();
        assert_eq!(scored, n - 20);
        assert!(s.score.column(0)[20..].iter().all(Option::is_some));
    }

    #[test]
    fn score_blends_per_ticker_zscores() {
        let s = compute_signals(&sample_prices(120), &sample_params());
        let row = 77;
        let expected = zscore_at(s.momentum.column(0), row) * 0.6
            + zscore_at(s.proximity.column(0), row) * 0.3
            + zscore_at(s.breakout.column(0), row) * 0.1;
        assert_relative_eq!(s.score.get(row, 0).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn ticker_without_breakouts_is_unscored() {
        let s = compute_signals(&sample_prices(60), &sample_params());
        assert!(s.breakout.column(1).iter().all(|v| *v == Some(0.0)));
        assert!(s.score.column(1).iter().all(Option::is_none));
    }

    #[test]
    fn zero_weights_still_need_every_part() {
        let params = SignalParams {
            weights: [0.0, 0.0, 0.0],
            ..sample_params()
        };
        let s = compute_signals(&sample_prices(60), &params);
        assert!(s.score.column(0)[..20].iter().all(Option::is_none));
        assert!(s.score.column(0)[20..].iter().all(|v| *v == Some(0.0)));
    }
}
