//! Cross-sectional scoring.
//!
//! Each factor matrix is standardized per date across tickers, scaled by its
//! weight, and summed. A missing input anywhere in the sum leaves that cell
//! missing.

use std::collections::BTreeMap;

use crate::domain::indicator::{Factor, IndicatorSet};
use crate::domain::matrix::{Matrix, ScoreMatrix};
use crate::domain::metrics::mean_and_sample_std;

/// Factor → non-negative weight. Absent factors weigh zero.
pub type FactorWeights = BTreeMap<Factor, f64>;

/// Per-date z-score across tickers. Dates with fewer than two observations
/// or zero dispersion are missing for every ticker.
pub fn cross_sectional_zscore(matrix: &Matrix) -> Matrix {
    let n_dates = matrix.n_dates();
    let n_tickers = matrix.n_tickers();
    let mut columns = vec![vec![None; n_dates]; n_tickers];
    let mut row = Vec::with_capacity(n_tickers);

    for i in 0..n_dates {
        row.clear();
        row.extend((0..n_tickers).filter_map(|j| matrix.get(i, j)));
        let Some((mean, std)) = mean_and_sample_std(&row) else {
            continue;
        };
        if std == 0.0 || !std.is_finite() {
            continue;
        }
        for (j, column) in columns.iter_mut().enumerate() {
            column[i] = matrix.get(i, j).map(|v| (v - mean) / std);
        }
    }

    matrix.with_columns(columns)
}

/// Per-ticker z-score over the whole date range: each column is centred on
/// the mean of its present values and divided by their sample standard
/// deviation. A column with fewer than two observations or zero dispersion
/// is missing throughout.
pub fn time_series_zscore(matrix: &Matrix) -> Matrix {
    matrix.map_columns(|column| {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        match mean_and_sample_std(&present) {
            Some((mean, std)) if std != 0.0 && std.is_finite() => {
                column.iter().map(|v| v.map(|x| (x - mean) / std)).collect()
            }
            _ => vec![None; column.len()],
        }
    })
}

/// Weighted sum of z-scored parts. Zero-weight parts are skipped; with no
/// remaining part the result is the zero matrix shaped like `shape`.
pub fn weighted_zscore_sum<'a, I>(parts: I, shape: &Matrix) -> ScoreMatrix
where
    I: IntoIterator<Item = (&'a Matrix, f64)>,
{
    let mut total: Option<Vec<Vec<Option<f64>>>> = None;

    for (matrix, weight) in parts {
        if weight == 0.0 {
            continue;
        }
        let z = cross_sectional_zscore(matrix);
        match total.as_mut() {
            None => {
                total = Some(
                    z.columns()
                        .iter()
                        .map(|c| c.iter().map(|v| v.map(|x| x * weight)).collect())
                        .collect(),
                );
            }
            Some(acc) => {
                for (acc_col, z_col) in acc.iter_mut().zip(z.columns()) {
                    for (a, v) in acc_col.iter_mut().zip(z_col) {
                        *a = match (*a, v) {
                            (Some(a), Some(v)) => Some(a + v * weight),
                            _ => None,
                        };
                    }
                }
            }
        }
    }

    match total {
        Some(columns) => shape.with_columns(columns),
        None => shape.zeros_like(),
    }
}

pub fn score_from_weights(indicators: &IndicatorSet, weights: &FactorWeights) -> ScoreMatrix {
    let parts = indicators
        .iter()
        .map(|(factor, matrix)| (matrix, weights.get(&factor).copied().unwrap_or(0.0)));
    weighted_zscore_sum(parts, indicators.shape())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::{compute_indicators, IndicatorWindows};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn matrix(rows: &[&[Option<f64>]]) -> Matrix {
        let n_tickers = rows[0].len();
        let dates = (0..rows.len())
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap())
            .collect();
        let tickers = (0..n_tickers).map(|j| format!("T{j}")).collect();
        let columns = (0..n_tickers)
            .map(|j| rows.iter().map(|r| r[j]).collect())
            .collect();
        Matrix::new(dates, tickers, columns).unwrap()
    }

    #[test]
    fn zscore_row() {
        let m = matrix(&[&[Some(1.0), Some(2.0), Some(3.0)]]);
        let z = cross_sectional_zscore(&m);
        assert_relative_eq!(z.get(0, 0).unwrap(), -1.0);
        assert_relative_eq!(z.get(0, 1).unwrap(), 0.0);
        assert_relative_eq!(z.get(0, 2).unwrap(), 1.0);
    }

    #[test]
    fn zscore_zero_std_is_missing() {
        let m = matrix(&[&[Some(5.0), Some(5.0), Some(5.0)]]);
        let z = cross_sectional_zscore(&m);
        assert!(z.columns().iter().flatten().all(Option::is_none));
    }

    #[test]
    fn zscore_skips_missing_tickers() {
        let m = matrix(&[&[Some(1.0), None, Some(3.0)]]);
        let z = cross_sectional_zscore(&m);
        let std = 2.0_f64.sqrt();
        assert_relative_eq!(z.get(0, 0).unwrap(), -1.0 / std, epsilon = 1e-12);
        assert_eq!(z.get(0, 1), None);
        assert_relative_eq!(z.get(0, 2).unwrap(), 1.0 / std, epsilon = 1e-12);
    }

    #[test]
    fn zscore_single_observation_is_missing() {
        let m = matrix(&[&[Some(1.0), None, None]]);
        let z = cross_sectional_zscore(&m);
        assert_eq!(z.get(0, 0), None);
    }

    #[test]
    fn time_zscore_per_column() {
        // column 0: mean 2, sample std 1; column 1: mean 15, sample std 5·√2
        let m = matrix(&[
            &[Some(1.0), Some(10.0)],
            &[Some(2.0), None],
            &[Some(3.0), Some(20.0)],
            &[None, None],
        ]);
        let z = time_series_zscore(&m);
        assert_relative_eq!(z.get(0, 0).unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(z.get(1, 0).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(z.get(2, 0).unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(z.get(3, 0), None);
        let std = 50.0_f64.sqrt();
        assert_relative_eq!(z.get(0, 1).unwrap(), -5.0 / std, epsilon = 1e-12);
        assert_eq!(z.get(1, 1), None);
        assert_relative_eq!(z.get(2, 1).unwrap(), 5.0 / std, epsilon = 1e-12);
    }

    #[test]
    fn time_zscore_flat_or_sparse_column_is_missing() {
        let m = matrix(&[
            &[Some(4.0), Some(1.0), Some(1.0)],
            &[Some(4.0), None, Some(2.0)],
            &[Some(4.0), None, Some(3.0)],
        ]);
        let z = time_series_zscore(&m);
        assert!(z.column(0).iter().all(Option::is_none));
        assert!(z.column(1).iter().all(Option::is_none));
        assert!(z.column(2).iter().all(Option::is_some));
    }

    #[test]
    fn weighted_sum_scales_and_adds() {
        let a = matrix(&[&[Some(1.0), Some(2.0), Some(3.0)]]);
        let b = matrix(&[&[Some(3.0), Some(2.0), Some(1.0)]]);
        let s = weighted_zscore_sum([(&a, 0.75), (&b, 0.25)], &a);
        assert_relative_eq!(s.get(0, 0).unwrap(), -0.5, epsilon = 1e-12);
        assert_relative_eq!(s.get(0, 2).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn weighted_sum_propagates_missing() {
        let a = matrix(&[&[Some(1.0), Some(2.0), Some(3.0)]]);
        let b = matrix(&[&[Some(1.0), None, Some(2.0)]]);
        let s = weighted_zscore_sum([(&a, 0.5), (&b, 0.5)], &a);
        assert!(s.get(0, 0).is_some());
        assert_eq!(s.get(0, 1), None);
    }

    #[test]
    fn zero_weight_part_is_ignored() {
        let a = matrix(&[&[Some(1.0), Some(2.0), Some(3.0)]]);
        let b = matrix(&[&[None, None, None]]);
        let s = weighted_zscore_sum([(&a, 1.0), (&b, 0.0)], &a);
        assert!(s.columns().iter().flatten().all(Option::is_some));
    }

    #[test]
    fn no_weights_gives_zero_matrix() {
        let a = matrix(&[&[Some(1.0), None], &[Some(2.0), Some(3.0)]]);
        let s = weighted_zscore_sum([(&a, 0.0)], &a);
        assert!(s.columns().iter().flatten().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn score_from_weights_single_factor_matches_zscore() {
        let dates_n = 30;
        let columns: Vec<Vec<Option<f64>>> = (0..3)
            .map(|j| {
                (0..dates_n)
                    .map(|i| Some(10.0 + ((i * (j + 1)) % 7) as f64))
                    .collect()
            })
            .collect();
        let dates = (0..dates_n)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap())
            .collect();
        let prices = Matrix::new(dates, vec!["A".into(), "B".into(), "C".into()], columns).unwrap();
        let windows = IndicatorWindows {
            high_window: 5,
            ..IndicatorWindows::default()
        };
        let set = compute_indicators(&prices, &windows);

        let mut weights = FactorWeights::new();
        weights.insert(Factor::Prox52w, 1.0);
        let score = score_from_weights(&set, &weights);
        let expected = cross_sectional_zscore(set.get(Factor::Prox52w).unwrap());
        assert_eq!(score, expected);
        assert!(score.columns().iter().flatten().any(Option::is_some));
    }

    #[test]
    fn score_from_empty_weights_is_zero() {
        let prices = matrix(&[&[Some(1.0), Some(2.0)], &[Some(1.5), Some(2.5)]]);
        let set = compute_indicators(&prices, &IndicatorWindows::default());
        let score = score_from_weights(&set, &FactorWeights::new());
        assert_eq!(score, prices.zeros_like());
    }
}
