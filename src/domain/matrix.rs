//! Date × ticker matrices and the benchmark series.
//!
//! A [`Matrix`] is column-major: one column per ticker, one cell per trading
//! date, `None` marking a missing observation. The date and ticker axes are
//! reference-counted so every indicator and score matrix derived from a price
//! matrix shares them without copying.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::RotatraderError;
use super::indicator::rolling::pct_change;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    dates: Arc<[NaiveDate]>,
    tickers: Arc<[String]>,
    columns: Vec<Vec<Option<f64>>>,
}

/// Raw close prices, immutable once constructed.
pub type PriceMatrix = Matrix;

/// Ranking scores; higher is better.
pub type ScoreMatrix = Matrix;

impl Matrix {
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, RotatraderError> {
        if dates.is_empty() {
            return Err(RotatraderError::degenerate("matrix has no dates"));
        }
        if tickers.is_empty() {
            return Err(RotatraderError::degenerate("matrix has no tickers"));
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RotatraderError::degenerate(format!(
                "dates must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        let mut seen = HashSet::with_capacity(tickers.len());
        if let Some(dup) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(RotatraderError::degenerate(format!(
                "duplicate ticker {dup}"
            )));
        }
        if columns.len() != tickers.len() {
            return Err(RotatraderError::degenerate(format!(
                "{} columns for {} tickers",
                columns.len(),
                tickers.len()
            )));
        }
        if let Some((j, _)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != dates.len())
        {
            return Err(RotatraderError::degenerate(format!(
                "column {} has {} rows, expected {}",
                tickers[j],
                columns[j].len(),
                dates.len()
            )));
        }
        Ok(Matrix {
            dates: dates.into(),
            tickers: tickers.into(),
            columns,
        })
    }

    /// A matrix sharing this matrix's axes. Columns must match the shape.
    pub fn with_columns(&self, columns: Vec<Vec<Option<f64>>>) -> Matrix {
        debug_assert_eq!(columns.len(), self.tickers.len());
        debug_assert!(columns.iter().all(|c| c.len() == self.dates.len()));
        Matrix {
            dates: Arc::clone(&self.dates),
            tickers: Arc::clone(&self.tickers),
            columns,
        }
    }

    /// Same shape, every cell `Some(0.0)`.
    pub fn zeros_like(&self) -> Matrix {
        self.with_columns(vec![vec![Some(0.0); self.dates.len()]; self.tickers.len()])
    }

    /// Apply `f` to every column, keeping the axes.
    pub fn map_columns<F>(&self, f: F) -> Matrix
    where
        F: Fn(&[Option<f64>]) -> Vec<Option<f64>>,
    {
        self.with_columns(self.columns.iter().map(|c| f(c.as_slice())).collect())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn n_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn n_tickers(&self) -> usize {
        self.tickers.len()
    }

    pub fn column(&self, ticker: usize) -> &[Option<f64>] {
        &self.columns[ticker]
    }

    pub fn columns(&self) -> &[Vec<Option<f64>>] {
        &self.columns
    }

    pub fn get(&self, row: usize, ticker: usize) -> Option<f64> {
        self.columns.get(ticker).and_then(|c| c.get(row)).copied().flatten()
    }

    pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Rows whose date lies in `[start, end]`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Matrix, RotatraderError> {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        if lo >= hi {
            return Err(RotatraderError::degenerate(format!(
                "no trading dates between {start} and {end}"
            )));
        }
        Ok(Matrix {
            dates: self.dates[lo..hi].into(),
            tickers: Arc::clone(&self.tickers),
            columns: self.columns.iter().map(|c| c[lo..hi].to_vec()).collect(),
        })
    }

    /// The given ticker columns, in order. Fails when `keep` is empty.
    pub fn select_columns(&self, keep: &[usize]) -> Result<Matrix, RotatraderError> {
        Matrix::new(
            self.dates.to_vec(),
            keep.iter().map(|&j| self.tickers[j].clone()).collect(),
            keep.iter().map(|&j| self.columns[j].clone()).collect(),
        )
    }

    fn select_rows(&self, rows: &[usize]) -> Matrix {
        Matrix {
            dates: rows.iter().map(|&i| self.dates[i]).collect(),
            tickers: Arc::clone(&self.tickers),
            columns: self
                .columns
                .iter()
                .map(|c| rows.iter().map(|&i| c[i]).collect())
                .collect(),
        }
    }
}

/// Ticker filters applied to the raw price matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningRules {
    /// Largest tolerated share of missing rows.
    pub max_missing_ratio: f64,
    /// Smallest tolerated median price.
    pub min_price: f64,
    /// Smallest share of rows with a price.
    pub min_traded_ratio: f64,
    /// Any daily move above this, in absolute terms, drops the ticker.
    pub max_abs_daily_return: f64,
}

impl Default for CleaningRules {
    fn default() -> Self {
        CleaningRules {
            max_missing_ratio: 0.30,
            min_price: 2.0,
            min_traded_ratio: 0.85,
            max_abs_daily_return: 0.50,
        }
    }
}

impl CleaningRules {
    /// The first rule `column` breaks, if any.
    fn violation(&self, column: &[Option<f64>]) -> Option<&'static str> {
        let n = column.len() as f64;
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        let missing = (column.len() - present.len()) as f64 / n;
        let traded = present.len() as f64 / n;

        if missing > self.max_missing_ratio {
            return Some("too many missing prices");
        }
        if !median(present).is_some_and(|m| m >= self.min_price) {
            return Some("median price too low");
        }
        if traded < self.min_traded_ratio {
            return Some("too few traded days");
        }
        if pct_change(column)
            .into_iter()
            .flatten()
            .any(|r| r.abs() > self.max_abs_daily_return)
        {
            return Some("extreme daily return");
        }
        None
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Drop every ticker that breaks one of `rules`. Dropping them all is
/// `DegenerateInput`.
pub fn clean_prices(
    prices: &PriceMatrix,
    rules: &CleaningRules,
) -> Result<PriceMatrix, RotatraderError> {
    let mut keep = Vec::with_capacity(prices.n_tickers());
    for (j, ticker) in prices.tickers().iter().enumerate() {
        match rules.violation(prices.column(j)) {
            Some(reason) => debug!(ticker = %ticker, reason, "ticker dropped"),
            None => keep.push(j),
        }
    }
    info!(
        kept = keep.len(),
        dropped = prices.n_tickers() - keep.len(),
        "price matrix cleaned"
    );
    if keep.is_empty() {
        return Err(RotatraderError::degenerate(
            "every ticker was removed by the cleaning rules",
        ));
    }
    prices.select_columns(&keep)
}

/// Benchmark price series supplied alongside the price matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSeries {
    dates: Vec<NaiveDate>,
    values: Vec<Option<f64>>,
}

impl BenchmarkSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<Option<f64>>) -> Result<Self, RotatraderError> {
        if dates.len() != values.len() {
            return Err(RotatraderError::degenerate(format!(
                "benchmark has {} dates and {} values",
                dates.len(),
                values.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RotatraderError::degenerate(
                "benchmark dates must be strictly increasing",
            ));
        }
        Ok(BenchmarkSeries { dates, values })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> BenchmarkSeries {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end).max(lo);
        BenchmarkSeries {
            dates: self.dates[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
        }
    }

    /// Benchmark as a portfolio value series starting at `initial_cash`.
    /// Missing observations are dropped.
    pub fn normalized(&self, initial_cash: f64) -> Vec<ValuePoint> {
        let observed = self
            .dates
            .iter()
            .zip(&self.values)
            .filter_map(|(d, v)| v.filter(|x| x.is_finite()).map(|x| (*d, x)));
        let mut base = None;
        observed
            .filter_map(|(date, value)| {
                let first = *base.get_or_insert(value);
                if first == 0.0 {
                    return None;
                }
                Some(ValuePoint {
                    date,
                    value: value / first * initial_cash,
                })
            })
            .collect()
    }
}

/// One entry of a portfolio value series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Restrict prices and benchmark to their shared dates.
pub fn align_with_benchmark(
    prices: &PriceMatrix,
    benchmark: &BenchmarkSeries,
) -> Result<(PriceMatrix, BenchmarkSeries), RotatraderError> {
    let mut rows = Vec::new();
    let mut bench_dates = Vec::new();
    let mut bench_values = Vec::new();
    let mut k = 0;
    for (i, date) in prices.dates().iter().enumerate() {
        while k < benchmark.dates.len() && benchmark.dates[k] < *date {
            k += 1;
        }
        if k < benchmark.dates.len() && benchmark.dates[k] == *date {
            rows.push(i);
            bench_dates.push(*date);
            bench_values.push(benchmark.values[k]);
        }
    }
    if rows.is_empty() {
        return Err(RotatraderError::degenerate(
            "price matrix and benchmark share no dates",
        ));
    }
    Ok((
        prices.select_rows(&rows),
        BenchmarkSeries {
            dates: bench_dates,
            values: bench_values,
        },
    ))
}
