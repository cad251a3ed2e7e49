//! CSV file market data adapter.
//!
//! Prices come from a wide file: a `Date` column followed by one column per
//! ticker. The benchmark file holds a `Date` column and a value column; the
//! first non-date column is used.

use chrono::NaiveDate;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::domain::error::RotatraderError;
use crate::domain::matrix::{BenchmarkSeries, Matrix, PriceMatrix};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;

pub struct CsvAdapter {
    prices_path: PathBuf,
    benchmark_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(prices_path: impl Into<PathBuf>, benchmark_path: impl Into<PathBuf>) -> Self {
        Self {
            prices_path: prices_path.into(),
            benchmark_path: benchmark_path.into(),
        }
    }

    /// Paths from `[data] prices` and `[data] benchmark`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RotatraderError> {
        let path = |key: &str| {
            config
                .get_string("data", key)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| RotatraderError::ConfigMissing {
                    section: "data".to_string(),
                    key: key.to_string(),
                })
        };
        Ok(Self::new(path("prices")?, path("benchmark")?))
    }
}

impl MarketDataPort for CsvAdapter {
    fn load_prices(&self) -> Result<PriceMatrix, RotatraderError> {
        let file = open(&self.prices_path)?;
        parse_prices(file, &self.prices_path.display().to_string())
    }

    fn load_benchmark(&self) -> Result<BenchmarkSeries, RotatraderError> {
        let file = open(&self.benchmark_path)?;
        parse_benchmark(file, &self.benchmark_path.display().to_string())
    }
}

fn open(path: &Path) -> Result<File, RotatraderError> {
    File::open(path).map_err(|e| {
        RotatraderError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {e}", path.display()),
        ))
    })
}

fn format_error(file: &str, reason: impl Into<String>) -> RotatraderError {
    RotatraderError::DataFormat {
        file: file.to_string(),
        reason: reason.into(),
    }
}

fn date_column(headers: &csv::StringRecord, file: &str) -> Result<usize, RotatraderError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("date"))
        .ok_or_else(|| format_error(file, "missing Date column"))
}

fn parse_date(raw: &str, file: &str) -> Result<NaiveDate, RotatraderError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format_error(file, format!("invalid date '{raw}': {e}")))
}

/// Plain numeric cell; anything unparsable or non-finite is missing.
fn parse_cell(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Benchmark cell, additionally accepting `1.234,56` style values.
fn parse_localized(raw: &str) -> Option<f64> {
    parse_cell(raw).or_else(|| {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '\u{a0}' | ' ' | '.'))
            .map(|c| if c == ',' { '.' } else { c })
            .collect();
        parse_cell(&cleaned)
    })
}

/// Rows sorted by date; duplicate dates are rejected.
fn sort_rows<T>(rows: &mut [(NaiveDate, T)], file: &str) -> Result<(), RotatraderError> {
    rows.sort_by_key(|(date, _)| *date);
    if let Some(w) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(format_error(file, format!("duplicate date {}", w[0].0)));
    }
    Ok(())
}

pub fn parse_prices<R: Read>(reader: R, file: &str) -> Result<PriceMatrix, RotatraderError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| format_error(file, e.to_string()))?
        .clone();
    let date_idx = date_column(&headers, file)?;
    let ticker_cols: Vec<usize> = (0..headers.len()).filter(|&i| i != date_idx).collect();
    let tickers: Vec<String> = ticker_cols
        .iter()
        .map(|&i| headers[i].trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| format_error(file, e.to_string()))?;
        let date = parse_date(&record[date_idx], file)?;
        let values: Vec<Option<f64>> = ticker_cols.iter().map(|&i| parse_cell(&record[i])).collect();
        rows.push((date, values));
    }
    sort_rows(&mut rows, file)?;

    let mut columns = vec![Vec::with_capacity(rows.len()); tickers.len()];
    let mut dates = Vec::with_capacity(rows.len());
    for (date, values) in rows {
        dates.push(date);
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value);
        }
    }
    Matrix::new(dates, tickers, columns)
}

pub fn parse_benchmark<R: Read>(reader: R, file: &str) -> Result<BenchmarkSeries, RotatraderError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| format_error(file, e.to_string()))?
        .clone();
    let date_idx = date_column(&headers, file)?;
    let value_idx = (0..headers.len()).find(|&i| i != date_idx).ok_or_else(|| {
        RotatraderError::degenerate(format!("benchmark {file} has no value column besides Date"))
    })?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| format_error(file, e.to_string()))?;
        let date = parse_date(&record[date_idx], file)?;
        rows.push((date, parse_localized(&record[value_idx])));
    }
    sort_rows(&mut rows, file)?;

    let (dates, values) = rows.into_iter().unzip();
    BenchmarkSeries::new(dates, values)
}
