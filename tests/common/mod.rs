#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rotatrader::domain::backtest::BacktestResult;
use rotatrader::domain::error::RotatraderError;
use rotatrader::domain::indicator::IndicatorWindows;
use rotatrader::domain::matrix::{BenchmarkSeries, Matrix, PriceMatrix, ScoreMatrix, ValuePoint};
use rotatrader::domain::optimizer::grid::ParamSet;
use rotatrader::domain::scoring::FactorWeights;
use rotatrader::ports::data_port::MarketDataPort;
use rotatrader::ports::report_port::ReportPort;
use std::cell::RefCell;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive weekdays starting at `start` (or the next weekday).
pub fn trading_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut d = start;
    while dates.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(d);
        }
        d += Duration::days(1);
    }
    dates
}

pub fn make_matrix(dates: Vec<NaiveDate>, tickers: &[&str], columns: Vec<Vec<Option<f64>>>) -> Matrix {
    Matrix::new(
        dates,
        tickers.iter().map(|t| t.to_string()).collect(),
        columns,
    )
    .unwrap()
}

/// Price columns generated by `f(ticker_index, row)`.
pub fn make_prices<F>(tickers: &[&str], n: usize, f: F) -> PriceMatrix
where
    F: Fn(usize, usize) -> f64,
{
    let dates = trading_days(date(2020, 1, 1), n);
    let columns = (0..tickers.len())
        .map(|j| (0..n).map(|i| Some(f(j, i))).collect())
        .collect();
    make_matrix(dates, tickers, columns)
}

/// FLAT at 100, UP rising 0.5 a day, DOWN falling 0.2 a day.
pub fn scenario_a_prices() -> PriceMatrix {
    make_prices(&["DOWN", "FLAT", "UP"], 400, |j, i| match j {
        0 => 100.0 - 0.2 * i as f64,
        1 => 100.0,
        _ => 100.0 + 0.5 * i as f64,
    })
}

/// Wavy prices with distinct drifts, so factor scores vary across tickers.
pub fn synthetic_prices(n_tickers: usize, n: usize) -> PriceMatrix {
    let names: Vec<String> = (0..n_tickers).map(|j| format!("T{j:02}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    make_prices(&refs, n, |j, i| {
        let t = i as f64;
        let drift = 0.002 * (j as f64 - n_tickers as f64 / 2.0);
        50.0 * (1.0 + drift).powf(t) * (1.0 + 0.05 * ((t / (5.0 + j as f64)).sin()))
    })
}

/// Constant score per ticker: `scores[j]` on every date.
pub fn constant_scores(prices: &PriceMatrix, scores: &[f64]) -> ScoreMatrix {
    prices.with_columns(
        scores
            .iter()
            .map(|s| vec![Some(*s); prices.n_dates()])
            .collect(),
    )
}

pub fn benchmark_for(prices: &PriceMatrix) -> BenchmarkSeries {
    let values = (0..prices.n_dates())
        .map(|i| Some(1_000.0 + i as f64))
        .collect();
    BenchmarkSeries::new(prices.dates().to_vec(), values).unwrap()
}

/// Windows short enough for a few hundred rows of data.
pub fn short_windows() -> IndicatorWindows {
    IndicatorWindows {
        skip_days: 2,
        mom_long_days: 30,
        mom_medium_days: 15,
        high_window: 30,
        breakout_window: 20,
        sma_window: 20,
        vol_window: 20,
        rsi_period: 5,
    }
}

pub struct MockDataPort {
    pub prices: PriceMatrix,
    pub benchmark: BenchmarkSeries,
}

impl MockDataPort {
    pub fn new(prices: PriceMatrix) -> Self {
        let benchmark = benchmark_for(&prices);
        Self { prices, benchmark }
    }
}

impl MarketDataPort for MockDataPort {
    fn load_prices(&self) -> Result<PriceMatrix, RotatraderError> {
        Ok(self.prices.clone())
    }

    fn load_benchmark(&self) -> Result<BenchmarkSeries, RotatraderError> {
        Ok(self.benchmark.clone())
    }
}

#[derive(Default)]
pub struct MockReportPort {
    pub runs: RefCell<Vec<(String, BacktestResult, Vec<ValuePoint>)>>,
    pub weights: RefCell<Option<(FactorWeights, Option<f64>)>>,
    pub params: RefCell<Option<(ParamSet, Option<f64>)>>,
}

impl ReportPort for MockReportPort {
    fn write_run(
        &self,
        label: &str,
        result: &BacktestResult,
        benchmark: &[ValuePoint],
    ) -> Result<(), RotatraderError> {
        self.runs
            .borrow_mut()
            .push((label.to_string(), result.clone(), benchmark.to_vec()));
        Ok(())
    }

    fn write_chosen_weights(
        &self,
        weights: &FactorWeights,
        best_fitness: Option<f64>,
    ) -> Result<(), RotatraderError> {
        *self.weights.borrow_mut() = Some((weights.clone(), best_fitness));
        Ok(())
    }

    fn write_chosen_params(
        &self,
        params: &ParamSet,
        sharpe: Option<f64>,
    ) -> Result<(), RotatraderError> {
        *self.params.borrow_mut() = Some((params.clone(), sharpe));
        Ok(())
    }
}
