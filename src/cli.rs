//! CLI definition and dispatch.
//!
//! Every run command follows the same stages: load and validate the config,
//! load and align market data, split it into a training and a testing range,
//! choose weights or parameters on the training range, then backtest the
//! choice on both ranges and export reports.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{run_backtest, BacktestResult, RebalanceFrequency, StrategyParams};
use crate::domain::config_validation::{
    optional_date, parse_f64_list, parse_usize_list, parse_weight_tuples, validate_config,
};
use crate::domain::error::RotatraderError;
use crate::domain::indicator::{compute_indicators, Factor, IndicatorWindows};
use crate::domain::matrix::{
    align_with_benchmark, clean_prices, BenchmarkSeries, CleaningRules, PriceMatrix,
};
use crate::domain::optimizer::genetic::{GaConfig, GaOutcome, GeneticOptimizer};
use crate::domain::optimizer::grid::{grid_search, GridWinner, ParamGrid, ParamSet};
use crate::domain::optimizer::BacktestFitness;
use crate::domain::scoring::{score_from_weights, FactorWeights};
use crate::domain::signals::compute_signals;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "rotatrader", about = "Monthly top-N rotation backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evolve factor weights on the training range, then backtest them
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search the three-factor parameter grid on the training range
    Grid {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Backtest fixed factor weights
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated `factor=weight` pairs; uniform when omitted
        #[arg(short, long, value_parser = parse_weights)]
        weights: Option<FactorWeights>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Optimize { config, output } => {
            run_with_ports(&config, output.as_deref(), |data, report, settings| {
                optimize_pipeline(data, report, settings).map(|_| ())
            })
        }
        Command::Grid { config, output } => {
            run_with_ports(&config, output.as_deref(), |data, report, settings| {
                grid_pipeline(data, report, settings).map(|_| ())
            })
        }
        Command::Backtest {
            config,
            output,
            weights,
        } => {
            let weights = weights.unwrap_or_else(uniform_weights);
            run_with_ports(&config, output.as_deref(), |data, report, settings| {
                weights_pipeline(data, report, settings, &weights)
            })
        }
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RotatraderError> {
    FileConfigAdapter::from_file(path).map_err(|e| RotatraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn run_validate(config_path: &Path) -> Result<(), RotatraderError> {
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;
    build_settings(&adapter)?;
    eprintln!("{}: configuration is valid", config_path.display());
    Ok(())
}

fn run_with_ports<F>(
    config_path: &Path,
    output: Option<&Path>,
    pipeline: F,
) -> Result<(), RotatraderError>
where
    F: FnOnce(&dyn MarketDataPort, &dyn ReportPort, &RunSettings) -> Result<(), RotatraderError>,
{
    info!(path = %config_path.display(), "loading config");
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;
    let mut settings = build_settings(&adapter)?;
    if let Some(dir) = output {
        settings.out_dir = dir.to_path_buf();
    }

    let data = CsvAdapter::from_config(&adapter)?;
    let report = CsvReportAdapter::new(&settings.out_dir)?;
    pipeline(&data, &report, &settings)?;
    info!(out_dir = %settings.out_dir.display(), "done");
    Ok(())
}

/// Parse `mom_12_1=0.5,rsi_14=0.5`. Factors not named get weight zero.
pub fn parse_weights(raw: &str) -> Result<FactorWeights, String> {
    let mut weights = FactorWeights::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected factor=weight, got '{pair}'"))?;
        let factor: Factor = name.parse()?;
        let weight: f64 = value
            .trim()
            .parse()
            .ok()
            .filter(|w: &f64| w.is_finite() && *w >= 0.0)
            .ok_or_else(|| format!("weight for {factor} must be a non-negative number"))?;
        weights.insert(factor, weight);
    }
    if weights.is_empty() {
        return Err("no weights given".to_string());
    }
    Ok(weights)
}

pub fn uniform_weights() -> FactorWeights {
    let w = 1.0 / Factor::ALL.len() as f64;
    Factor::ALL.into_iter().map(|f| (f, w)).collect()
}

/// An inclusive date range; an open bound extends to the data's edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    fn bounds(&self, dates: &[NaiveDate]) -> Option<(NaiveDate, NaiveDate)> {
        Some((
            self.start.unwrap_or(*dates.first()?),
            self.end.unwrap_or(*dates.last()?),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateSplit {
    pub train: DateWindow,
    pub test: DateWindow,
}

/// Everything a run needs from the config besides the data paths.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub strategy: StrategyParams,
    pub windows: IndicatorWindows,
    pub ga: GaConfig,
    pub grid: ParamGrid,
    pub split: DateSplit,
    pub cleaning: CleaningRules,
    pub out_dir: PathBuf,
}

fn get_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    usize::try_from(config.get_int(section, key, default as i64)).unwrap_or(default)
}

pub fn build_settings(config: &dyn ConfigPort) -> Result<RunSettings, RotatraderError> {
    Ok(RunSettings {
        strategy: build_strategy_params(config)?,
        windows: build_indicator_windows(config),
        ga: build_ga_config(config),
        grid: build_param_grid(config)?,
        split: build_split(config)?,
        cleaning: build_cleaning_rules(config),
        out_dir: config
            .get_string("report", "out_dir")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("out")),
    })
}

pub fn build_strategy_params(config: &dyn ConfigPort) -> Result<StrategyParams, RotatraderError> {
    let d = StrategyParams::default();
    let rebalance = match config.get_string("backtest", "rebalance") {
        Some(s) => s
            .parse::<RebalanceFrequency>()
            .map_err(|reason| RotatraderError::invalid("backtest", "rebalance", reason))?,
        None => d.rebalance,
    };
    Ok(StrategyParams {
        top_n: get_usize(config, "backtest", "top_n", d.top_n),
        fixed_stop_loss: config.get_double("backtest", "fixed_stop_loss", d.fixed_stop_loss),
        trailing_stop: config.get_double("backtest", "trailing_stop", d.trailing_stop),
        initial_cash: config.get_double("backtest", "initial_cash", d.initial_cash),
        slippage_bps: config.get_double("backtest", "slippage_bps", d.slippage_bps),
        rebalance,
    })
}

pub fn build_indicator_windows(config: &dyn ConfigPort) -> IndicatorWindows {
    let d = IndicatorWindows::default();
    let window = |key: &str, default: usize| get_usize(config, "indicators", key, default);
    IndicatorWindows {
        skip_days: window("skip_days", d.skip_days),
        mom_long_days: window("mom_long_days", d.mom_long_days),
        mom_medium_days: window("mom_medium_days", d.mom_medium_days),
        high_window: window("high_window", d.high_window),
        breakout_window: window("breakout_window", d.breakout_window),
        sma_window: window("sma_window", d.sma_window),
        vol_window: window("vol_window", d.vol_window),
        rsi_period: window("rsi_period", d.rsi_period),
    }
}

pub fn build_ga_config(config: &dyn ConfigPort) -> GaConfig {
    let d = GaConfig::default();
    GaConfig {
        seed: u64::try_from(config.get_int("ga", "seed", d.seed as i64)).unwrap_or(d.seed),
        pop_size: get_usize(config, "ga", "pop_size", d.pop_size),
        generations: get_usize(config, "ga", "generations", d.generations),
        crossover_rate: config.get_double("ga", "crossover_rate", d.crossover_rate),
        mutation_rate: config.get_double("ga", "mutation_rate", d.mutation_rate),
        mutation_scale: config.get_double("ga", "mutation_scale", d.mutation_scale),
        elitism: get_usize(config, "ga", "elitism", d.elitism),
    }
}

const GRID_KEYS: [&str; 7] = [
    "lookback_mom_days",
    "skip_last_days_for_mom",
    "donchian_high_days",
    "top_n",
    "fixed_stop_loss",
    "trailing_stop",
    "weights",
];

/// The default grid when `[grid]` sets nothing; otherwise each missing key
/// contributes only its default parameter value.
pub fn build_param_grid(config: &dyn ConfigPort) -> Result<ParamGrid, RotatraderError> {
    if GRID_KEYS
        .iter()
        .all(|key| config.get_string("grid", key).is_none())
    {
        return Ok(ParamGrid::default());
    }
    let raw = |key: &str| config.get_string("grid", key).unwrap_or_default();
    let usizes = |key: &str| parse_usize_list("grid", key, &raw(key));
    let floats = |key: &str| parse_f64_list("grid", key, &raw(key));
    Ok(ParamGrid {
        lookback_mom_days: usizes("lookback_mom_days")?,
        skip_last_days_for_mom: usizes("skip_last_days_for_mom")?,
        donchian_high_days: usizes("donchian_high_days")?,
        top_n: usizes("top_n")?,
        fixed_stop_loss: floats("fixed_stop_loss")?,
        trailing_stop: floats("trailing_stop")?,
        weights: parse_weight_tuples("grid", "weights", &raw("weights"))?,
    })
}

pub fn build_cleaning_rules(config: &dyn ConfigPort) -> CleaningRules {
    let d = CleaningRules::default();
    let rule = |key: &str, default: f64| config.get_double("cleaning", key, default);
    CleaningRules {
        max_missing_ratio: rule("max_missing_ratio", d.max_missing_ratio),
        min_price: rule("min_price", d.min_price),
        min_traded_ratio: rule("min_traded_ratio", d.min_traded_ratio),
        max_abs_daily_return: rule("max_abs_daily_return", d.max_abs_daily_return),
    }
}

pub fn build_split(config: &dyn ConfigPort) -> Result<DateSplit, RotatraderError> {
    let window = |start: &str, end: &str| -> Result<DateWindow, RotatraderError> {
        Ok(DateWindow {
            start: optional_date(config, "split", start)?,
            end: optional_date(config, "split", end)?,
        })
    };
    Ok(DateSplit {
        train: window("train_start", "train_end")?,
        test: window("test_start", "test_end")?,
    })
}

/// Prices and benchmark over one date range.
#[derive(Debug, Clone)]
pub struct MarketSlice {
    pub label: &'static str,
    pub prices: PriceMatrix,
    pub benchmark: BenchmarkSeries,
}

/// Load both series, drop tickers failing `rules`, and restrict what is
/// left to the dates shared with the benchmark.
pub fn load_market_data(
    data: &dyn MarketDataPort,
    rules: &CleaningRules,
) -> Result<(PriceMatrix, BenchmarkSeries), RotatraderError> {
    let prices = clean_prices(&data.load_prices()?, rules)?;
    let benchmark = data.load_benchmark()?;
    let (prices, benchmark) = align_with_benchmark(&prices, &benchmark)?;
    info!(
        dates = prices.n_dates(),
        tickers = prices.n_tickers(),
        "market data aligned"
    );
    Ok((prices, benchmark))
}

pub fn slice_market(
    label: &'static str,
    prices: &PriceMatrix,
    benchmark: &BenchmarkSeries,
    window: &DateWindow,
) -> Result<MarketSlice, RotatraderError> {
    let (start, end) = window
        .bounds(prices.dates())
        .ok_or_else(|| RotatraderError::degenerate("empty price index"))?;
    let prices = prices.slice_dates(start, end)?;
    info!(label, %start, %end, dates = prices.n_dates(), "date range");
    Ok(MarketSlice {
        label,
        prices,
        benchmark: benchmark.slice_dates(start, end),
    })
}

fn train_test_slices(
    data: &dyn MarketDataPort,
    settings: &RunSettings,
) -> Result<(MarketSlice, MarketSlice), RotatraderError> {
    let (prices, benchmark) = load_market_data(data, &settings.cleaning)?;
    Ok((
        slice_market("train", &prices, &benchmark, &settings.split.train)?,
        slice_market("test", &prices, &benchmark, &settings.split.test)?,
    ))
}

pub fn backtest_weights(
    slice: &MarketSlice,
    weights: &FactorWeights,
    settings: &RunSettings,
) -> Result<BacktestResult, RotatraderError> {
    let indicators = compute_indicators(&slice.prices, &settings.windows);
    let scores = score_from_weights(&indicators, weights);
    run_backtest(&slice.prices, &scores, &settings.strategy)
}

fn report_slice(
    report: &dyn ReportPort,
    slice: &MarketSlice,
    result: &BacktestResult,
    initial_cash: f64,
) -> Result<(), RotatraderError> {
    info!(
        label = slice.label,
        final_value = result.final_value(),
        cagr = result.stats.cagr,
        sharpe = result.stats.sharpe_ratio,
        max_drawdown = result.stats.max_drawdown,
        trades = result.stats.trade_count,
        "backtest finished"
    );
    report.write_run(slice.label, result, &slice.benchmark.normalized(initial_cash))
}

/// Genetic search on the training range, then both ranges backtested with
/// the winning weights.
pub fn optimize_pipeline(
    data: &dyn MarketDataPort,
    report: &dyn ReportPort,
    settings: &RunSettings,
) -> Result<GaOutcome, RotatraderError> {
    let (train, test) = train_test_slices(data, settings)?;

    let indicators = compute_indicators(&train.prices, &settings.windows);
    let fitness = BacktestFitness::new(&train.prices, indicators, settings.strategy.clone());
    let outcome = GeneticOptimizer::new(settings.ga.clone()).run(&fitness)?;
    let weights = outcome.best_weights();
    info!(fitness = outcome.best_fitness, ?weights, "chosen weights");
    report.write_chosen_weights(&weights, Some(outcome.best_fitness))?;

    for slice in [&train, &test] {
        let result = backtest_weights(slice, &weights, settings)?;
        report_slice(report, slice, &result, settings.strategy.initial_cash)?;
    }
    Ok(outcome)
}

/// Grid search on the training range. Without a winner the default
/// parameter set is backtested instead and `None` is returned.
pub fn grid_pipeline(
    data: &dyn MarketDataPort,
    report: &dyn ReportPort,
    settings: &RunSettings,
) -> Result<Option<GridWinner>, RotatraderError> {
    let (train, test) = train_test_slices(data, settings)?;

    let winner = grid_search(&train.prices, &settings.grid, &settings.strategy);
    let chosen = match &winner {
        Some(w) => {
            report.write_chosen_params(&w.params, Some(w.sharpe))?;
            w.params.clone()
        }
        None => {
            warn!("no grid combination produced a finite sharpe; using default parameters");
            let fallback = ParamSet::default();
            report.write_chosen_params(&fallback, None)?;
            fallback
        }
    };

    let params = chosen.strategy_params(&settings.strategy);
    for slice in [&train, &test] {
        let signals = compute_signals(&slice.prices, &chosen.signal_params());
        let result = run_backtest(&slice.prices, &signals.score, &params)?;
        report_slice(report, slice, &result, params.initial_cash)?;
    }
    Ok(winner)
}

pub fn weights_pipeline(
    data: &dyn MarketDataPort,
    report: &dyn ReportPort,
    settings: &RunSettings,
    weights: &FactorWeights,
) -> Result<(), RotatraderError> {
    let (train, test) = train_test_slices(data, settings)?;
    report.write_chosen_weights(weights, None)?;
    for slice in [&train, &test] {
        let result = backtest_weights(slice, weights, settings)?;
        report_slice(report, slice, &result, settings.strategy.initial_cash)?;
    }
    Ok(())
}
