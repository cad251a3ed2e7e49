//! Day-by-day portfolio simulation.
//!
//! Each trading date runs, in order:
//! 1. stop evaluation on every open position
//! 2. monthly rebalance into the top-N scored tickers
//! 3. mark-to-market
//!
//! After the last date every remaining position is liquidated at that date's
//! price. Missing prices never abort a run; the affected ticker is skipped.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::error::RotatraderError;
use super::execution::{check_stops, shares_for_allocation, StopRules};
use super::matrix::{PriceMatrix, ScoreMatrix, ValuePoint};
use super::metrics::Statistics;
use super::portfolio::PortfolioState;
use super::position::{Position, Trade, TradeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceFrequency {
    /// Last trading date of each calendar month.
    #[default]
    Monthly,
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Monthly => f.write_str("monthly"),
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" | "m" | "me" => Ok(RebalanceFrequency::Monthly),
            other => Err(format!("unsupported rebalance frequency '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub top_n: usize,
    pub fixed_stop_loss: f64,
    pub trailing_stop: f64,
    pub initial_cash: f64,
    pub slippage_bps: f64,
    pub rebalance: RebalanceFrequency,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            top_n: 20,
            fixed_stop_loss: 0.10,
            trailing_stop: 0.15,
            initial_cash: 1_000_000.0,
            slippage_bps: 0.0,
            rebalance: RebalanceFrequency::Monthly,
        }
    }
}

impl StrategyParams {
    pub fn stop_rules(&self) -> StopRules {
        StopRules {
            fixed_stop_loss: self.fixed_stop_loss,
            trailing_stop: self.trailing_stop,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    /// One entry per trading date.
    pub values: Vec<ValuePoint>,
    pub trades: Vec<Trade>,
    pub stats: Statistics,
    /// Positions still open because the last date had no price for them.
    pub unliquidated: Vec<Position>,
}

impl BacktestResult {
    pub fn value_series(&self) -> Vec<f64> {
        self.values.iter().map(|p| p.value).collect()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.values.last().map(|p| p.value)
    }
}

/// `true` at each date that closes its calendar month within `dates`.
pub fn rebalance_mask(dates: &[NaiveDate], frequency: RebalanceFrequency) -> Vec<bool> {
    match frequency {
        RebalanceFrequency::Monthly => (0..dates.len())
            .map(|i| match dates.get(i + 1) {
                Some(next) => (next.year(), next.month()) != (dates[i].year(), dates[i].month()),
                None => true,
            })
            .collect(),
    }
}

fn validate_params(params: &StrategyParams) -> Result<(), RotatraderError> {
    if !(params.initial_cash > 0.0) || !params.initial_cash.is_finite() {
        return Err(RotatraderError::invalid(
            "backtest",
            "initial_cash",
            "must be a positive number",
        ));
    }
    if !(params.slippage_bps >= 0.0) {
        return Err(RotatraderError::invalid(
            "backtest",
            "slippage_bps",
            "must be non-negative",
        ));
    }
    Ok(())
}

/// Ranked picks for one score row: missing scores dropped, stable descending
/// sort, first `top_n` kept.
fn top_picks(scores: &ScoreMatrix, row: usize, top_n: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f64)> = (0..scores.n_tickers())
        .filter_map(|j| scores.get(row, j).filter(|s| !s.is_nan()).map(|s| (j, s)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(top_n).map(|(j, _)| j).collect()
}

pub fn run_backtest(
    prices: &PriceMatrix,
    scores: &ScoreMatrix,
    params: &StrategyParams,
) -> Result<BacktestResult, RotatraderError> {
    validate_params(params)?;

    let dates = prices.dates();
    let price_index: HashMap<&str, usize> = prices
        .tickers()
        .iter()
        .enumerate()
        .map(|(j, t)| (t.as_str(), j))
        .collect();
    let price_at = |row: usize, ticker: &str| -> Option<f64> {
        price_index
            .get(ticker)
            .and_then(|&j| prices.get(row, j))
            .filter(|p| p.is_finite())
    };

    let rules = params.stop_rules();
    let mask = rebalance_mask(dates, params.rebalance);
    let mut portfolio = PortfolioState::new(params.initial_cash, params.slippage_bps);
    let mut values = Vec::with_capacity(dates.len());

    for (row, &date) in dates.iter().enumerate() {
        check_stops(&mut portfolio, date, |t| price_at(row, t), &rules);

        if mask[row] {
            if let Some(score_row) = scores.date_index(date) {
                rebalance(
                    &mut portfolio,
                    date,
                    scores,
                    score_row,
                    params,
                    |t| price_at(row, t),
                );
            }
        }

        let value = portfolio.mark_to_market(|t| price_at(row, t));
        values.push(ValuePoint { date, value });
    }

    let last_row = dates.len() - 1;
    let last_date = dates[last_row];
    let held: Vec<String> = portfolio.positions.keys().cloned().collect();
    for ticker in held {
        if let Some(price) = price_at(last_row, ticker.as_str()) {
            portfolio.close_position(last_date, &ticker, price, TradeReason::Final);
        }
    }

    let unliquidated: Vec<Position> = portfolio.positions.into_values().collect();
    if !unliquidated.is_empty() {
        warn!(
            count = unliquidated.len(),
            date = %last_date,
            "positions left open: no price on the final date"
        );
    }

    let series: Vec<f64> = values.iter().map(|p: &ValuePoint| p.value).collect();
    let stats = Statistics::compute(&series, portfolio.trades.len());

    Ok(BacktestResult {
        values,
        trades: portfolio.trades,
        stats,
        unliquidated,
    })
}

/// Drop holdings outside the picks, then split cash evenly across the
/// picks not yet held. The per-name allocation is fixed before any buy.
fn rebalance<F>(
    portfolio: &mut PortfolioState,
    date: NaiveDate,
    scores: &ScoreMatrix,
    score_row: usize,
    params: &StrategyParams,
    price_of: F,
) where
    F: Fn(&str) -> Option<f64>,
{
    let picks: Vec<&str> = top_picks(scores, score_row, params.top_n)
        .into_iter()
        .map(|j| scores.tickers()[j].as_str())
        .collect();

    let dropped: Vec<String> = portfolio
        .positions
        .keys()
        .filter(|t| !picks.contains(&t.as_str()))
        .cloned()
        .collect();
    for ticker in &dropped {
        if let Some(price) = price_of(ticker.as_str()) {
            portfolio.close_position(date, ticker, price, TradeReason::RebalDrop);
        }
    }

    let new_names: Vec<&str> = picks
        .iter()
        .copied()
        .filter(|t| !portfolio.has_position(t))
        .collect();
    if new_names.is_empty() {
        return;
    }
    let allocation = portfolio.cash / new_names.len() as f64;

    let mut bought = 0;
    for &ticker in &new_names {
        let Some(price) = price_of(ticker).filter(|p| *p > 0.0) else {
            continue;
        };
        let shares = shares_for_allocation(allocation, price, params.slippage_bps);
        if portfolio.open_position(date, ticker, price, shares).is_some() {
            bought += 1;
        }
    }

    debug!(
        %date,
        picks = picks.len(),
        dropped = dropped.len(),
        bought,
        cash = portfolio.cash,
        "rebalance"
    );
}
