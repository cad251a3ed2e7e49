//! Portfolio state owned by a single backtest run.
//!
//! Cash only changes through [`PortfolioState::open_position`] and
//! [`PortfolioState::close_position`], which also append to the trade log.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use super::execution::{buy_price_factor, sell_price_factor};
use super::position::{Position, Side, Trade, TradeReason};

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub slippage_bps: f64,
    /// Keyed by ticker; iteration is in ticker order.
    pub positions: BTreeMap<String, Position>,
    pub trades: Vec<Trade>,
}

impl PortfolioState {
    pub fn new(initial_cash: f64, slippage_bps: f64) -> Self {
        PortfolioState {
            cash: initial_cash,
            slippage_bps,
            positions: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn has_position(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Buy `shares` at `price` plus slippage. If the cost would exceed cash,
    /// one share fewer is bought. Returns the updated cash, or `None` when
    /// nothing was bought (ticker already held, or zero shares).
    pub fn open_position(
        &mut self,
        date: NaiveDate,
        ticker: &str,
        price: f64,
        shares: u64,
    ) -> Option<f64> {
        if shares == 0 || self.has_position(ticker) {
            return None;
        }
        let unit_cost = price * buy_price_factor(self.slippage_bps);
        let mut shares = shares;
        if shares as f64 * unit_cost > self.cash {
            shares -= 1;
        }
        if shares == 0 {
            return None;
        }

        self.cash -= shares as f64 * unit_cost;
        self.positions
            .insert(ticker.to_string(), Position::open(ticker, date, price, shares));
        self.trades.push(Trade {
            date,
            ticker: ticker.to_string(),
            side: Side::Buy,
            price,
            shares,
            reason: TradeReason::RebalAdd,
        });
        debug!(%date, ticker, price, shares, "buy");
        Some(self.cash)
    }

    /// Sell the whole position at `price` less slippage. Returns the updated
    /// cash, or `None` if `ticker` is not held.
    pub fn close_position(
        &mut self,
        date: NaiveDate,
        ticker: &str,
        price: f64,
        reason: TradeReason,
    ) -> Option<f64> {
        let position = self.positions.remove(ticker)?;
        self.cash += position.shares as f64 * price * sell_price_factor(self.slippage_bps);
        self.trades.push(Trade {
            date,
            ticker: position.ticker,
            side: Side::Sell,
            price,
            shares: position.shares,
            reason,
        });
        debug!(%date, ticker, price, shares = position.shares, %reason, "sell");
        Some(self.cash)
    }

    /// Cash plus the value of every position with an observable price,
    /// accumulated in ticker order.
    pub fn mark_to_market<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.positions
            .values()
            .filter_map(|pos| price_of(pos.ticker.as_str()).map(|p| pos.market_value(p)))
            .fold(self.cash, |acc, v| acc + v)
    }
}
