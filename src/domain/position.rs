//! Open positions and the trade log record.

use chrono::NaiveDate;
use std::fmt;

/// A long holding in a single ticker. Closed in full; never partially.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub shares: u64,
    /// Highest observed price since entry; starts at the entry price.
    pub running_peak: f64,
}

impl Position {
    pub fn open(ticker: &str, entry_date: NaiveDate, entry_price: f64, shares: u64) -> Self {
        Position {
            ticker: ticker.to_string(),
            entry_date,
            entry_price,
            shares,
            running_peak: entry_price,
        }
    }

    pub fn update_peak(&mut self, price: f64) {
        if price > self.running_peak {
            self.running_peak = price;
        }
    }

    /// `(peak - price) / peak`, or 0.0 for a non-positive peak.
    pub fn drawdown_from_peak(&self, price: f64) -> f64 {
        if self.running_peak <= 0.0 {
            return 0.0;
        }
        (self.running_peak - price) / self.running_peak
    }

    /// `(entry - price) / entry`, or 0.0 for a non-positive entry.
    pub fn loss_from_entry(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (self.entry_price - price) / self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeReason {
    RebalAdd,
    RebalDrop,
    StopLoss,
    TrailStop,
    Final,
}

impl fmt::Display for TradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeReason::RebalAdd => "REBAL_ADD",
            TradeReason::RebalDrop => "REBAL_DROP",
            TradeReason::StopLoss => "STOP_LOSS",
            TradeReason::TrailStop => "TRAIL_STOP",
            TradeReason::Final => "FINAL",
        };
        f.write_str(s)
    }
}

/// One fill. `price` is the market price before slippage.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub date: NaiveDate,
    pub ticker: String,
    pub side: Side,
    pub price: f64,
    pub shares: u64,
    pub reason: TradeReason,
}
