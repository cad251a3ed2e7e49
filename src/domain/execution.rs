//! Fill pricing, share sizing and stop triggers.
//!
//! Slippage is a flat haircut in basis points: buys pay
//! `price * (1 + bps / 10000)`, sells receive `price * (1 - bps / 10000)`.

use chrono::NaiveDate;

use super::portfolio::PortfolioState;
use super::position::{Position, TradeReason};

pub fn buy_price_factor(slippage_bps: f64) -> f64 {
    1.0 + slippage_bps / 10_000.0
}

pub fn sell_price_factor(slippage_bps: f64) -> f64 {
    1.0 - slippage_bps / 10_000.0
}

/// Whole shares affordable with `allocation` at `price` plus buy slippage.
/// Zero when the price or allocation is not positive.
pub fn shares_for_allocation(allocation: f64, price: f64, slippage_bps: f64) -> u64 {
    let unit_cost = price * buy_price_factor(slippage_bps);
    if !(unit_cost > 0.0) || !(allocation > 0.0) || !allocation.is_finite() {
        return 0;
    }
    (allocation / unit_cost).floor() as u64
}

/// Exit thresholds as fractions. A threshold of 1.0 can only fire on a
/// price of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopRules {
    pub fixed_stop_loss: f64,
    pub trailing_stop: f64,
}

impl StopRules {
    /// Trailing stop wins when both rules fire.
    pub fn evaluate(&self, position: &Position, price: f64) -> Option<TradeReason> {
        if position.drawdown_from_peak(price) >= self.trailing_stop {
            Some(TradeReason::TrailStop)
        } else if position.loss_from_entry(price) >= self.fixed_stop_loss {
            Some(TradeReason::StopLoss)
        } else {
            None
        }
    }
}

/// Update running peaks and close every position whose stop fires.
///
/// Two passes: first raise peaks and collect triggered tickers, then close
/// them in ticker order. Positions without a price are left untouched.
///
/// Returns the number of positions closed.
pub fn check_stops<F>(
    portfolio: &mut PortfolioState,
    date: NaiveDate,
    price_of: F,
    rules: &StopRules,
) -> usize
where
    F: Fn(&str) -> Option<f64>,
{
    let mut triggered = Vec::new();
    for (ticker, position) in portfolio.positions.iter_mut() {
        let Some(price) = price_of(ticker.as_str()) else {
            continue;
        };
        position.update_peak(price);
        if let Some(reason) = rules.evaluate(position, price) {
            triggered.push((ticker.clone(), price, reason));
        }
    }

    let count = triggered.len();
    for (ticker, price, reason) in triggered {
        portfolio.close_position(date, &ticker, price, reason);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn make_rules() -> StopRules {
        StopRules {
            fixed_stop_loss: 0.10,
            trailing_stop: 0.15,
        }
    }

    fn make_position(entry: f64, peak: f64) -> Position {
        let mut pos = Position::open("BHP", date(), entry, 10);
        pos.update_peak(peak);
        pos
    }

    #[test]
    fn price_factors() {
        assert!((buy_price_factor(5.0) - 1.0005).abs() < f64::EPSILON);
        assert!((sell_price_factor(5.0) - 0.9995).abs() < f64::EPSILON);
        assert_eq!(buy_price_factor(0.0), 1.0);
        assert_eq!(sell_price_factor(0.0), 1.0);
    }

    #[test]
    fn shares_floor_division() {
        assert_eq!(shares_for_allocation(1_000.0, 30.0, 0.0), 33);
        assert_eq!(shares_for_allocation(1_000.0, 10.0, 100.0), 99);
        assert_eq!(shares_for_allocation(5.0, 10.0, 0.0), 0);
    }

    #[test]
    fn shares_degenerate_inputs() {
        assert_eq!(shares_for_allocation(1_000.0, 0.0, 0.0), 0);
        assert_eq!(shares_for_allocation(1_000.0, -1.0, 0.0), 0);
        assert_eq!(shares_for_allocation(-5.0, 10.0, 0.0), 0);
        assert_eq!(shares_for_allocation(f64::NAN, 10.0, 0.0), 0);
    }

    #[test]
    fn trailing_stop_fires() {
        let pos = make_position(100.0, 120.0);
        // 15% off the peak, only 2% below entry
        assert_eq!(make_rules().evaluate(&pos, 102.0), Some(TradeReason::TrailStop));
    }

    #[test]
    fn fixed_stop_fires() {
        let pos = make_position(100.0, 100.0);
        // 10% below entry and peak, trailing threshold not reached
        assert_eq!(make_rules().evaluate(&pos, 90.0), Some(TradeReason::StopLoss));
    }

    #[test]
    fn trailing_takes_priority() {
        let pos = make_position(100.0, 100.0);
        assert_eq!(make_rules().evaluate(&pos, 80.0), Some(TradeReason::TrailStop));
    }

    #[test]
    fn no_stop_within_thresholds() {
        let pos = make_position(100.0, 105.0);
        assert_eq!(make_rules().evaluate(&pos, 95.0), None);
    }

    #[test]
    fn disabled_stops_never_fire_on_positive_prices() {
        let rules = StopRules {
            fixed_stop_loss: 1.0,
            trailing_stop: 1.0,
        };
        let pos = make_position(100.0, 200.0);
        assert_eq!(rules.evaluate(&pos, 0.01), None);
    }

    #[test]
    fn check_stops_updates_peaks_and_closes() {
        let mut portfolio = PortfolioState::new(10_000.0, 0.0);
        portfolio.open_position(date(), "AAA", 100.0, 10);
        portfolio.open_position(date(), "BBB", 100.0, 10);
        portfolio.open_position(date(), "CCC", 100.0, 10);

        let prices: HashMap<&str, f64> = [("AAA", 130.0), ("BBB", 85.0)].into_iter().collect();
        let closed = check_stops(&mut portfolio, date(), |t| prices.get(t).copied(), &make_rules());

        assert_eq!(closed, 1);
        assert!(portfolio.has_position("AAA"));
        assert!(!portfolio.has_position("BBB"));
        // missing price: untouched
        assert!(portfolio.has_position("CCC"));
        assert!((portfolio.positions["AAA"].running_peak - 130.0).abs() < f64::EPSILON);
        let sell = portfolio.trades.last().unwrap();
        assert_eq!(sell.ticker, "BBB");
        assert_eq!(sell.reason, TradeReason::TrailStop);
    }
}
