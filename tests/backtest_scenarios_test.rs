//! End-to-end backtest scenarios and portfolio invariants.

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use rotatrader::domain::backtest::{run_backtest, BacktestResult, StrategyParams};
use rotatrader::domain::execution::{buy_price_factor, sell_price_factor};
use rotatrader::domain::indicator::{compute_indicators, Factor};
use rotatrader::domain::matrix::PriceMatrix;
use rotatrader::domain::position::{Position, Side, TradeReason};
use rotatrader::domain::scoring::{score_from_weights, FactorWeights};
use std::collections::BTreeMap;

fn params(top_n: usize) -> StrategyParams {
    StrategyParams {
        top_n,
        ..StrategyParams::default()
    }
}

/// Replays the trade log against the prices and checks, date by date, that
/// the reported value is cash plus priced holdings. Buys never overspend,
/// share counts are positive and a ticker is never held twice. Returns the
/// cash left after final liquidation.
fn check_replay(
    prices: &PriceMatrix,
    result: &BacktestResult,
    initial_cash: f64,
    slippage_bps: f64,
) -> f64 {
    let mut cash = initial_cash;
    let mut holdings: BTreeMap<String, u64> = BTreeMap::new();
    let mut next = 0;
    let last_row = prices.n_dates() - 1;

    let apply = |cash: &mut f64, holdings: &mut BTreeMap<String, u64>, idx: usize, row: usize| {
        let t = &result.trades[idx];
        assert!(t.shares > 0, "zero-share trade {t:?}");
        // fills happen at that day's close, so an unpriced ticker never trades
        let j = prices.ticker_index(&t.ticker).unwrap();
        assert_eq!(prices.get(row, j), Some(t.price), "{t:?} without a matching price");
        match t.side {
            Side::Buy => {
                let cost = t.shares as f64 * (t.price * buy_price_factor(slippage_bps));
                assert!(cost <= *cash + 1e-9, "buy {t:?} costs {cost} with cash {cash}");
                assert!(
                    holdings.insert(t.ticker.clone(), t.shares).is_none(),
                    "{} held twice",
                    t.ticker
                );
                *cash -= cost;
            }
            Side::Sell => {
                let held = holdings.remove(&t.ticker);
                assert_eq!(held, Some(t.shares), "sell of unheld {t:?}");
                *cash += t.shares as f64 * t.price * sell_price_factor(slippage_bps);
            }
        }
    };

    for (row, point) in result.values.iter().enumerate() {
        while next < result.trades.len()
            && result.trades[next].date == point.date
            && result.trades[next].reason != TradeReason::Final
        {
            apply(&mut cash, &mut holdings, next, row);
            next += 1;
        }

        let expected = holdings.iter().fold(cash, |acc, (ticker, shares)| {
            let j = prices.ticker_index(ticker).unwrap();
            match prices.get(row, j) {
                Some(p) => acc + *shares as f64 * p,
                None => acc,
            }
        });
        assert_relative_eq!(point.value, expected, max_relative = 1e-9);

        if row == last_row {
            while next < result.trades.len() {
                assert_eq!(result.trades[next].reason, TradeReason::Final);
                apply(&mut cash, &mut holdings, next, row);
                next += 1;
            }
        }
    }
    assert_eq!(next, result.trades.len(), "trades after the last date");
    assert_eq!(holdings.len(), result.unliquidated.len());
    cash
}

#[test]
fn scenario_a_falling_ticker_exits_through_stops() {
    let prices = scenario_a_prices();
    // DOWN always ranks first, so only a stop can take it out
    let scores = constant_scores(&prices, &[3.0, 2.0, 1.0]);
    let result = run_backtest(&prices, &scores, &params(1)).unwrap();

    let down_sells: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.ticker == "DOWN" && t.side == Side::Sell)
        .collect();
    assert!(down_sells
        .iter()
        .any(|t| matches!(t.reason, TradeReason::StopLoss | TradeReason::TrailStop)));
    assert!(down_sells.iter().all(|t| t.reason != TradeReason::RebalDrop));
    assert!(result.trades.iter().all(|t| t.ticker == "DOWN"));
    check_replay(&prices, &result, 1_000_000.0, 0.0);
}

#[test]
fn scenario_a_with_factor_scores() {
    let prices = scenario_a_prices();
    let indicators = compute_indicators(&prices, &short_windows());
    // RSI is undefined for the two monotone tickers, so it is left out
    let weights: FactorWeights = Factor::ALL
        .into_iter()
        .filter(|f| *f != Factor::Rsi14)
        .map(|f| (f, 1.0))
        .collect();
    let scores = score_from_weights(&indicators, &weights);
    let result = run_backtest(&prices, &scores, &params(1)).unwrap();

    assert!(!result.trades.is_empty());
    for t in result.trades.iter().filter(|t| t.ticker == "DOWN" && t.side == Side::Sell) {
        assert!(
            matches!(
                t.reason,
                TradeReason::StopLoss | TradeReason::TrailStop | TradeReason::Final
            ),
            "DOWN left through {:?}",
            t.reason
        );
    }
    check_replay(&prices, &result, 1_000_000.0, 0.0);
}

#[test]
fn scenario_b_invests_all_but_rounding_remainder() {
    let prices = make_prices(&["ONLY", "OTHER"], 60, |j, _| if j == 0 { 37.0 } else { 50.0 });
    let scores = constant_scores(&prices, &[1.0, 0.0]);
    let params = StrategyParams {
        top_n: 1,
        fixed_stop_loss: 1.0,
        trailing_stop: 1.0,
        initial_cash: 1_000_000.0,
        slippage_bps: 0.0,
        ..StrategyParams::default()
    };
    let result = run_backtest(&prices, &scores, &params).unwrap();

    let buy = &result.trades[0];
    assert_eq!(buy.ticker, "ONLY");
    assert_eq!(buy.date, date(2020, 1, 31));
    assert_eq!(buy.shares, 27_027);
    let invested = buy.shares as f64 * buy.price;
    let remainder = params.initial_cash - invested;
    assert_eq!(remainder, 1.0);
    assert!(remainder < buy.price);

    // held to the end, then liquidated
    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.trades[1].reason, TradeReason::Final);
    assert!(result.values.iter().all(|p| p.value == 1_000_000.0));
}

#[test]
fn scenario_c_final_value_equals_liquidated_cash() {
    let prices = synthetic_prices(6, 150);
    let scores = constant_scores(&prices, &[0.1, 0.5, 0.3, 0.9, 0.7, 0.2]);
    let result = run_backtest(&prices, &scores, &params(3)).unwrap();

    assert!(result.unliquidated.is_empty());
    let last_date = *prices.dates().last().unwrap();
    let finals: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.reason == TradeReason::Final)
        .collect();
    assert!(!finals.is_empty());
    assert!(finals.iter().all(|t| t.date == last_date));

    let cash = check_replay(&prices, &result, 1_000_000.0, 0.0);
    assert_eq!(result.final_value(), Some(cash));
}

#[test]
fn missing_final_price_leaves_position_open() {
    let mut columns: Vec<Vec<Option<f64>>> = vec![(0..40).map(|i| Some(10.0 + i as f64)).collect()];
    columns[0][39] = None;
    let prices = make_matrix(trading_days(date(2020, 1, 1), 40), &["GAP"], columns);
    let scores = constant_scores(&prices, &[1.0]);
    let result = run_backtest(&prices, &scores, &params(1)).unwrap();

    assert_eq!(result.unliquidated.len(), 1);
    assert_eq!(result.unliquidated[0].ticker, "GAP");
    assert!(result.trades.iter().all(|t| t.reason != TradeReason::Final));
    check_replay(&prices, &result, 1_000_000.0, 0.0);
}

fn price_columns(n_tickers: usize, n: usize) -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::option::weighted(0.9, 5.0f64..200.0), n),
        n_tickers,
    )
}

fn score_columns(n_tickers: usize, n: usize) -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::option::weighted(0.8, -2.0f64..2.0), n),
        n_tickers,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn portfolio_invariants_hold(
        price_cols in price_columns(4, 70),
        score_cols in score_columns(4, 70),
        top_n in 1usize..=4,
        slippage_bps in 0.0f64..50.0,
        fixed_stop_loss in 0.05f64..0.5,
        trailing_stop in 0.05f64..0.5,
    ) {
        let dates = trading_days(date(2023, 1, 2), 70);
        let tickers = ["AAA", "BBB", "CCC", "DDD"];
        let prices = make_matrix(dates.clone(), &tickers, price_cols);
        let scores = make_matrix(dates, &tickers, score_cols);
        let params = StrategyParams {
            top_n,
            fixed_stop_loss,
            trailing_stop,
            initial_cash: 100_000.0,
            slippage_bps,
            ..StrategyParams::default()
        };
        let result = run_backtest(&prices, &scores, &params).unwrap();

        prop_assert_eq!(result.values.len(), prices.n_dates());
        prop_assert_eq!(result.stats.trade_count, result.trades.len());
        check_replay(&prices, &result, params.initial_cash, slippage_bps);
        for pos in &result.unliquidated {
            prop_assert!(pos.running_peak >= pos.entry_price);
        }
    }

    #[test]
    fn running_peak_is_monotone(
        entry in 1.0f64..100.0,
        path in prop::collection::vec(0.5f64..200.0, 1..50),
    ) {
        let mut pos = Position::open("AAA", date(2024, 1, 2), entry, 10);
        let mut previous = pos.running_peak;
        for price in path {
            pos.update_peak(price);
            prop_assert!(pos.running_peak >= previous);
            prop_assert!(pos.running_peak >= pos.entry_price);
            prop_assert!(pos.running_peak >= price);
            previous = pos.running_peak;
        }
    }
}
