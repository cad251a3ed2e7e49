//! Configuration validation.
//!
//! Every check reads through [`ConfigPort`] and runs before any market data
//! is loaded. Keys that are absent fall back to their defaults and pass.

use chrono::NaiveDate;
use std::str::FromStr;

use crate::domain::backtest::RebalanceFrequency;
use crate::domain::error::RotatraderError;
use crate::domain::matrix::CleaningRules;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    validate_data_config(config)?;
    validate_split_config(config)?;
    validate_backtest_config(config)?;
    validate_indicator_config(config)?;
    validate_ga_config(config)?;
    validate_grid_config(config)?;
    validate_cleaning_config(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    for key in ["prices", "benchmark"] {
        match config.get_string("data", key) {
            Some(s) if !s.trim().is_empty() => {}
            _ => {
                return Err(RotatraderError::ConfigMissing {
                    section: "data".to_string(),
                    key: key.to_string(),
                })
            }
        }
    }
    Ok(())
}

pub fn validate_split_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    for (start_key, end_key) in [("train_start", "train_end"), ("test_start", "test_end")] {
        let start = optional_date(config, "split", start_key)?;
        let end = optional_date(config, "split", end_key)?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(RotatraderError::invalid(
                    "split",
                    start_key,
                    format!("{start_key} must not be after {end_key}"),
                ));
            }
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    let cash = config.get_double("backtest", "initial_cash", 1_000_000.0);
    if !(cash > 0.0) || !cash.is_finite() {
        return Err(RotatraderError::invalid(
            "backtest",
            "initial_cash",
            "initial_cash must be positive",
        ));
    }
    let slippage = config.get_double("backtest", "slippage_bps", 0.0);
    if !(slippage >= 0.0) || !slippage.is_finite() {
        return Err(RotatraderError::invalid(
            "backtest",
            "slippage_bps",
            "slippage_bps must be non-negative",
        ));
    }
    positive_int(config, "backtest", "top_n", 20)?;
    for (key, default) in [("fixed_stop_loss", 0.10), ("trailing_stop", 0.15)] {
        check_stop_threshold("backtest", key, config.get_double("backtest", key, default))?;
    }
    if let Some(freq) = config.get_string("backtest", "rebalance") {
        RebalanceFrequency::from_str(freq.trim())
            .map_err(|reason| RotatraderError::invalid("backtest", "rebalance", reason))?;
    }
    Ok(())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    for (key, default) in [
        ("skip_days", 21),
        ("mom_long_days", 252),
        ("mom_medium_days", 126),
        ("high_window", 252),
        ("breakout_window", 100),
        ("sma_window", 200),
        ("vol_window", 252),
        ("rsi_period", 14),
    ] {
        positive_int(config, "indicators", key, default)?;
    }
    Ok(())
}

pub fn validate_ga_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    if config.get_int("ga", "seed", 42) < 0 {
        return Err(RotatraderError::invalid("ga", "seed", "seed must be non-negative"));
    }
    let pop_size = positive_int(config, "ga", "pop_size", 16)?;
    positive_int(config, "ga", "generations", 12)?;
    let elitism = config.get_int("ga", "elitism", 2);
    if elitism < 0 || elitism > pop_size {
        return Err(RotatraderError::invalid(
            "ga",
            "elitism",
            "elitism must be between 0 and pop_size",
        ));
    }
    for (key, default) in [("crossover_rate", 0.8), ("mutation_rate", 0.15)] {
        let rate = config.get_double("ga", key, default);
        if !(0.0..=1.0).contains(&rate) {
            return Err(RotatraderError::invalid(
                "ga",
                key,
                format!("{key} must be between 0 and 1"),
            ));
        }
    }
    let scale = config.get_double("ga", "mutation_scale", 0.1);
    if !(scale >= 0.0) || !scale.is_finite() {
        return Err(RotatraderError::invalid(
            "ga",
            "mutation_scale",
            "mutation_scale must be non-negative",
        ));
    }
    Ok(())
}

pub fn validate_grid_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    for key in [
        "lookback_mom_days",
        "skip_last_days_for_mom",
        "donchian_high_days",
        "top_n",
    ] {
        if let Some(raw) = config.get_string("grid", key) {
            let values = parse_usize_list("grid", key, &raw)?;
            if values.contains(&0) {
                return Err(RotatraderError::invalid(
                    "grid",
                    key,
                    "values must be at least 1",
                ));
            }
        }
    }
    for key in ["fixed_stop_loss", "trailing_stop"] {
        if let Some(raw) = config.get_string("grid", key) {
            for value in parse_f64_list("grid", key, &raw)? {
                check_stop_threshold("grid", key, value)?;
            }
        }
    }
    if let Some(raw) = config.get_string("grid", "weights") {
        parse_weight_tuples("grid", "weights", &raw)?;
    }
    Ok(())
}

pub fn validate_cleaning_config(config: &dyn ConfigPort) -> Result<(), RotatraderError> {
    let d = CleaningRules::default();
    for (key, default) in [
        ("max_missing_ratio", d.max_missing_ratio),
        ("min_traded_ratio", d.min_traded_ratio),
    ] {
        let ratio = config.get_double("cleaning", key, default);
        if !(0.0..=1.0).contains(&ratio) {
            return Err(RotatraderError::invalid(
                "cleaning",
                key,
                format!("{key} must be between 0 and 1"),
            ));
        }
    }
    let min_price = config.get_double("cleaning", "min_price", d.min_price);
    if !(min_price >= 0.0) || !min_price.is_finite() {
        return Err(RotatraderError::invalid(
            "cleaning",
            "min_price",
            "min_price must be non-negative",
        ));
    }
    let max_move = config.get_double("cleaning", "max_abs_daily_return", d.max_abs_daily_return);
    if !(max_move > 0.0) {
        return Err(RotatraderError::invalid(
            "cleaning",
            "max_abs_daily_return",
            "max_abs_daily_return must be positive",
        ));
    }
    Ok(())
}

/// Comma-separated non-negative integers. Blank entries are ignored.
pub fn parse_usize_list(section: &str, key: &str, raw: &str) -> Result<Vec<usize>, RotatraderError> {
    list_items(raw, ',')
        .map(|item| {
            item.parse::<usize>().map_err(|_| {
                RotatraderError::invalid(section, key, format!("'{item}' is not a whole number"))
            })
        })
        .collect()
}

pub fn parse_f64_list(section: &str, key: &str, raw: &str) -> Result<Vec<f64>, RotatraderError> {
    list_items(raw, ',').map(|item| parse_number(section, key, item)).collect()
}

/// `|`-separated `a/b/c` weight triples, each component finite and
/// non-negative.
pub fn parse_weight_tuples(
    section: &str,
    key: &str,
    raw: &str,
) -> Result<Vec<[f64; 3]>, RotatraderError> {
    list_items(raw, '|')
        .map(|tuple| {
            let parts = tuple
                .split('/')
                .map(|p| parse_number(section, key, p.trim()))
                .collect::<Result<Vec<f64>, _>>()?;
            let weights: [f64; 3] = parts.try_into().map_err(|_| {
                RotatraderError::invalid(
                    section,
                    key,
                    format!("'{tuple}' must have three components"),
                )
            })?;
            if weights.iter().any(|w| *w < 0.0) {
                return Err(RotatraderError::invalid(
                    section,
                    key,
                    format!("'{tuple}' has a negative component"),
                ));
            }
            Ok(weights)
        })
        .collect()
}

/// Parse an optional `YYYY-MM-DD` value.
pub fn optional_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, RotatraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                RotatraderError::invalid(
                    section,
                    key,
                    format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn list_items(raw: &str, separator: char) -> impl Iterator<Item = &str> {
    raw.split(separator).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number(section: &str, key: &str, item: &str) -> Result<f64, RotatraderError> {
    item.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RotatraderError::invalid(section, key, format!("'{item}' is not a number")))
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, RotatraderError> {
    let value = config.get_int(section, key, default);
    if value < 1 {
        return Err(RotatraderError::invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(value)
}

fn check_stop_threshold(section: &str, key: &str, value: f64) -> Result<(), RotatraderError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(RotatraderError::invalid(
            section,
            key,
            format!("{key} must be within (0, 1]"),
        ));
    }
    Ok(())
}
