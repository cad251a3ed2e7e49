//! Performance statistics over a portfolio value series.
//!
//! All functions are pure. Ratios that are undefined (zero or missing
//! dispersion, too few points) are `None` rather than NaN.

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Fitness assigned to runs that cannot be scored.
pub const FITNESS_FLOOR: f64 = -1e9;

#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub cagr: Option<f64>,
    pub annualized_volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub trade_count: usize,
}

impl Statistics {
    /// Statistics at a zero risk-free rate.
    pub fn compute(values: &[f64], trade_count: usize) -> Self {
        let returns = daily_returns(values);
        Statistics {
            cagr: cagr(values),
            annualized_volatility: annualized_volatility(&returns),
            sharpe_ratio: sharpe_ratio(&returns, 0.0),
            sortino_ratio: sortino_ratio(&returns, 0.0),
            max_drawdown: max_drawdown(values),
            trade_count,
        }
    }
}

/// Mean and sample standard deviation (n − 1). `None` below two values.
pub fn mean_and_sample_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

/// Simple returns between consecutive values; non-finite returns are dropped.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect()
}

/// `(final / initial)^(252 / n) − 1`, with `n` the number of values.
pub fn cagr(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    let last = *values.last()?;
    if first <= 0.0 {
        return None;
    }
    let growth = (last / first).powf(TRADING_DAYS_PER_YEAR / values.len() as f64) - 1.0;
    growth.is_finite().then_some(growth)
}

/// CAGR used as an optimizer fitness; never NaN.
pub fn cagr_fitness(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return FITNESS_FLOOR;
    }
    cagr(values).unwrap_or(FITNESS_FLOOR)
}

pub fn annualized_volatility(returns: &[f64]) -> Option<f64> {
    mean_and_sample_std(returns).map(|(_, std)| std * TRADING_DAYS_PER_YEAR.sqrt())
}

pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    let (mean, std) = mean_and_sample_std(returns)?;
    if std == 0.0 {
        return None;
    }
    let excess = mean - risk_free_rate / TRADING_DAYS_PER_YEAR;
    Some(excess / std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Like Sharpe, with the dispersion of negative returns only.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let (_, downside_std) = mean_and_sample_std(&downside)?;
    if downside_std == 0.0 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let excess = mean - risk_free_rate / TRADING_DAYS_PER_YEAR;
    Some(excess / downside_std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// `value / running max − 1` at every point.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            v / peak - 1.0
        })
        .collect()
}

/// Most negative drawdown (0.0 for a never-declining series).
pub fn max_drawdown(values: &[f64]) -> Option<f64> {
    drawdown_series(values)
        .into_iter()
        .filter(|d| d.is_finite())
        .reduce(f64::min)
}
