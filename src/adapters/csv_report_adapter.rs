//! CSV report adapter.
//!
//! Writes one set of files per run label into an output directory:
//! `pv_<label>.csv`, `trades_<label>.csv` and `stats_<label>.csv`, plus
//! `chosen_weights.csv` or `chosen_params.csv` for the optimizer's pick.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RotatraderError;
use crate::domain::matrix::ValuePoint;
use crate::domain::metrics::{drawdown_series, Statistics};
use crate::domain::optimizer::grid::ParamSet;
use crate::domain::scoring::FactorWeights;
use crate::ports::report_port::ReportPort;

pub struct CsvReportAdapter {
    out_dir: PathBuf,
}

impl CsvReportAdapter {
    /// Creates `out_dir` if it does not exist.
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self, RotatraderError> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn write_rows(&self, name: &str, rows: &[Vec<String>]) -> Result<(), RotatraderError> {
        let path = self.out_dir.join(name);
        let mut wtr = csv::Writer::from_path(&path).map_err(csv_error)?;
        for row in rows {
            wtr.write_record(row).map_err(csv_error)?;
        }
        wtr.flush()?;
        info!(path = %path.display(), rows = rows.len().saturating_sub(1), "report written");
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> RotatraderError {
    RotatraderError::Io(e.into())
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row<const N: usize>(cells: [String; N]) -> Vec<String> {
    cells.into()
}

fn value_rows(values: &[ValuePoint]) -> Vec<Vec<String>> {
    let series: Vec<f64> = values.iter().map(|p| p.value).collect();
    let drawdown = drawdown_series(&series);
    let mut rows = vec![row(["date".into(), "value".into(), "drawdown".into()])];
    rows.extend(
        values
            .iter()
            .zip(drawdown)
            .map(|(p, dd)| row([p.date.to_string(), p.value.to_string(), dd.to_string()])),
    );
    rows
}

fn stats_rows(strategy: &Statistics, benchmark: &Statistics) -> Vec<Vec<String>> {
    let metric = |name: &str, s: Option<f64>, b: Option<f64>| row([name.into(), cell(s), cell(b)]);
    vec![
        row(["metric".into(), "strategy".into(), "benchmark".into()]),
        metric("cagr", strategy.cagr, benchmark.cagr),
        metric(
            "annualized_volatility",
            strategy.annualized_volatility,
            benchmark.annualized_volatility,
        ),
        metric("sharpe", strategy.sharpe_ratio, benchmark.sharpe_ratio),
        metric("sortino", strategy.sortino_ratio, benchmark.sortino_ratio),
        metric("max_drawdown", strategy.max_drawdown, benchmark.max_drawdown),
        row([
            "trades".into(),
            strategy.trade_count.to_string(),
            benchmark.trade_count.to_string(),
        ]),
    ]
}

impl ReportPort for CsvReportAdapter {
    fn write_run(
        &self,
        label: &str,
        result: &BacktestResult,
        benchmark: &[ValuePoint],
    ) -> Result<(), RotatraderError> {
        self.write_rows(&format!("pv_{label}.csv"), &value_rows(&result.values))?;

        let mut trades = vec![row([
            "date".into(),
            "ticker".into(),
            "side".into(),
            "price".into(),
            "shares".into(),
            "reason".into(),
        ])];
        trades.extend(result.trades.iter().map(|t| {
            row([
                t.date.to_string(),
                t.ticker.clone(),
                t.side.to_string(),
                t.price.to_string(),
                t.shares.to_string(),
                t.reason.to_string(),
            ])
        }));
        self.write_rows(&format!("trades_{label}.csv"), &trades)?;

        let bench_values: Vec<f64> = benchmark.iter().map(|p| p.value).collect();
        let bench_stats = Statistics::compute(&bench_values, 0);
        self.write_rows(
            &format!("stats_{label}.csv"),
            &stats_rows(&result.stats, &bench_stats),
        )
    }

    fn write_chosen_weights(
        &self,
        weights: &FactorWeights,
        best_fitness: Option<f64>,
    ) -> Result<(), RotatraderError> {
        let mut rows = vec![row(["factor".into(), "weight".into()])];
        rows.extend(
            weights
                .iter()
                .map(|(factor, w)| row([factor.to_string(), w.to_string()])),
        );
        if let Some(fitness) = best_fitness {
            rows.push(row(["best_fitness".into(), fitness.to_string()]));
        }
        self.write_rows("chosen_weights.csv", &rows)
    }

    fn write_chosen_params(
        &self,
        params: &ParamSet,
        sharpe: Option<f64>,
    ) -> Result<(), RotatraderError> {
        let [w_mom, w_prox, w_brk] = params.weights;
        let entries = [
            ("lookback_mom_days", params.lookback_mom_days.to_string()),
            (
                "skip_last_days_for_mom",
                params.skip_last_days_for_mom.to_string(),
            ),
            ("donchian_high_days", params.donchian_high_days.to_string()),
            ("top_n", params.top_n.to_string()),
            ("fixed_stop_loss", params.fixed_stop_loss.to_string()),
            ("trailing_stop", params.trailing_stop.to_string()),
            ("weight_momentum", w_mom.to_string()),
            ("weight_proximity", w_prox.to_string()),
            ("weight_breakout", w_brk.to_string()),
            ("sharpe", cell(sharpe)),
        ];
        let mut rows = vec![row(["parameter".into(), "value".into()])];
        rows.extend(entries.into_iter().map(|(k, v)| row([k.into(), v])));
        self.write_rows("chosen_params.csv", &rows)
    }
}
