//! Report output port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RotatraderError;
use crate::domain::matrix::ValuePoint;
use crate::domain::optimizer::grid::ParamSet;
use crate::domain::scoring::FactorWeights;

/// Port for exporting run results. `label` distinguishes runs over different
/// date ranges, such as `train` and `test`.
pub trait ReportPort {
    fn write_run(
        &self,
        label: &str,
        result: &BacktestResult,
        benchmark: &[ValuePoint],
    ) -> Result<(), RotatraderError>;

    /// `best_fitness` is the training fitness of searched weights; `None`
    /// for weights given by the caller.
    fn write_chosen_weights(
        &self,
        weights: &FactorWeights,
        best_fitness: Option<f64>,
    ) -> Result<(), RotatraderError>;

    /// `sharpe` is `None` when the parameters are the fallback defaults.
    fn write_chosen_params(
        &self,
        params: &ParamSet,
        sharpe: Option<f64>,
    ) -> Result<(), RotatraderError>;
}
