//! Market data port trait.

use crate::domain::error::RotatraderError;
use crate::domain::matrix::{BenchmarkSeries, PriceMatrix};

/// Source of the price matrix and benchmark series a run consumes.
pub trait MarketDataPort {
    fn load_prices(&self) -> Result<PriceMatrix, RotatraderError>;

    fn load_benchmark(&self) -> Result<BenchmarkSeries, RotatraderError>;
}
