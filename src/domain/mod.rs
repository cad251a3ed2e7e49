//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod indicator;
pub mod matrix;
pub mod metrics;
pub mod optimizer;
pub mod portfolio;
pub mod position;
pub mod scoring;
pub mod signals;
