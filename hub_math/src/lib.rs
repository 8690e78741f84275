//! # Hub Math
//!
//! Numerical building blocks for forecast hub preprocessing.
//! This crate has no knowledge of files or hub layouts; it only works on
//! slices of levels, values, draws and probabilities.

use thiserror::Error;

pub mod aggregate;
pub mod pmf;
pub mod quantiles;

/// Errors that can occur in hub numerical calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for hub math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Round `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
