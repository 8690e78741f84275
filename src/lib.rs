//! # RespiLens workspace
//!
//! Umbrella crate for the forecast hub preprocessor.
//!
//! - [`hub_math`]: empirical quantiles, level-wise means and PMF checks
//! - [`forecast_hub`]: the preprocessing pipeline and its binaries
//!
//! ## Example
//!
//! ```
//! use respilens_workspace::hub_math::quantiles::sample_quantiles;
//!
//! let draws: Vec<f64> = (1..=100).map(f64::from).collect();
//! let median = sample_quantiles(&draws, &[0.5]).unwrap();
//! assert_eq!(median, vec![50.5]);
//! ```

pub use forecast_hub;
pub use hub_math;
