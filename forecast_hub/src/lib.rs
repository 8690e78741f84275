//! # Forecast Hub
//!
//! Preprocessing of epidemiological forecast hub submissions into the
//! location-keyed JSON files read by the RespiLens visualization.
//!
//! ## Features
//!
//! - Discovery and parsing of `model-output/<model>/<date>-<model>.csv` files
//! - Canonical quantile, pmf, sample and point predictions
//! - Sample trajectories converted to quantiles on a configured level grid
//! - A cross-model mean ensemble per reference date
//! - Ground truth with per-100k rates
//! - Atomic publication of one JSON file per location plus `metadata.json`
//! - A ground-truth-only NHSN export (`<ABBR>_nhsn.json`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use forecast_hub::config::PipelineConfig;
//! use forecast_hub::pipeline::{Pipeline, RunOptions};
//!
//! let options = RunOptions {
//!     hub_path: "FluSight-forecast-hub".into(),
//!     output_path: "processed_data".into(),
//!     demo_mode: false,
//! };
//! let summary = Pipeline::new(PipelineConfig::flusight(), options).run()?;
//! println!("{}", summary);
//! # Ok::<(), forecast_hub::HubError>(())
//! ```

pub mod cli;
pub mod config;
pub mod convert;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod ground_truth;
pub mod locations;
pub mod normalize;
pub mod payload;
pub mod pipeline;
pub mod prediction;
pub mod remote;
pub mod summary;
pub mod writer;

// Re-export commonly used types
pub use crate::config::{Dataset, PipelineConfig};
pub use crate::error::{HubError, Result, SkipCategory};
pub use crate::locations::{LocationMeta, LocationRegistry};
pub use crate::pipeline::{Pipeline, RunOptions};
pub use crate::prediction::{CanonicalPrediction, OutputType, Prediction, PredictionKey};
pub use crate::summary::RunSummary;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
