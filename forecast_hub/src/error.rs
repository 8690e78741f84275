//! Error types for the forecast_hub crate

use hub_math::MathError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the forecast_hub crate
#[derive(Debug, Error)]
pub enum HubError {
    /// Malformed row or file
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Unknown location, model or target
    #[error("Lookup error: {0}")]
    LookupError(String),

    /// A prediction breaks a schema invariant (PMF total, quantile order, sample count)
    #[error("Schema invariant violation: {0}")]
    SchemaViolation(String),

    /// Row kind the pipeline does not know how to canonicalize
    #[error("Unsupported output type: {0}")]
    UnsupportedOutputType(String),

    /// Missing hub root, registry or an invalid configuration; aborts the run
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Remote source could not be retrieved
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Error from IO operations on a known path
    #[error("IO error at {path}: {source}")]
    PathIoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV decoding
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON encoding
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from numerical helpers
    #[error("Math error: {0}")]
    MathError(#[from] MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HubError::PathIoError {
            path: path.into(),
            source,
        }
    }

    /// Where this error lands in the run-end summary.
    pub fn category(&self) -> SkipCategory {
        match self {
            HubError::ParseError(_) | HubError::CsvError(_) => SkipCategory::Parse,
            HubError::LookupError(_) => SkipCategory::Lookup,
            HubError::SchemaViolation(_) | HubError::MathError(_) => SkipCategory::Schema,
            HubError::UnsupportedOutputType(_) => SkipCategory::UnsupportedType,
            HubError::FetchError(_) => SkipCategory::Fetch,
            HubError::ConfigError(_) => SkipCategory::Config,
            HubError::PathIoError { .. } | HubError::IoError(_) | HubError::JsonError(_) => {
                SkipCategory::Io
            }
        }
    }

    /// Whether the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HubError::ConfigError(_))
    }
}

/// Categories of recovered errors counted in the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipCategory {
    Parse,
    Lookup,
    Schema,
    UnsupportedType,
    Excluded,
    Fetch,
    Io,
    Config,
}

impl SkipCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipCategory::Parse => "parse",
            SkipCategory::Lookup => "lookup",
            SkipCategory::Schema => "schema",
            SkipCategory::UnsupportedType => "unsupported_type",
            SkipCategory::Excluded => "excluded",
            SkipCategory::Fetch => "fetch",
            SkipCategory::Io => "io",
            SkipCategory::Config => "config",
        }
    }
}

impl fmt::Display for SkipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
