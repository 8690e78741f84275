//! Canonical prediction types shared by the normalizer, ensemble and assembler

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Prediction representations understood by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Quantile,
    Pmf,
    Sample,
    Point,
}

impl OutputType {
    /// Parse a hub `output_type` column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "quantile" => Some(OutputType::Quantile),
            "pmf" => Some(OutputType::Pmf),
            "sample" => Some(OutputType::Sample),
            "mean" | "median" | "point" => Some(OutputType::Point),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Quantile => "quantile",
            OutputType::Pmf => "pmf",
            OutputType::Sample => "sample",
            OutputType::Point => "point",
        }
    }

    /// Lower is preferred when one target carries several representations.
    pub fn precedence(&self) -> u8 {
        match self {
            OutputType::Quantile => 0,
            OutputType::Pmf => 1,
            OutputType::Point => 2,
            OutputType::Sample => 3,
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one prediction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredictionKey {
    pub model_id: String,
    pub reference_date: NaiveDate,
    pub location: String,
    pub target: String,
    pub horizon: i32,
}

impl fmt::Display for PredictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/h{}",
            self.model_id, self.reference_date, self.location, self.target, self.horizon
        )
    }
}

/// The representation-specific part of a prediction
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Values at ascending probability levels
    Quantile { levels: Vec<f64>, values: Vec<f64> },
    /// Probabilities over named categories
    Pmf {
        categories: Vec<String>,
        probabilities: Vec<f64>,
    },
    /// Raw trajectory draws
    Sample { draws: Vec<f64> },
    /// A single summary value (mean or median)
    Point { value: f64 },
}

impl Prediction {
    pub fn output_type(&self) -> OutputType {
        match self {
            Prediction::Quantile { .. } => OutputType::Quantile,
            Prediction::Pmf { .. } => OutputType::Pmf,
            Prediction::Sample { .. } => OutputType::Sample,
            Prediction::Point { .. } => OutputType::Point,
        }
    }
}

/// A prediction for one (model, reference date, location, target, horizon)
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPrediction {
    pub key: PredictionKey,
    pub target_end_date: NaiveDate,
    pub prediction: Prediction,
}

impl CanonicalPrediction {
    pub fn output_type(&self) -> OutputType {
        self.prediction.output_type()
    }
}
