//! Location payloads and the run manifest
//!
//! The JSON shape produced here is what the visualization reads:
//!
//! ```text
//! <location>.json
//!   metadata      {location, abbreviation, location_name, population}
//!   ground_truth  {dates[], values[], rates[]}
//!   forecasts     reference_date -> target -> model -> {type, predictions}
//!                 predictions: horizon -> {date, quantiles[], values[]} | ...
//!   available_models  models with a forecast for this location, sorted
//!   all_models        every model in the run, sorted
//! ```

use crate::error::SkipCategory;
use crate::ground_truth::{GroundTruth, GroundTruthSeries};
use crate::locations::{LocationMeta, LocationRegistry};
use crate::prediction::{CanonicalPrediction, OutputType, Prediction};
use crate::summary::SkipCounts;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Format of [`Manifest::last_updated`] (ISO 8601, local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadMetadata {
    pub location: String,
    pub abbreviation: String,
    pub location_name: String,
    pub population: u64,
}

impl From<&LocationMeta> for PayloadMetadata {
    fn from(meta: &LocationMeta) -> Self {
        Self {
            location: meta.code.clone(),
            abbreviation: meta.abbreviation.clone(),
            location_name: meta.name.clone(),
            population: meta.population,
        }
    }
}

/// One horizon of one model's forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HorizonPrediction {
    Quantile {
        date: NaiveDate,
        quantiles: Vec<f64>,
        values: Vec<f64>,
    },
    Pmf {
        date: NaiveDate,
        categories: Vec<String>,
        probabilities: Vec<f64>,
    },
    Sample {
        date: NaiveDate,
        samples: Vec<f64>,
    },
    Point {
        date: NaiveDate,
        value: f64,
    },
}

impl HorizonPrediction {
    fn from_canonical(prediction: CanonicalPrediction) -> Self {
        let date = prediction.target_end_date;
        match prediction.prediction {
            Prediction::Quantile { levels, values } => HorizonPrediction::Quantile {
                date,
                quantiles: levels,
                values,
            },
            Prediction::Pmf {
                categories,
                probabilities,
            } => HorizonPrediction::Pmf {
                date,
                categories,
                probabilities,
            },
            Prediction::Sample { draws } => HorizonPrediction::Sample {
                date,
                samples: draws,
            },
            Prediction::Point { value } => HorizonPrediction::Point { date, value },
        }
    }
}

/// A model's forecast for one target, keyed by horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelForecast {
    #[serde(rename = "type")]
    pub output_type: OutputType,
    pub predictions: BTreeMap<i32, HorizonPrediction>,
}

/// reference_date -> target -> model
pub type ForecastTree = BTreeMap<NaiveDate, BTreeMap<String, BTreeMap<String, ModelForecast>>>;

/// Everything published for one location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPayload {
    pub metadata: PayloadMetadata,
    pub ground_truth: GroundTruthSeries,
    pub forecasts: ForecastTree,
    pub available_models: Vec<String>,
    pub all_models: Vec<String>,
}

impl LocationPayload {
    pub fn code(&self) -> &str {
        &self.metadata.location
    }
}

/// Global index of a run's output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub last_updated: String,
    pub models: Vec<String>,
    pub locations: Vec<String>,
    pub demo_mode: bool,
}

/// Result of assembling a run's payloads
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Payloads by location code
    pub payloads: BTreeMap<String, LocationPayload>,
    pub manifest: Manifest,
    pub skipped: SkipCounts,
}

/// Merge predictions and ground truth into one payload per location.
///
/// A location gets a payload when it has at least one observation or one
/// forecast. Predictions for codes missing from the registry are dropped.
/// When two predictions share a key the first one is kept.
pub fn assemble(
    predictions: Vec<CanonicalPrediction>,
    ground_truth: &GroundTruth,
    registry: &LocationRegistry,
    demo_mode: bool,
    last_updated: String,
) -> Assembly {
    let mut skipped = SkipCounts::new();
    let mut trees: BTreeMap<String, ForecastTree> = BTreeMap::new();

    for prediction in predictions {
        let key = prediction.key.clone();
        if !registry.contains(&key.location) {
            debug!("{}: location not in registry", key);
            skipped.record(SkipCategory::Lookup);
            continue;
        }

        let output_type = prediction.output_type();
        let model = trees
            .entry(key.location.clone())
            .or_default()
            .entry(key.reference_date)
            .or_default()
            .entry(key.target.clone())
            .or_default()
            .entry(key.model_id.clone())
            .or_insert_with(|| ModelForecast {
                output_type,
                predictions: BTreeMap::new(),
            });

        if model.output_type != output_type {
            warn!(
                "{}: {} prediction next to {} predictions, dropping it",
                key, output_type, model.output_type
            );
            skipped.record(SkipCategory::Schema);
            continue;
        }

        match model.predictions.entry(key.horizon) {
            Entry::Vacant(slot) => {
                slot.insert(HorizonPrediction::from_canonical(prediction));
            }
            Entry::Occupied(_) => {
                warn!("{}: duplicate prediction, keeping the first", key);
                skipped.record(SkipCategory::Schema);
            }
        }
    }

    let mut payloads = BTreeMap::new();
    let mut models = BTreeSet::new();

    for meta in registry.iter() {
        let forecasts = trees.remove(&meta.code).unwrap_or_default();
        let ground_truth = ground_truth.get(&meta.code).cloned().unwrap_or_default();
        if forecasts.is_empty() && ground_truth.is_empty() {
            continue;
        }

        let mut available = BTreeSet::new();
        for targets in forecasts.values() {
            for by_model in targets.values() {
                available.extend(by_model.keys().cloned());
            }
        }
        models.extend(available.iter().cloned());

        payloads.insert(
            meta.code.clone(),
            LocationPayload {
                metadata: PayloadMetadata::from(meta),
                ground_truth,
                forecasts,
                available_models: available.into_iter().collect(),
                all_models: Vec::new(),
            },
        );
    }

    let all_models: Vec<String> = models.iter().cloned().collect();
    for payload in payloads.values_mut() {
        payload.all_models = all_models.clone();
    }

    let manifest = Manifest {
        last_updated,
        models: all_models,
        locations: payloads.keys().cloned().collect(),
        demo_mode,
    };

    Assembly {
        payloads,
        manifest,
        skipped,
    }
}
