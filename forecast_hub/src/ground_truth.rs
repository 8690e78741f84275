//! Observed series per location, with population-normalized rates

use crate::config::GroundTruthConfig;
use crate::data::parse_iso_date;
use crate::error::{HubError, Result, SkipCategory};
use crate::locations::LocationRegistry;
use crate::summary::SkipCounts;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Index-aligned observed series for one location
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroundTruthSeries {
    /// Ascending observation dates
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    /// `values[i]` per 100,000 residents
    pub rates: Vec<f64>,
}

impl GroundTruthSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// One observed value, before location resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub location: String,
    pub value: f64,
}

/// Ground truth for every registry location
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    pub series: BTreeMap<String, GroundTruthSeries>,
    pub skipped: SkipCounts,
}

impl GroundTruth {
    pub fn get(&self, code: &str) -> Option<&GroundTruthSeries> {
        self.series.get(code)
    }
}

#[derive(Debug, Deserialize)]
struct TruthRow {
    date: String,
    location: String,
    value: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    age_group: Option<String>,
}

/// Load the target-data file at `path`.
///
/// A missing file is a configuration error; bad rows are skipped and counted.
pub fn load_ground_truth<P: AsRef<Path>>(
    path: P,
    registry: &LocationRegistry,
    config: &GroundTruthConfig,
) -> Result<GroundTruth> {
    let path = path.as_ref();
    info!("Loading ground truth from {}", path.display());

    let file = File::open(path).map_err(|e| {
        HubError::ConfigError(format!("Cannot open target data {}: {}", path.display(), e))
    })?;

    let (observations, mut skipped) = read_observations(file, config)?;
    let mut truth = build_ground_truth(observations, registry, config.cutoff);
    skipped.merge(&truth.skipped);
    truth.skipped = skipped;

    let observed = truth.series.values().filter(|s| !s.is_empty()).count();
    info!(
        "Loaded ground truth for {} of {} locations",
        observed,
        truth.series.len()
    );
    Ok(truth)
}

/// Parse target-data CSV, applying the configured target and age-group filters.
pub fn read_observations<R: Read>(
    reader: R,
    config: &GroundTruthConfig,
) -> Result<(Vec<Observation>, SkipCounts)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut observations = Vec::new();
    let mut skipped = SkipCounts::new();

    for row in csv_reader.deserialize::<TruthRow>() {
        let row = match row {
            Ok(row) => row,
            Err(_) => {
                skipped.record(SkipCategory::Parse);
                continue;
            }
        };

        if let (Some(wanted), Some(target)) = (&config.target, &row.target) {
            if wanted != target {
                continue;
            }
        }
        if let (Some(wanted), Some(age_group)) = (&config.age_group, &row.age_group) {
            if wanted != age_group {
                continue;
            }
        }

        let date = parse_iso_date(&row.date);
        let value = row.value.parse::<f64>().ok().filter(|v| v.is_finite());
        match (date, value) {
            (Some(date), Some(value)) => observations.push(Observation {
                date,
                location: row.location,
                value,
            }),
            _ => skipped.record(SkipCategory::Parse),
        }
    }

    if skipped.get(SkipCategory::Parse) > 0 {
        warn!(
            "Skipped {} malformed ground truth rows",
            skipped.get(SkipCategory::Parse)
        );
    }

    Ok((observations, skipped))
}

/// Join observations to the registry and compute rates.
///
/// Every registry location gets an entry, empty when it has no observations
/// on or after `cutoff`. Duplicate (date, location) rows keep the last value.
pub fn build_ground_truth(
    observations: Vec<Observation>,
    registry: &LocationRegistry,
    cutoff: Option<NaiveDate>,
) -> GroundTruth {
    let mut skipped = SkipCounts::new();
    let mut unknown = BTreeSet::new();
    let mut by_location: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();

    for observation in observations {
        if cutoff.is_some_and(|c| observation.date < c) {
            continue;
        }
        let Some(meta) = registry.resolve(&observation.location) else {
            unknown.insert(observation.location);
            skipped.record(SkipCategory::Lookup);
            continue;
        };

        let dates = by_location.entry(meta.code.clone()).or_default();
        if let Some(previous) = dates.insert(observation.date, observation.value) {
            warn!(
                "Duplicate ground truth for {} on {}: {} replaced by {}",
                meta.code, observation.date, previous, observation.value
            );
        }
    }

    if !unknown.is_empty() {
        warn!("Dropped ground truth for unknown locations {:?}", unknown);
    }

    let series = registry
        .iter()
        .map(|meta| {
            let mut series = GroundTruthSeries::default();
            if let Some(dates) = by_location.get(&meta.code) {
                for (&date, &value) in dates {
                    series.dates.push(date);
                    series.values.push(value);
                    series.rates.push(meta.rate_per_100k(value));
                }
            }
            (meta.code.clone(), series)
        })
        .collect();

    GroundTruth { series, skipped }
}
