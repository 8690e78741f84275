//! Canonicalization of raw forecast rows into typed predictions
//!
//! Rows are grouped per (model, reference date, location, target). Each group is
//! published in exactly one representation, chosen by [`OutputType::precedence`],
//! and split into one [`CanonicalPrediction`] per horizon.

use crate::config::PipelineConfig;
use crate::data::{FileBatch, ForecastRecord, SourceFile};
use crate::error::SkipCategory;
use crate::prediction::{CanonicalPrediction, OutputType, Prediction, PredictionKey};
use crate::summary::SkipCounts;
use chrono::NaiveDate;
use hub_math::pmf::{self, PMF_TOLERANCE};
use hub_math::quantiles::{self, LEVEL_DECIMALS};
use hub_math::round_to;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Predictions produced from one source
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub source: SourceFile,
    pub predictions: Vec<CanonicalPrediction>,
    /// Rows or predictions dropped on the way
    pub skipped: SkipCounts,
    /// Predictions emitted after repairing a schema violation
    pub repaired: usize,
}

type GroupKey = (NaiveDate, String, String);

/// Turn a parsed batch into canonical predictions.
pub fn normalize_batch(batch: FileBatch, config: &PipelineConfig) -> NormalizedBatch {
    let FileBatch {
        source,
        records,
        mut skipped,
    } = batch;
    let mut repaired = 0;

    let mut unknown_types = BTreeSet::new();
    let mut typed: Vec<(OutputType, ForecastRecord)> = Vec::with_capacity(records.len());
    for record in records {
        match OutputType::parse(&record.output_type) {
            Some(kind) => typed.push((kind, record)),
            None => {
                unknown_types.insert(record.output_type.clone());
                skipped.record(SkipCategory::UnsupportedType);
            }
        }
    }
    if !unknown_types.is_empty() {
        warn!("{}: dropped rows with output types {:?}", source, unknown_types);
    }

    let declared: BTreeSet<OutputType> = typed.iter().map(|(kind, _)| *kind).collect();
    let sample_only = declared.len() == 1 && declared.contains(&OutputType::Sample);
    if !sample_only && declared.contains(&OutputType::Sample) {
        let before = typed.len();
        typed.retain(|(kind, _)| *kind != OutputType::Sample);
        debug!(
            "{}: ignoring {} sample rows alongside other output types",
            source,
            before - typed.len()
        );
    }

    let mut groups: BTreeMap<GroupKey, Vec<(OutputType, ForecastRecord)>> = BTreeMap::new();
    for (kind, record) in typed {
        let key = (
            record.reference_date,
            record.location.clone(),
            record.target.clone(),
        );
        groups.entry(key).or_default().push((kind, record));
    }

    let mut predictions = Vec::new();
    for ((reference_date, location, target), rows) in groups {
        let Some(kind) = rows.iter().map(|(k, _)| *k).min_by_key(OutputType::precedence) else {
            continue;
        };

        let mut by_horizon: BTreeMap<i32, Vec<ForecastRecord>> = BTreeMap::new();
        let mut shadowed = 0;
        for (row_kind, record) in rows {
            if row_kind == kind {
                by_horizon.entry(record.horizon).or_default().push(record);
            } else {
                shadowed += 1;
            }
        }
        if shadowed > 0 {
            warn!(
                "{}: {} {} rows for {} use a second representation besides {}",
                source, shadowed, location, target, kind
            );
            skipped.record_n(SkipCategory::Schema, shadowed);
        }

        for (horizon, rows) in by_horizon {
            let key = PredictionKey {
                model_id: source.model_id.clone(),
                reference_date,
                location: location.clone(),
                target: target.clone(),
                horizon,
            };
            let target_end_date = rows[0].target_end_date;

            let built = match kind {
                OutputType::Quantile => build_quantile(&key, &rows, config, &mut skipped),
                OutputType::Pmf => build_pmf(&key, &rows, config, &mut skipped),
                OutputType::Sample => build_sample(&key, &rows, config),
                OutputType::Point => build_point(&key, &rows, &mut skipped),
            };

            match built {
                Built::Ready(prediction) => predictions.push(CanonicalPrediction {
                    key,
                    target_end_date,
                    prediction,
                }),
                Built::Repaired(prediction) => {
                    repaired += 1;
                    predictions.push(CanonicalPrediction {
                        key,
                        target_end_date,
                        prediction,
                    });
                }
                Built::Rejected => skipped.record(SkipCategory::Schema),
            }
        }
    }

    NormalizedBatch {
        source,
        predictions,
        skipped,
        repaired,
    }
}

enum Built {
    Ready(Prediction),
    Repaired(Prediction),
    Rejected,
}

fn build_quantile(
    key: &PredictionKey,
    rows: &[ForecastRecord],
    config: &PipelineConfig,
    skipped: &mut SkipCounts,
) -> Built {
    let mut by_level: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let level = match row.output_type_id.trim().parse::<f64>() {
            Ok(level) if (0.0..=1.0).contains(&level) => round_to(level, LEVEL_DECIMALS),
            _ => {
                debug!("{}: invalid quantile level {:?}", key, row.output_type_id);
                skipped.record(SkipCategory::Parse);
                continue;
            }
        };
        let level_key = quantiles::level_key(level);
        if by_level.contains_key(&level_key) {
            debug!("{}: duplicate quantile level {}", key, level);
            skipped.record(SkipCategory::Schema);
            continue;
        }
        by_level.insert(level_key, (level, row.value));
    }

    if by_level.is_empty() {
        return Built::Rejected;
    }

    let (levels, mut values): (Vec<f64>, Vec<f64>) = by_level.into_values().unzip();
    if quantiles::is_non_decreasing(&values) {
        return Built::Ready(Prediction::Quantile { levels, values });
    }

    if config.strict {
        warn!("{}: quantile values decrease with level, rejecting", key);
        return Built::Rejected;
    }
    warn!("{}: quantile values decrease with level, rearranging", key);
    quantiles::rearrange(&mut values);
    Built::Repaired(Prediction::Quantile { levels, values })
}

fn build_pmf(
    key: &PredictionKey,
    rows: &[ForecastRecord],
    config: &PipelineConfig,
    skipped: &mut SkipCounts,
) -> Built {
    let mut seen = BTreeSet::new();
    let mut entries: Vec<(usize, String, f64)> = Vec::with_capacity(rows.len());
    for row in rows {
        let category = row.output_type_id.trim().to_string();
        if category.is_empty() {
            skipped.record(SkipCategory::Parse);
            continue;
        }
        if !seen.insert(category.clone()) {
            debug!("{}: duplicate pmf category {}", key, category);
            skipped.record(SkipCategory::Schema);
            continue;
        }
        let rank = config
            .pmf_category_order
            .iter()
            .position(|c| *c == category)
            .unwrap_or(usize::MAX);
        entries.push((rank, category, row.value));
    }

    if entries.is_empty() {
        return Built::Rejected;
    }

    // Stable sort keeps input order among unranked categories.
    entries.sort_by_key(|(rank, _, _)| *rank);
    let (categories, probabilities): (Vec<String>, Vec<f64>) =
        entries.into_iter().map(|(_, c, p)| (c, p)).unzip();

    if pmf::is_normalized(&probabilities, PMF_TOLERANCE) {
        return Built::Ready(Prediction::Pmf {
            categories,
            probabilities,
        });
    }

    let total = pmf::total(&probabilities);
    if config.strict {
        warn!("{}: pmf sums to {}, rejecting", key, total);
        return Built::Rejected;
    }

    match pmf::normalize(&probabilities) {
        Ok(probabilities) => {
            warn!("{}: pmf sums to {}, renormalizing", key, total);
            Built::Repaired(Prediction::Pmf {
                categories,
                probabilities,
            })
        }
        Err(e) => {
            warn!("{}: pmf cannot be renormalized: {}", key, e);
            Built::Rejected
        }
    }
}

fn build_sample(key: &PredictionKey, rows: &[ForecastRecord], config: &PipelineConfig) -> Built {
    let draws: Vec<f64> = rows.iter().map(|r| r.value).collect();
    if draws.is_empty() {
        return Built::Rejected;
    }

    if let Some(expected) = config.expected_samples {
        if draws.len() != expected {
            if config.strict {
                warn!(
                    "{}: {} sample draws, expected {}, rejecting",
                    key,
                    draws.len(),
                    expected
                );
                return Built::Rejected;
            }
            warn!("{}: {} sample draws, expected {}", key, draws.len(), expected);
        }
    }

    Built::Ready(Prediction::Sample { draws })
}

fn build_point(key: &PredictionKey, rows: &[ForecastRecord], skipped: &mut SkipCounts) -> Built {
    if rows.len() > 1 {
        warn!(
            "{}: {} point rows ({}), keeping {}",
            key,
            rows.len(),
            rows.iter()
                .map(|r| r.output_type.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            rows[0].output_type
        );
        skipped.record_n(SkipCategory::Schema, rows.len() - 1);
    }
    Built::Ready(Prediction::Point {
        value: rows[0].value,
    })
}
