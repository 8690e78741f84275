//! Cross-model quantile ensemble

use crate::config::EnsembleConfig;
use crate::prediction::{CanonicalPrediction, Prediction, PredictionKey};
use chrono::NaiveDate;
use hub_math::aggregate::{mean_by_level, QuantileSet};
use hub_math::quantiles;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

type SlotKey = (String, String, i32);

/// Build the synthetic ensemble for one reference date.
///
/// `predictions` must hold every model's predictions for `reference_date`;
/// other dates are ignored. Each (location, target, horizon) inside the
/// configured horizon range with at least `min_models` quantile forecasts
/// gets one averaged prediction under `config.model_id`. Slots for which the
/// input already carries that model id are left alone.
pub fn build_ensemble(
    reference_date: NaiveDate,
    predictions: &[CanonicalPrediction],
    config: &EnsembleConfig,
) -> Vec<CanonicalPrediction> {
    if !config.enabled {
        return Vec::new();
    }

    let mut slots: BTreeMap<SlotKey, Vec<&CanonicalPrediction>> = BTreeMap::new();
    let mut taken: BTreeSet<SlotKey> = BTreeSet::new();

    for prediction in predictions {
        let key = &prediction.key;
        if key.reference_date != reference_date || !config.covers_horizon(key.horizon) {
            continue;
        }
        let slot = (key.location.clone(), key.target.clone(), key.horizon);
        if key.model_id == config.model_id {
            taken.insert(slot);
            continue;
        }
        if matches!(prediction.prediction, Prediction::Quantile { .. }) {
            slots.entry(slot).or_default().push(prediction);
        }
    }

    if !taken.is_empty() {
        warn!(
            "{}: input already contains {} predictions for {}, not replacing them",
            reference_date,
            taken.len(),
            config.model_id
        );
    }

    let mut ensemble = Vec::new();
    for (slot, mut members) in slots {
        if taken.contains(&slot) {
            continue;
        }
        if members.len() < config.min_models {
            debug!(
                "{} {:?}: {} models, need {}",
                reference_date,
                slot,
                members.len(),
                config.min_models
            );
            continue;
        }

        members.sort_by(|a, b| a.key.model_id.cmp(&b.key.model_id));

        let sets: Vec<QuantileSet<'_>> = members
            .iter()
            .filter_map(|p| match &p.prediction {
                Prediction::Quantile { levels, values } => QuantileSet::new(levels, values).ok(),
                _ => None,
            })
            .collect();

        let (levels, mut values) = mean_by_level(&sets);
        if levels.is_empty() {
            continue;
        }
        quantiles::rearrange(&mut values);

        let (location, target, horizon) = slot;
        ensemble.push(CanonicalPrediction {
            key: PredictionKey {
                model_id: config.model_id.clone(),
                reference_date,
                location,
                target,
                horizon,
            },
            target_end_date: members[0].target_end_date,
            prediction: Prediction::Quantile { levels, values },
        });
    }

    ensemble
}
