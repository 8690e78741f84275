//! Sample to quantile conversion

use crate::error::{HubError, Result};
use crate::prediction::{CanonicalPrediction, Prediction};
use hub_math::quantiles::sample_quantiles;

/// Replace a sample prediction by its empirical quantiles at `levels`.
///
/// Predictions of any other kind are returned unchanged.
pub fn sample_to_quantile(
    prediction: CanonicalPrediction,
    levels: &[f64],
) -> Result<CanonicalPrediction> {
    let CanonicalPrediction {
        key,
        target_end_date,
        prediction,
    } = prediction;

    let prediction = match prediction {
        Prediction::Sample { draws } => {
            let values = sample_quantiles(&draws, levels).map_err(|e| {
                HubError::SchemaViolation(format!("{}: cannot convert samples: {}", key, e))
            })?;
            Prediction::Quantile {
                levels: levels.to_vec(),
                values,
            }
        }
        other => other,
    };

    Ok(CanonicalPrediction {
        key,
        target_end_date,
        prediction,
    })
}

/// Convert every sample prediction in `predictions`.
///
/// Predictions that cannot be converted are dropped and returned as errors.
pub fn convert_samples(
    predictions: Vec<CanonicalPrediction>,
    levels: &[f64],
) -> (Vec<CanonicalPrediction>, Vec<HubError>) {
    let mut converted = Vec::with_capacity(predictions.len());
    let mut errors = Vec::new();

    for prediction in predictions {
        match sample_to_quantile(prediction, levels) {
            Ok(p) => converted.push(p),
            Err(e) => errors.push(e),
        }
    }

    (converted, errors)
}
