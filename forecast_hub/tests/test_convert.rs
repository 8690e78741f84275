mod common;

use approx::assert_relative_eq;
use common::date;
use forecast_hub::config::HUB_QUANTILE_LEVELS;
use forecast_hub::convert::{convert_samples, sample_to_quantile};
use forecast_hub::{CanonicalPrediction, HubError, Prediction, PredictionKey};

fn sample_prediction(draws: Vec<f64>) -> CanonicalPrediction {
    CanonicalPrediction {
        key: PredictionKey {
            model_id: "modelS".to_string(),
            reference_date: date("2024-01-13"),
            location: "37".to_string(),
            target: "wk inc flu hosp".to_string(),
            horizon: 0,
        },
        target_end_date: date("2024-01-13"),
        prediction: Prediction::Sample { draws },
    }
}

fn quantile_values(prediction: &CanonicalPrediction) -> (&[f64], &[f64]) {
    match &prediction.prediction {
        Prediction::Quantile { levels, values } => (levels.as_slice(), values.as_slice()),
        other => panic!("expected quantiles, got {:?}", other),
    }
}

#[test]
fn test_median_of_one_to_hundred() {
    let draws: Vec<f64> = (1..=100).rev().map(f64::from).collect();
    let converted = sample_to_quantile(sample_prediction(draws), &[0.5]).unwrap();

    let (levels, values) = quantile_values(&converted);
    assert_eq!(levels, &[0.5]);
    assert_relative_eq!(values[0], 50.5);
    assert_eq!(converted.key.model_id, "modelS");
    assert_eq!(converted.target_end_date, date("2024-01-13"));
}

#[test]
fn test_canonical_grid_is_monotone() {
    let draws: Vec<f64> = (0..100).map(|i| ((i * 37) % 100) as f64).collect();
    let converted = sample_to_quantile(sample_prediction(draws), &HUB_QUANTILE_LEVELS).unwrap();

    let (levels, values) = quantile_values(&converted);
    assert_eq!(levels.len(), 23);
    assert_eq!(values.len(), 23);
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_fewer_draws_than_levels() {
    let converted =
        sample_to_quantile(sample_prediction(vec![5.0, 1.0]), &HUB_QUANTILE_LEVELS).unwrap();

    let (_, values) = quantile_values(&converted);
    assert_eq!(values.len(), 23);
    assert_relative_eq!(values[0], 1.04, epsilon = 1e-12);
    assert_relative_eq!(values[11], 3.0, epsilon = 1e-12);
    assert_relative_eq!(values[22], 4.96, epsilon = 1e-12);
}

#[test]
fn test_non_sample_predictions_pass_through() {
    let mut prediction = sample_prediction(Vec::new());
    prediction.prediction = Prediction::Point { value: 7.0 };

    let converted = sample_to_quantile(prediction.clone(), &HUB_QUANTILE_LEVELS).unwrap();
    assert_eq!(converted, prediction);
}

#[test]
fn test_empty_draws_are_dropped() {
    let (converted, errors) = convert_samples(
        vec![
            sample_prediction(vec![f64::NAN]),
            sample_prediction(vec![1.0, 2.0, 3.0]),
        ],
        &[0.5],
    );

    assert_eq!(converted.len(), 1);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], HubError::SchemaViolation(_)));
}
