//! Probability mass function checks

use crate::{MathError, Result};

/// Allowed deviation of a PMF total from 1.0.
pub const PMF_TOLERANCE: f64 = 1e-6;

/// Sum of the probabilities.
pub fn total(probabilities: &[f64]) -> f64 {
    probabilities.iter().sum()
}

/// Whether the probabilities are all in [0, 1] and sum to 1 within `tolerance`.
pub fn is_normalized(probabilities: &[f64], tolerance: f64) -> bool {
    probabilities.iter().all(|p| (0.0..=1.0).contains(p))
        && (total(probabilities) - 1.0).abs() <= tolerance
}

/// Rescale probabilities so they sum to 1.
pub fn normalize(probabilities: &[f64]) -> Result<Vec<f64>> {
    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(MathError::InvalidInput(
            "Probabilities must be finite and non-negative".to_string(),
        ));
    }

    let sum = total(probabilities);
    if sum <= 0.0 {
        return Err(MathError::CalculationError(
            "Cannot normalize a PMF with zero total mass".to_string(),
        ));
    }

    Ok(probabilities.iter().map(|p| p / sum).collect())
}
