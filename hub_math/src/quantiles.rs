//! Empirical quantiles and quantile-vector checks
//!
//! Contains:
//! - Linear interpolation ("inclusive") empirical quantiles over order statistics
//! - Conversion of a vector of sample draws to a quantile grid
//! - Level grid validation and the integer level keys used for exact matching
//! - Monotonicity checks and rearrangement for crossing quantiles

use crate::{round_to, MathError, Result};

/// Number of decimals quantile levels are rounded to before they are compared.
pub const LEVEL_DECIMALS: u32 = 3;

/// Integer key for a quantile level, in thousandths.
///
/// Two levels that round to the same three decimals share a key, so `0.025`
/// and `0.0250000001` are treated as the same level.
pub fn level_key(level: f64) -> i64 {
    (round_to(level, LEVEL_DECIMALS) * 1000.0).round() as i64
}

/// Inverse of [`level_key`].
pub fn level_from_key(key: i64) -> f64 {
    key as f64 / 1000.0
}

/// Check that a level grid is non-empty, strictly ascending and inside [0, 1].
pub fn validate_levels(levels: &[f64]) -> Result<()> {
    if levels.is_empty() {
        return Err(MathError::InvalidInput(
            "Quantile level grid must not be empty".to_string(),
        ));
    }

    for &level in levels {
        if !(0.0..=1.0).contains(&level) {
            return Err(MathError::InvalidInput(format!(
                "Quantile level {} is outside [0, 1]",
                level
            )));
        }
    }

    if levels.windows(2).any(|w| w[1] <= w[0]) {
        return Err(MathError::InvalidInput(
            "Quantile levels must be strictly ascending".to_string(),
        ));
    }

    Ok(())
}

/// Empirical quantile of already sorted data at `level`.
///
/// Uses linear interpolation between the order statistics `x[floor(h)]` and
/// `x[floor(h) + 1]` where `h = (n - 1) * level`.
pub fn empirical_quantile(sorted: &[f64], level: f64) -> Result<f64> {
    if sorted.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot compute a quantile of an empty sample".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&level) {
        return Err(MathError::InvalidInput(format!(
            "Quantile level {} is outside [0, 1]",
            level
        )));
    }

    let h = (sorted.len() - 1) as f64 * level;
    let lower = h.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = h - lower as f64;

    Ok(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Convert sample draws into quantile values at each of `levels`.
///
/// Draws do not need to be sorted. Non-finite draws are ignored. A sample
/// smaller than the grid still yields one value per level.
pub fn sample_quantiles(draws: &[f64], levels: &[f64]) -> Result<Vec<f64>> {
    validate_levels(levels)?;

    let mut sorted: Vec<f64> = draws.iter().copied().filter(|d| d.is_finite()).collect();
    if sorted.is_empty() {
        return Err(MathError::InsufficientData(
            "No finite sample draws to convert".to_string(),
        ));
    }
    sorted.sort_by(f64::total_cmp);

    levels
        .iter()
        .map(|&level| empirical_quantile(&sorted, level))
        .collect()
}

/// Whether `values` never decrease from one element to the next.
pub fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

/// Repair crossing quantiles by rearrangement.
///
/// Sorting the values keeps the set of values and restores monotonicity.
pub fn rearrange(values: &mut [f64]) {
    values.sort_by(f64::total_cmp);
}
