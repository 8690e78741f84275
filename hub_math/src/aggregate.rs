//! Cross-model aggregation of quantile vectors

use crate::quantiles::{level_from_key, level_key};
use crate::{MathError, Result};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// One model's quantile vector, borrowed.
#[derive(Debug, Clone, Copy)]
pub struct QuantileSet<'a> {
    pub levels: &'a [f64],
    pub values: &'a [f64],
}

impl<'a> QuantileSet<'a> {
    pub fn new(levels: &'a [f64], values: &'a [f64]) -> Result<Self> {
        if levels.len() != values.len() {
            return Err(MathError::InvalidInput(format!(
                "Levels length ({}) doesn't match values length ({})",
                levels.len(),
                values.len()
            )));
        }
        Ok(Self { levels, values })
    }
}

/// Level-wise mean of several quantile vectors.
///
/// Each level is averaged over the sets that report it; a set without a
/// given level is left out of that level's mean rather than imputed.
/// Returns the union of levels in ascending order together with the means.
pub fn mean_by_level(sets: &[QuantileSet<'_>]) -> (Vec<f64>, Vec<f64>) {
    let mut by_level: BTreeMap<i64, Vec<f64>> = BTreeMap::new();

    for set in sets {
        for (&level, &value) in set.levels.iter().zip(set.values.iter()) {
            if value.is_finite() {
                by_level.entry(level_key(level)).or_default().push(value);
            }
        }
    }

    by_level
        .into_iter()
        .filter_map(|(key, values)| mean(&values).map(|m| (level_from_key(key), m)))
        .unzip()
}
