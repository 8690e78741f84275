//! Run-end accounting of skipped records and written files

use crate::error::{HubError, SkipCategory};
use std::collections::BTreeMap;
use std::fmt;

/// Counts of recovered errors by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts {
    counts: BTreeMap<SkipCategory, usize>,
}

impl SkipCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one skipped item.
    pub fn record(&mut self, category: SkipCategory) {
        self.record_n(category, 1);
    }

    /// Count `n` skipped items.
    pub fn record_n(&mut self, category: SkipCategory, n: usize) {
        if n > 0 {
            *self.counts.entry(category).or_insert(0) += n;
        }
    }

    /// Count a recovered error under its category.
    pub fn record_error(&mut self, error: &HubError) {
        self.record(error.category());
    }

    /// Add another set of counts to this one.
    pub fn merge(&mut self, other: &SkipCounts) {
        for (&category, &n) in &other.counts {
            self.record_n(category, n);
        }
    }

    pub fn get(&self, category: SkipCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipCategory, usize)> + '_ {
        self.counts.iter().map(|(c, n)| (*c, *n))
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Hub files parsed successfully
    pub files_read: usize,
    /// Hub files skipped as malformed
    pub files_skipped: usize,
    /// Remote sources fetched and parsed
    pub remote_fetched: usize,
    /// Remote sources given up on after retries
    pub remote_failed: usize,
    /// Model-supplied canonical predictions
    pub predictions: usize,
    /// Predictions added by the ensemble builder
    pub ensemble_predictions: usize,
    /// Predictions kept after a lenient repair (rearranged quantiles, renormalized PMF)
    pub repaired: usize,
    /// Location payloads published
    pub locations_written: usize,
    /// Location payloads that failed to publish
    pub locations_failed: usize,
    /// Whether metadata.json was published
    pub manifest_written: bool,
    /// Recovered errors by category
    pub skipped: SkipCounts,
}

impl RunSummary {
    /// A run succeeds when at least one location was written.
    pub fn is_success(&self) -> bool {
        self.locations_written > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run Summary:")?;
        writeln!(
            f,
            "  Files:       {} read, {} skipped",
            self.files_read, self.files_skipped
        )?;
        writeln!(
            f,
            "  Remote:      {} fetched, {} failed",
            self.remote_fetched, self.remote_failed
        )?;
        writeln!(
            f,
            "  Predictions: {} model, {} ensemble, {} repaired",
            self.predictions, self.ensemble_predictions, self.repaired
        )?;
        writeln!(
            f,
            "  Locations:   {} written, {} failed",
            self.locations_written, self.locations_failed
        )?;
        writeln!(f, "  Manifest:    {}", if self.manifest_written { "written" } else { "not written" })?;
        if self.skipped.is_empty() {
            writeln!(f, "  Skipped:     none")?;
        } else {
            writeln!(f, "  Skipped:")?;
            for (category, n) in self.skipped.iter() {
                writeln!(f, "    {:<17}{}", category, n)?;
            }
        }
        Ok(())
    }
}
