//! Two-phase preprocessing run
//!
//! Phase 1 maps every hub file (and remote source) independently to canonical
//! predictions on the rayon pool. Phase 2 starts once all of them have
//! returned: predictions are grouped by reference date, the ensemble is built
//! per date, and the result is assembled with ground truth and written.
//!
//! Ground truth is loaded before phase 1 so a missing target-data file stops
//! the run before any hub file is parsed. Datasets without forecasts skip both
//! phases.

use crate::config::PipelineConfig;
use crate::convert::convert_samples;
use crate::data::{FileBatch, HubReader};
use crate::ensemble::build_ensemble;
use crate::error::{HubError, Result};
use crate::ground_truth::load_ground_truth;
use crate::locations::LocationRegistry;
use crate::normalize::normalize_batch;
use crate::payload::{assemble, timestamp_now};
use crate::prediction::CanonicalPrediction;
use crate::remote::{fetch_remote, HttpSource, TextSource};
use crate::summary::{RunSummary, SkipCounts};
use crate::writer::PayloadWriter;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Per-invocation inputs that are not part of the dataset configuration
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root of the hub checkout
    pub hub_path: PathBuf,
    /// Output root; files land in `<output_path>/<dataset>/`
    pub output_path: PathBuf,
    pub demo_mode: bool,
}

/// Result of mapping one source
#[derive(Debug, Default)]
struct SourceOutcome {
    predictions: Vec<CanonicalPrediction>,
    skipped: SkipCounts,
    repaired: usize,
    ok: bool,
}

impl SourceOutcome {
    fn failed(error: &HubError) -> Self {
        let mut skipped = SkipCounts::new();
        skipped.record_error(error);
        Self {
            skipped,
            ..Self::default()
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, options: RunOptions) -> Self {
        Self { config, options }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run with the HTTP transport for remote sources.
    pub fn run(&self) -> Result<RunSummary> {
        if self.config.remote.is_empty() {
            return self.run_with_source(None);
        }
        match HttpSource::new(self.config.retry.timeout()) {
            Ok(http) => self.run_with_source(Some(&http)),
            Err(e) => {
                warn!("HTTP client unavailable, skipping remote sources: {}", e);
                self.run_with_source(None)
            }
        }
    }

    /// Run with a caller-supplied transport for remote sources.
    ///
    /// Only configuration problems abort the run; everything else is counted
    /// in the returned summary.
    pub fn run_with_source(&self, remote_source: Option<&dyn TextSource>) -> Result<RunSummary> {
        let config = &self.config;
        config.validate()?;

        let hub = &self.options.hub_path;
        if !hub.is_dir() {
            return Err(HubError::ConfigError(format!(
                "Hub path {} does not exist or is not a directory",
                hub.display()
            )));
        }

        info!(
            "Processing {} hub at {}{}",
            config.dataset,
            hub.display(),
            if self.options.demo_mode { " (demo mode)" } else { "" }
        );

        let registry = LocationRegistry::load(hub.join(&config.paths.locations))?;
        let truth = load_ground_truth(
            hub.join(&config.paths.target_data),
            &registry,
            &config.ground_truth,
        )?;

        let mut summary = RunSummary::default();
        summary.skipped.merge(&truth.skipped);

        let all = if config.forecasts {
            self.collect_predictions(&registry, remote_source, &mut summary)?
        } else {
            info!("{} publishes ground truth only", config.dataset);
            Vec::new()
        };

        let assembly = assemble(all, &truth, &registry, self.options.demo_mode, timestamp_now());
        summary.skipped.merge(&assembly.skipped);
        info!("Assembled {} location payloads", assembly.payloads.len());

        let writer = PayloadWriter::new(&self.options.output_path, &config.dataset)?
            .with_naming(config.output_naming.clone());
        let report = writer.write_all(&assembly);
        summary.locations_written = report.written.len();
        summary.locations_failed = report.failed.len();
        summary.manifest_written = report.manifest_written;
        for (_, e) in &report.failed {
            summary.skipped.record_error(e);
        }

        info!(
            "Wrote {} locations to {} ({} failed)",
            summary.locations_written,
            writer.dir().display(),
            summary.locations_failed
        );
        Ok(summary)
    }

    /// Phase 1 over every hub file and remote source, then the per-date ensemble.
    fn collect_predictions(
        &self,
        registry: &LocationRegistry,
        remote_source: Option<&dyn TextSource>,
        summary: &mut RunSummary,
    ) -> Result<Vec<CanonicalPrediction>> {
        let config = &self.config;
        let reader = HubReader::new(registry, config);

        let (files, discovery_skips) = reader.discover(
            &self.options.hub_path.join(&config.paths.model_output),
            self.options.demo_mode,
        )?;
        summary.skipped.merge(&discovery_skips);
        info!("Found {} model output files", files.len());

        // Phase 1: independent per-source work.
        let file_outcomes: Vec<SourceOutcome> = files
            .par_iter()
            .map(|file| match reader.read_file(file) {
                Ok(batch) => self.map_batch(batch),
                Err(e) => {
                    warn!("Skipping {}: {}", file.source, e);
                    SourceOutcome::failed(&e)
                }
            })
            .collect();

        let remote_outcomes: Vec<SourceOutcome> = match remote_source {
            Some(source) => config
                .remote
                .par_iter()
                .map(|remote| match fetch_remote(source, remote, &reader, &config.retry) {
                    Ok(batch) => self.map_batch(batch),
                    Err(e) => {
                        warn!("Skipping remote {} for {}: {}", remote.url, remote.model_id, e);
                        SourceOutcome::failed(&e)
                    }
                })
                .collect(),
            None => config
                .remote
                .iter()
                .map(|remote| {
                    SourceOutcome::failed(&HubError::FetchError(format!(
                        "no transport for {}",
                        remote.url
                    )))
                })
                .collect(),
        };

        let mut predictions = Vec::new();
        for outcome in file_outcomes {
            if outcome.ok {
                summary.files_read += 1;
            } else {
                summary.files_skipped += 1;
            }
            summary.skipped.merge(&outcome.skipped);
            summary.repaired += outcome.repaired;
            predictions.extend(outcome.predictions);
        }
        for outcome in remote_outcomes {
            if outcome.ok {
                summary.remote_fetched += 1;
            } else {
                summary.remote_failed += 1;
            }
            summary.skipped.merge(&outcome.skipped);
            summary.repaired += outcome.repaired;
            predictions.extend(outcome.predictions);
        }
        summary.predictions = predictions.len();
        info!(
            "Phase 1 done: {} files, {} predictions",
            summary.files_read, summary.predictions
        );

        // Phase 2: fan-in per reference date.
        let mut by_date: BTreeMap<NaiveDate, Vec<CanonicalPrediction>> = BTreeMap::new();
        for prediction in predictions {
            by_date
                .entry(prediction.key.reference_date)
                .or_default()
                .push(prediction);
        }

        let mut all = Vec::with_capacity(summary.predictions);
        for (date, mut date_predictions) in by_date {
            let ensemble = build_ensemble(date, &date_predictions, &config.ensemble);
            summary.ensemble_predictions += ensemble.len();
            date_predictions.extend(ensemble);
            all.extend(date_predictions);
        }
        if config.ensemble.enabled {
            info!(
                "Built {} {} predictions",
                summary.ensemble_predictions, config.ensemble.model_id
            );
        }
        Ok(all)
    }

    /// Normalize a parsed batch and convert its samples.
    fn map_batch(&self, batch: FileBatch) -> SourceOutcome {
        let normalized = normalize_batch(batch, &self.config);
        let mut skipped = normalized.skipped;

        let (predictions, errors) =
            convert_samples(normalized.predictions, &self.config.quantile_levels);
        for e in &errors {
            warn!("{}: {}", normalized.source, e);
            skipped.record_error(e);
        }

        SourceOutcome {
            predictions,
            skipped,
            repaired: normalized.repaired,
            ok: true,
        }
    }
}
