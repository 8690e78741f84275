//! Command-line front end shared by the `process_*` binaries

use crate::config::{Dataset, PipelineConfig};
use crate::pipeline::{Pipeline, RunOptions};
use crate::summary::RunSummary;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Preprocess a forecast hub into location JSON files
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Root of the hub checkout
    #[arg(long, env = "HUB_PATH", value_name = "DIR")]
    pub hub_path: PathBuf,

    /// Output root; files are written to <DIR>/<dataset>/
    #[arg(long, env = "OUTPUT_PATH", value_name = "DIR", default_value = "./processed_data")]
    pub output_path: PathBuf,

    /// TOML file overriding the dataset preset
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only read the configured demo models
    #[arg(long)]
    pub demo: bool,

    /// Reject predictions that break a schema invariant instead of repairing them
    #[arg(long)]
    pub strict: bool,

    /// Log filter, e.g. "info" or "forecast_hub=debug"; defaults to RUST_LOG, then "info"
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

impl Args {
    /// The dataset preset with the config file and flags applied.
    pub fn pipeline_config(&self, dataset: Dataset) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(dataset.preset(), path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => dataset.preset(),
        };
        if self.strict {
            config.strict = true;
        }
        Ok(config)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            hub_path: self.hub_path.clone(),
            output_path: self.output_path.clone(),
            demo_mode: self.demo,
        }
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Configure and run the pipeline for `dataset`.
pub fn execute(dataset: Dataset, args: &Args) -> anyhow::Result<RunSummary> {
    let config = args.pipeline_config(dataset)?;
    let pipeline = Pipeline::new(config, args.run_options());
    pipeline
        .run()
        .with_context(|| format!("processing {} hub at {}", dataset, args.hub_path.display()))
}

/// Entry point of the binaries.
///
/// Exit codes: 0 when at least one location was written, 1 when nothing was
/// written, 2 when the run aborted on a configuration error.
pub fn run(dataset: Dataset) -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    match execute(dataset, &args) {
        Ok(summary) => {
            println!("{}", summary);
            if summary.is_success() {
                info!("{} preprocessing complete", dataset);
                ExitCode::SUCCESS
            } else {
                error!("{} preprocessing wrote no location files", dataset);
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
