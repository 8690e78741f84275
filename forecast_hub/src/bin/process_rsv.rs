//! Preprocess the RSV forecast hub.

use forecast_hub::{cli, Dataset};
use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run(Dataset::Rsv)
}
