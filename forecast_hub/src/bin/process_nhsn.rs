//! Export observed NHSN admissions per location, without forecasts.

use forecast_hub::{cli, Dataset};
use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run(Dataset::Nhsn)
}
