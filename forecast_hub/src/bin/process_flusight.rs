//! Preprocess the FluSight forecast hub.
//!
//! ```bash
//! process_flusight --hub-path FluSight-forecast-hub --output-path processed_data
//! ```

use forecast_hub::{cli, Dataset};
use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run(Dataset::Flusight)
}
