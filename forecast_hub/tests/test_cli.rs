mod common;

use clap::Parser;
use common::{quantile_rows, Hub};
use forecast_hub::cli::{execute, Args};
use forecast_hub::Dataset;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_args_and_config_overrides() {
    let mut config_file = NamedTempFile::new().unwrap();
    writeln!(config_file, "[ensemble]\nenabled = false").unwrap();

    let args = Args::try_parse_from([
        "process_rsv",
        "--hub-path",
        "/data/rsv-forecast-hub",
        "--output-path",
        "/tmp/out",
        "--config",
        config_file.path().to_str().unwrap(),
        "--demo",
        "--strict",
    ])
    .unwrap();

    let options = args.run_options();
    assert_eq!(options.hub_path, std::path::PathBuf::from("/data/rsv-forecast-hub"));
    assert!(options.demo_mode);

    let config = args.pipeline_config(Dataset::Rsv).unwrap();
    assert_eq!(config.dataset, "rsv");
    assert!(config.strict);
    assert!(!config.ensemble.enabled);
}

#[test]
fn test_bad_config_file_is_reported() {
    let args = Args::try_parse_from([
        "process_flusight",
        "--hub-path",
        "hub",
        "--config",
        "/nonexistent/config.toml",
    ])
    .unwrap();

    let error = args.pipeline_config(Dataset::Flusight).unwrap_err();
    assert!(format!("{:#}", error).contains("/nonexistent/config.toml"));
}

#[test]
fn test_execute() {
    let hub = Hub::new();
    let rows = quantile_rows(
        "2024-01-13",
        "37",
        "wk inc flu hosp",
        0..=1,
        &[0.025, 0.5, 0.975],
        |h, level| 100.0 * level + h as f64,
    );
    hub.add_model_file("modelA", "2024-01-13", &rows);
    let out = TempDir::new().unwrap();

    let args = Args::try_parse_from([
        "process_flusight",
        "--hub-path",
        hub.path().to_str().unwrap(),
        "--output-path",
        out.path().to_str().unwrap(),
    ])
    .unwrap();

    let summary = execute(Dataset::Flusight, &args).unwrap();
    assert!(summary.is_success());
    assert!(out.path().join("flusight/37.json").exists());
}

#[test]
fn test_dataset_names() {
    assert_eq!("flusight".parse::<Dataset>().unwrap(), Dataset::Flusight);
    assert_eq!("RSV".parse::<Dataset>().unwrap(), Dataset::Rsv);
    assert_eq!("nhsn".parse::<Dataset>().unwrap(), Dataset::Nhsn);
    assert!("covid".parse::<Dataset>().is_err());
    assert_eq!(Dataset::Rsv.to_string(), "rsv");
}
