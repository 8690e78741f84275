#![allow(dead_code)]

use chrono::NaiveDate;
use forecast_hub::data::{FileBatch, ForecastRecord, SourceFile};
use forecast_hub::summary::SkipCounts;
use forecast_hub::{LocationMeta, LocationRegistry};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const HEADER: &str =
    "reference_date,target,horizon,target_end_date,location,output_type,output_type_id,value";

pub const LOCATIONS_CSV: &str = "\
location,abbreviation,location_name,population
US,US,United States,334914895
06,CA,California,39029342
37,NC,North Carolina,10439388
";

pub const TARGET_DATA_CSV: &str = "\
date,location,value
2023-09-30,37,999
2023-12-16,37,120
2023-12-23,37,150
2023-12-30,37,210
2024-01-06,37,260
2024-01-13,37,240
2024-01-13,US,9000
2024-01-13,99,5
";

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn registry() -> LocationRegistry {
    LocationRegistry::from_entries([
        LocationMeta::new("US", "US", "United States", 334_914_895),
        LocationMeta::new("06", "CA", "California", 39_029_342),
        LocationMeta::new("37", "NC", "North Carolina", 10_439_388),
    ])
}

/// A hub checkout in a temporary directory
pub struct Hub {
    dir: TempDir,
}

impl Hub {
    /// Hub with locations and target data but no model output yet.
    pub fn new() -> Self {
        let hub = Hub {
            dir: TempDir::new().unwrap(),
        };
        hub.write("auxiliary-data/locations.csv", LOCATIONS_CSV);
        hub.write("target-data/target-hospital-admissions.csv", TARGET_DATA_CSV);
        fs::create_dir_all(hub.path().join("model-output")).unwrap();
        hub
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write `model-output/<model>/<date>-<model>.csv`.
    pub fn add_model_file(&self, model: &str, reference_date: &str, rows: &[String]) -> PathBuf {
        let mut content = String::from(HEADER);
        content.push('\n');
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        self.write(
            &format!("model-output/{}/{}-{}.csv", model, reference_date, model),
            &content,
        )
    }
}

/// Quantile rows for one location and target, values from `value(horizon, level)`.
pub fn quantile_rows(
    reference_date: &str,
    location: &str,
    target: &str,
    horizons: std::ops::RangeInclusive<i32>,
    levels: &[f64],
    value: impl Fn(i32, f64) -> f64,
) -> Vec<String> {
    let start = date(reference_date);
    let mut rows = Vec::new();
    for h in horizons {
        let end = start + chrono::Duration::weeks(h as i64);
        for &level in levels {
            rows.push(format!(
                "{},{},{},{},{},quantile,{},{}",
                reference_date,
                target,
                h,
                end,
                location,
                level,
                value(h, level)
            ));
        }
    }
    rows
}

/// Sample rows with draws `1..=n` scaled by horizon.
pub fn sample_rows(reference_date: &str, location: &str, horizons: std::ops::RangeInclusive<i32>, n: usize) -> Vec<String> {
    let start = date(reference_date);
    let mut rows = Vec::new();
    for h in horizons {
        let end = start + chrono::Duration::weeks(h as i64);
        for i in 1..=n {
            rows.push(format!(
                "{},wk inc flu hosp,{},{},{},sample,{},{}",
                reference_date,
                h,
                end,
                location,
                i,
                i as f64 * (h + 1) as f64
            ));
        }
    }
    rows
}

pub fn record(
    model: &str,
    location: &str,
    target: &str,
    horizon: i32,
    output_type: &str,
    output_type_id: &str,
    value: f64,
) -> ForecastRecord {
    let reference_date = date("2024-01-13");
    ForecastRecord {
        model_id: model.to_string(),
        reference_date,
        location: location.to_string(),
        target: target.to_string(),
        horizon,
        target_end_date: reference_date + chrono::Duration::weeks(horizon as i64),
        output_type: output_type.to_string(),
        output_type_id: output_type_id.to_string(),
        value,
    }
}

pub fn batch(model: &str, records: Vec<ForecastRecord>) -> FileBatch {
    FileBatch {
        source: SourceFile {
            model_id: model.to_string(),
            reference_date: date("2024-01-13"),
            origin: format!("{}.csv", model),
        },
        records,
        skipped: SkipCounts::new(),
    }
}
