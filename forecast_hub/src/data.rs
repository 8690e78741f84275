//! Hub model-output discovery and CSV parsing

use crate::config::PipelineConfig;
use crate::error::{HubError, Result, SkipCategory};
use crate::locations::LocationRegistry;
use crate::summary::SkipCounts;
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Columns every model-output file must carry.
const REQUIRED_COLUMNS: [&str; 4] = ["location", "target", "output_type", "value"];

/// One raw row of a model-output file, after location resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub model_id: String,
    pub reference_date: NaiveDate,
    /// Registry location code
    pub location: String,
    pub target: String,
    pub horizon: i32,
    pub target_end_date: NaiveDate,
    pub output_type: String,
    pub output_type_id: String,
    pub value: f64,
}

/// Where a batch of records came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    pub model_id: String,
    pub reference_date: NaiveDate,
    /// File path or URL, for logging
    pub origin: String,
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin)
    }
}

/// A model-output file found on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HubFile {
    pub source: SourceFile,
    pub path: PathBuf,
}

/// Records parsed from one source, plus the rows that were dropped
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub source: SourceFile,
    pub records: Vec<ForecastRecord>,
    pub skipped: SkipCounts,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    location: String,
    #[serde(default)]
    reference_date: Option<String>,
    #[serde(default)]
    origin_date: Option<String>,
    target: String,
    #[serde(default)]
    horizon: Option<String>,
    #[serde(default)]
    target_end_date: Option<String>,
    output_type: String,
    #[serde(default)]
    output_type_id: Option<String>,
    value: String,
    #[serde(default)]
    age_group: Option<String>,
}

/// Parse `<YYYY-MM-DD>-<model>.csv` into its date and model id.
pub fn parse_file_name(file_name: &str) -> Option<(NaiveDate, String)> {
    let stem = file_name.strip_suffix(".csv")?;
    if stem.len() < 12 || !stem.is_char_boundary(10) {
        return None;
    }
    let (date_part, rest) = stem.split_at(10);
    let model = rest.strip_prefix('-')?;
    if model.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date, model.to_string()))
}

/// Parse an ISO date, tolerating a trailing time component.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().or_else(|| {
        value
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

fn parse_horizon(value: Option<&str>) -> Option<i32> {
    let value = value?.trim();
    if let Ok(h) = value.parse::<i32>() {
        return Some(h);
    }
    let h = value.parse::<f64>().ok()?;
    (h.is_finite() && h.fract() == 0.0).then_some(h as i32)
}

fn parse_value(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads model-output files, keeping only rows for known locations and allowed targets
#[derive(Debug, Clone, Copy)]
pub struct HubReader<'a> {
    registry: &'a LocationRegistry,
    config: &'a PipelineConfig,
}

impl<'a> HubReader<'a> {
    pub fn new(registry: &'a LocationRegistry, config: &'a PipelineConfig) -> Self {
        Self { registry, config }
    }

    /// Find `<model_dir>/<date>-<model>.csv` files below the model-output directory.
    ///
    /// In demo mode only the configured demo models are returned. Files whose
    /// name does not parse, or whose model differs from the directory name, are
    /// counted as parse skips.
    pub fn discover(&self, model_output: &Path, demo_mode: bool) -> Result<(Vec<HubFile>, SkipCounts)> {
        let mut skipped = SkipCounts::new();
        let mut files = Vec::new();

        let mut model_dirs: Vec<PathBuf> = std::fs::read_dir(model_output)
            .map_err(|e| {
                HubError::ConfigError(format!(
                    "Cannot read model output directory {}: {}",
                    model_output.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        model_dirs.sort();

        for dir in model_dirs {
            let Some(dir_model) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if demo_mode
                && !self.config.demo_models.is_empty()
                && !self.config.demo_models.contains(&dir_model)
            {
                debug!("Demo mode: skipping model {}", dir_model);
                continue;
            }

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cannot list {}: {}", dir.display(), e);
                    skipped.record(SkipCategory::Io);
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .collect();
            paths.sort();

            for path in paths {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.ends_with(".csv") {
                    if name.ends_with(".parquet") {
                        warn!("Skipping {}: only CSV model output is supported", path.display());
                        skipped.record(SkipCategory::Parse);
                    }
                    continue;
                }

                match parse_file_name(name) {
                    Some((date, model)) if model == dir_model => files.push(HubFile {
                        source: SourceFile {
                            model_id: model,
                            reference_date: date,
                            origin: path.display().to_string(),
                        },
                        path,
                    }),
                    Some((_, model)) => {
                        warn!(
                            "Skipping {}: model {} does not match directory {}",
                            path.display(),
                            model,
                            dir_model
                        );
                        skipped.record(SkipCategory::Parse);
                    }
                    None => {
                        warn!("Skipping {}: name is not <date>-<model>.csv", path.display());
                        skipped.record(SkipCategory::Parse);
                    }
                }
            }
        }

        Ok((files, skipped))
    }

    /// Read one model-output file from disk.
    pub fn read_file(&self, file: &HubFile) -> Result<FileBatch> {
        let handle = File::open(&file.path).map_err(|e| HubError::io(&file.path, e))?;
        self.read_csv(handle, file.source.clone())
    }

    /// Parse model-output CSV from any reader.
    ///
    /// Returns an error only when the file as a whole is unusable (unreadable
    /// header, missing required columns). Bad rows are skipped and counted.
    pub fn read_csv<R: Read>(&self, reader: R, source: SourceFile) -> Result<FileBatch> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();
        if !missing.is_empty() {
            return Err(HubError::ParseError(format!(
                "{} is missing columns: {}",
                source,
                missing.join(", ")
            )));
        }

        let mut records = Vec::new();
        let mut skipped = SkipCounts::new();
        let mut unknown_locations = BTreeSet::new();

        for (i, row) in csv_reader.deserialize::<RawRow>().enumerate() {
            let line = i + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    debug!("{} line {}: {}", source, line, e);
                    skipped.record(SkipCategory::Parse);
                    continue;
                }
            };

            match self.record_from_row(row, &source) {
                Ok(RowOutcome::Record(record)) => records.push(record),
                Ok(RowOutcome::OutOfScope) => {}
                Ok(RowOutcome::Excluded) => skipped.record(SkipCategory::Excluded),
                Err(HubError::LookupError(location)) => {
                    unknown_locations.insert(location);
                    skipped.record(SkipCategory::Lookup);
                }
                Err(e) => {
                    debug!("{} line {}: {}", source, line, e);
                    skipped.record_error(&e);
                }
            }
        }

        if !unknown_locations.is_empty() {
            warn!(
                "{}: dropped rows for unknown locations {:?}",
                source, unknown_locations
            );
        }
        if skipped.get(SkipCategory::Parse) > 0 {
            warn!(
                "{}: skipped {} malformed rows",
                source,
                skipped.get(SkipCategory::Parse)
            );
        }

        Ok(FileBatch {
            source,
            records,
            skipped,
        })
    }

    fn record_from_row(&self, row: RawRow, source: &SourceFile) -> Result<RowOutcome> {
        if !self.config.is_target_allowed(&row.target) {
            return Ok(RowOutcome::OutOfScope);
        }
        if let (Some(wanted), Some(age_group)) = (&self.config.forecast_age_group, &row.age_group) {
            if wanted != age_group {
                return Ok(RowOutcome::OutOfScope);
            }
        }

        let location = self
            .registry
            .resolve(&row.location)
            .map(|meta| meta.code.clone())
            .ok_or_else(|| HubError::LookupError(row.location.clone()))?;

        if self.config.is_excluded(&source.model_id, &location) {
            return Ok(RowOutcome::Excluded);
        }

        let declared = row
            .reference_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| row.origin_date.as_deref().filter(|d| !d.is_empty()));
        let reference_date = match declared {
            Some(date) => parse_iso_date(date).ok_or_else(|| {
                HubError::ParseError(format!("invalid reference_date {:?}", date))
            })?,
            None => source.reference_date,
        };

        let horizon = parse_horizon(row.horizon.as_deref()).ok_or_else(|| {
            HubError::ParseError(format!("invalid horizon {:?}", row.horizon))
        })?;

        let target_end_date = match row.target_end_date.as_deref().filter(|d| !d.is_empty()) {
            Some(date) => parse_iso_date(date).ok_or_else(|| {
                HubError::ParseError(format!("invalid target_end_date {:?}", date))
            })?,
            None => shift_weeks(reference_date, horizon).ok_or_else(|| {
                HubError::ParseError(format!("cannot derive target_end_date for horizon {}", horizon))
            })?,
        };

        let value = parse_value(&row.value)
            .ok_or_else(|| HubError::ParseError(format!("invalid value {:?}", row.value)))?;

        Ok(RowOutcome::Record(ForecastRecord {
            model_id: source.model_id.clone(),
            reference_date,
            location,
            target: row.target,
            horizon,
            target_end_date,
            output_type: row.output_type,
            output_type_id: row.output_type_id.unwrap_or_default(),
            value,
        }))
    }
}

/// What became of one CSV row
enum RowOutcome {
    Record(ForecastRecord),
    /// Target or age group not configured for this run
    OutOfScope,
    /// (model, location) pair on the exclusion list
    Excluded,
}

/// `date` moved by `weeks` whole weeks, in either direction.
fn shift_weeks(date: NaiveDate, weeks: i32) -> Option<NaiveDate> {
    let days = Days::new(u64::from(weeks.unsigned_abs()) * 7);
    if weeks >= 0 {
        date.checked_add_days(days)
    } else {
        date.checked_sub_days(days)
    }
}
