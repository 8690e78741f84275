//! Pipeline configuration
//!
//! Every dataset starts from a built-in preset ([`PipelineConfig::flusight`],
//! [`PipelineConfig::rsv`], [`PipelineConfig::nhsn`]). A TOML file may override any field of the preset;
//! tables are merged key by key so a file only needs to list what differs.

use crate::error::{HubError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Datasets with a built-in preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Flusight,
    Rsv,
    /// Observed admissions only, no model output
    Nhsn,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Flusight => "flusight",
            Dataset::Rsv => "rsv",
            Dataset::Nhsn => "nhsn",
        }
    }

    pub fn preset(&self) -> PipelineConfig {
        match self {
            Dataset::Flusight => PipelineConfig::flusight(),
            Dataset::Rsv => PipelineConfig::rsv(),
            Dataset::Nhsn => PipelineConfig::nhsn(),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "flusight" | "flu" => Ok(Dataset::Flusight),
            "rsv" => Ok(Dataset::Rsv),
            "nhsn" => Ok(Dataset::Nhsn),
            other => Err(HubError::ConfigError(format!("Unknown dataset: {}", other))),
        }
    }
}

/// Quantile levels used by the FluSight and RSV hubs.
pub const HUB_QUANTILE_LEVELS: [f64; 23] = [
    0.01, 0.025, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7,
    0.75, 0.8, 0.85, 0.9, 0.95, 0.975, 0.99,
];

/// Locations of the hub inputs, relative to the hub root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubPaths {
    pub model_output: PathBuf,
    pub target_data: PathBuf,
    pub locations: PathBuf,
}

/// Which location field names a payload file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKey {
    #[default]
    Code,
    Abbreviation,
}

/// Payload file names: `<key><suffix>.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNaming {
    pub key: FileKey,
    #[serde(default)]
    pub suffix: String,
}

/// Ensemble builder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub enabled: bool,
    /// Reserved model id the ensemble is published under
    pub model_id: String,
    pub min_horizon: i32,
    pub max_horizon: i32,
    /// Minimum number of contributing models per (location, target, horizon)
    pub min_models: usize,
}

impl EnsembleConfig {
    pub fn covers_horizon(&self, horizon: i32) -> bool {
        (self.min_horizon..=self.max_horizon).contains(&horizon)
    }
}

/// Ground truth loader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthConfig {
    /// Observations before this date are dropped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<NaiveDate>,
    /// Keep only rows whose `target` column equals this value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Keep only rows whose `age_group` column equals this value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
}

/// A (model, location) pair whose forecasts are never published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub model: String,
    pub location: String,
}

/// A hub CSV hosted outside the hub checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
    pub model_id: String,
    pub reference_date: NaiveDate,
    pub url: String,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 30,
        }
    }
}

/// Full configuration of one preprocessing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Output subdirectory and log label
    pub dataset: String,
    pub paths: HubPaths,
    /// Read model output; when false only ground truth is published
    pub forecasts: bool,
    pub output_naming: OutputNaming,
    /// Target allow-list
    pub targets: Vec<String>,
    /// Canonical quantile grid for sample conversion
    pub quantile_levels: Vec<f64>,
    pub ensemble: EnsembleConfig,
    pub ground_truth: GroundTruthConfig,
    /// Keep only forecast rows for this age group when the column is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_age_group: Option<String>,
    pub exclusions: Vec<Exclusion>,
    /// Models read in demo mode; an empty list reads every model
    pub demo_models: Vec<String>,
    /// Display order of PMF categories
    pub pmf_category_order: Vec<String>,
    /// Expected draw count per sample group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_samples: Option<usize>,
    /// Reject predictions that break a schema invariant instead of repairing them
    pub strict: bool,
    pub remote: Vec<RemoteSource>,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// Preset for the FluSight forecast hub.
    pub fn flusight() -> Self {
        Self {
            dataset: "flusight".to_string(),
            paths: HubPaths {
                model_output: PathBuf::from("model-output"),
                target_data: PathBuf::from("target-data/target-hospital-admissions.csv"),
                locations: PathBuf::from("auxiliary-data/locations.csv"),
            },
            forecasts: true,
            output_naming: OutputNaming::default(),
            targets: vec![
                "wk inc flu hosp".to_string(),
                "wk flu hosp rate change".to_string(),
            ],
            quantile_levels: HUB_QUANTILE_LEVELS.to_vec(),
            ensemble: EnsembleConfig {
                enabled: true,
                model_id: "RespiLens-ensemble".to_string(),
                min_horizon: 0,
                max_horizon: 3,
                min_models: 1,
            },
            ground_truth: GroundTruthConfig {
                cutoff: NaiveDate::from_ymd_opt(2023, 10, 1),
                target: None,
                age_group: None,
            },
            forecast_age_group: None,
            exclusions: Vec::new(),
            demo_models: vec![
                "UNC_IDD-influpaint".to_string(),
                "FluSight-ensemble".to_string(),
            ],
            pmf_category_order: vec![
                "large_decrease".to_string(),
                "decrease".to_string(),
                "stable".to_string(),
                "increase".to_string(),
                "large_increase".to_string(),
            ],
            expected_samples: Some(100),
            strict: false,
            remote: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Preset for the RSV forecast hub.
    pub fn rsv() -> Self {
        Self {
            dataset: "rsv".to_string(),
            paths: HubPaths {
                model_output: PathBuf::from("model-output"),
                target_data: PathBuf::from("target-data/rsvnet_hospitalization.csv"),
                locations: PathBuf::from("auxiliary-data/location_census/locations.csv"),
            },
            targets: vec!["inc hosp".to_string()],
            ground_truth: GroundTruthConfig {
                cutoff: NaiveDate::from_ymd_opt(2023, 10, 1),
                target: Some("inc hosp".to_string()),
                age_group: Some("0-130".to_string()),
            },
            forecast_age_group: Some("0-130".to_string()),
            demo_models: Vec::new(),
            pmf_category_order: Vec::new(),
            expected_samples: None,
            ..Self::flusight()
        }
    }

    /// Preset for the NHSN admissions export: the FluSight hub's target data,
    /// one `<ABBR>_nhsn.json` per location, no forecasts.
    pub fn nhsn() -> Self {
        let flusight = Self::flusight();
        Self {
            dataset: "nhsn".to_string(),
            forecasts: false,
            output_naming: OutputNaming {
                key: FileKey::Abbreviation,
                suffix: "_nhsn".to_string(),
            },
            targets: Vec::new(),
            ensemble: EnsembleConfig {
                enabled: false,
                ..flusight.ensemble.clone()
            },
            ground_truth: GroundTruthConfig {
                cutoff: None,
                target: None,
                age_group: None,
            },
            demo_models: Vec::new(),
            ..flusight
        }
    }

    /// Load `path` on top of a preset.
    pub fn from_toml_file<P: AsRef<Path>>(preset: PipelineConfig, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HubError::ConfigError(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(preset, &content)
    }

    /// Parse TOML text on top of a preset.
    pub fn from_toml_str(preset: PipelineConfig, content: &str) -> Result<Self> {
        let overlay: toml::Value = toml::from_str(content)
            .map_err(|e| HubError::ConfigError(format!("Invalid config TOML: {}", e)))?;
        let mut base = toml::Value::try_from(&preset)
            .map_err(|e| HubError::ConfigError(format!("Cannot encode preset: {}", e)))?;

        merge_toml(&mut base, overlay);

        let config: PipelineConfig = base
            .try_into()
            .map_err(|e| HubError::ConfigError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before any input is read.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(HubError::ConfigError("dataset must not be empty".to_string()));
        }
        if self.forecasts && self.targets.is_empty() {
            return Err(HubError::ConfigError(
                "at least one target must be configured".to_string(),
            ));
        }
        hub_math::quantiles::validate_levels(&self.quantile_levels)
            .map_err(|e| HubError::ConfigError(format!("quantile_levels: {}", e)))?;
        if self.ensemble.min_horizon > self.ensemble.max_horizon {
            return Err(HubError::ConfigError(format!(
                "ensemble horizon range {}..={} is empty",
                self.ensemble.min_horizon, self.ensemble.max_horizon
            )));
        }
        if self.ensemble.min_models == 0 {
            return Err(HubError::ConfigError(
                "ensemble.min_models must be at least 1".to_string(),
            ));
        }
        if self.ensemble.model_id.trim().is_empty() {
            return Err(HubError::ConfigError(
                "ensemble.model_id must not be empty".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(HubError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.expected_samples == Some(0) {
            return Err(HubError::ConfigError(
                "expected_samples must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_target_allowed(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }

    pub fn is_excluded(&self, model: &str, location: &str) -> bool {
        self.exclusions
            .iter()
            .any(|e| e.model == model && e.location == location)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::flusight()
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, everything else replaces.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(PipelineConfig::flusight().validate().is_ok());
        assert!(PipelineConfig::rsv().validate().is_ok());
        assert!(PipelineConfig::nhsn().validate().is_ok());
    }

    #[test]
    fn test_nhsn_preset_publishes_ground_truth_only() {
        let config: PipelineConfig = "nhsn".parse::<Dataset>().unwrap().preset();

        assert!(!config.forecasts);
        assert!(!config.ensemble.enabled);
        assert_eq!(config.output_naming.key, FileKey::Abbreviation);
        assert_eq!(config.output_naming.suffix, "_nhsn");
        assert_eq!(config.paths, PipelineConfig::flusight().paths);

        let overridden =
            PipelineConfig::from_toml_str(PipelineConfig::nhsn(), "[output_naming]\nsuffix = \"\"\n")
                .unwrap();
        assert_eq!(overridden.output_naming.key, FileKey::Abbreviation);
        assert_eq!(overridden.output_naming.suffix, "");
    }

    #[test]
    fn test_overlay_keeps_unlisted_fields() {
        let config = PipelineConfig::from_toml_str(
            PipelineConfig::rsv(),
            r#"
            strict = true

            [ensemble]
            max_horizon = 4
            "#,
        )
        .unwrap();

        assert!(config.strict);
        assert_eq!(config.ensemble.max_horizon, 4);
        assert_eq!(config.ensemble.min_horizon, 0);
        assert_eq!(config.dataset, "rsv");
        assert_eq!(config.forecast_age_group.as_deref(), Some("0-130"));
    }

    #[test]
    fn test_bundled_config_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/flusight.toml");
        let config = PipelineConfig::from_toml_file(PipelineConfig::flusight(), path).unwrap();

        assert_eq!(config.ensemble.min_models, 2);
        assert_eq!(config.ground_truth.cutoff, NaiveDate::from_ymd_opt(2023, 10, 1));
        assert_eq!(config.targets, PipelineConfig::flusight().targets);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let bad_levels = PipelineConfig::from_toml_str(
            PipelineConfig::flusight(),
            "quantile_levels = [0.5, 0.25]",
        );
        assert!(matches!(bad_levels, Err(HubError::ConfigError(_))));

        let bad_type = PipelineConfig::from_toml_str(PipelineConfig::flusight(), "strict = \"yes\"");
        assert!(matches!(bad_type, Err(HubError::ConfigError(_))));

        let exclusions = PipelineConfig::from_toml_str(
            PipelineConfig::flusight(),
            r#"
            [[exclusions]]
            model = "modelA"
            location = "72"
            "#,
        )
        .unwrap();
        assert!(exclusions.is_excluded("modelA", "72"));
        assert!(!exclusions.is_excluded("modelA", "37"));
    }
}
