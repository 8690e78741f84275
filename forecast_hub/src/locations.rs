//! Location registry: code, abbreviation, name and population per location

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Reference data for one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationMeta {
    /// FIPS-style location code ("US", "06", "37")
    pub code: String,
    pub abbreviation: String,
    pub name: String,
    pub population: u64,
}

impl LocationMeta {
    pub fn new(code: &str, abbreviation: &str, name: &str, population: u64) -> Self {
        Self {
            code: code.to_string(),
            abbreviation: abbreviation.to_string(),
            name: name.to_string(),
            population,
        }
    }

    /// Observations per 100,000 residents.
    pub fn rate_per_100k(&self, value: f64) -> f64 {
        value / self.population as f64 * 100_000.0
    }
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    location: String,
    #[serde(default)]
    abbreviation: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
    #[serde(default)]
    population: Option<String>,
}

/// Immutable lookup table of known locations
#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    by_code: BTreeMap<String, LocationMeta>,
    abbreviations: HashMap<String, String>,
}

impl LocationRegistry {
    /// Build a registry from already validated entries. Later duplicates of a code are ignored.
    pub fn from_entries<I: IntoIterator<Item = LocationMeta>>(entries: I) -> Self {
        let mut registry = Self::default();
        for meta in entries {
            registry.insert(meta);
        }
        registry
    }

    /// Load `locations.csv`.
    ///
    /// Rows without a name, abbreviation or a positive population are skipped
    /// with a warning. A missing or empty registry is a configuration error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading locations from {}", path.display());

        let mut reader = csv::Reader::from_path(path).map_err(|e| {
            HubError::ConfigError(format!("Cannot open registry {}: {}", path.display(), e))
        })?;

        let mut registry = Self::default();
        for (i, row) in reader.deserialize::<LocationRow>().enumerate() {
            let line = i + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping locations row {}: {}", line, e);
                    continue;
                }
            };

            match Self::meta_from_row(row) {
                Ok(meta) => {
                    if registry.by_code.contains_key(&meta.code) {
                        warn!("Duplicate location code {} at row {}, keeping first", meta.code, line);
                        continue;
                    }
                    registry.insert(meta);
                }
                Err(e) => warn!("Skipping locations row {}: {}", line, e),
            }
        }

        if registry.is_empty() {
            return Err(HubError::ConfigError(format!(
                "Registry {} contains no usable locations",
                path.display()
            )));
        }

        info!("Loaded {} locations", registry.len());
        Ok(registry)
    }

    fn meta_from_row(row: LocationRow) -> Result<LocationMeta> {
        let code = row.location.trim().to_string();
        if code.is_empty() {
            return Err(HubError::ParseError("empty location code".to_string()));
        }

        let abbreviation = non_empty(row.abbreviation)
            .ok_or_else(|| HubError::ParseError(format!("location {} has no abbreviation", code)))?;
        let name = non_empty(row.location_name)
            .ok_or_else(|| HubError::ParseError(format!("location {} has no name", code)))?;

        let population = non_empty(row.population)
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p >= 1.0)
            .ok_or_else(|| {
                HubError::ParseError(format!("location {} has no positive population", code))
            })?;

        Ok(LocationMeta {
            code,
            abbreviation,
            name,
            population: population.round() as u64,
        })
    }

    fn insert(&mut self, meta: LocationMeta) {
        if self.by_code.contains_key(&meta.code) {
            return;
        }
        self.abbreviations
            .entry(meta.abbreviation.to_uppercase())
            .or_insert_with(|| meta.code.clone());
        self.by_code.insert(meta.code.clone(), meta);
    }

    /// Look a location up by its code.
    pub fn get(&self, code: &str) -> Option<&LocationMeta> {
        self.by_code.get(code)
    }

    /// Look a location up by code, falling back to a case-insensitive abbreviation match.
    pub fn resolve(&self, code_or_abbreviation: &str) -> Option<&LocationMeta> {
        let key = code_or_abbreviation.trim();
        self.by_code.get(key).or_else(|| {
            self.abbreviations
                .get(&key.to_uppercase())
                .and_then(|code| self.by_code.get(code))
        })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Locations in code order.
    pub fn iter(&self) -> impl Iterator<Item = &LocationMeta> {
        self.by_code.values()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.by_code.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("NA"))
}
