//! Atomic publication of payload files
//!
//! Every file is serialized in full, written to a hidden sibling
//! (`.<name>.tmp`), fsynced and renamed over the target. A reader of the
//! output directory sees either the previous file or the new one.

use crate::config::{FileKey, OutputNaming};
use crate::error::{HubError, Result};
use crate::payload::{Assembly, LocationPayload, Manifest};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File name of the run manifest.
pub const MANIFEST_FILE: &str = "metadata.json";

/// What the writer managed to publish
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Location codes written, in code order
    pub written: Vec<String>,
    /// Location codes that could not be written, with the final error
    pub failed: Vec<(String, HubError)>,
    pub manifest_written: bool,
}

/// Writes one dataset's payloads under `<output>/<dataset>/`
#[derive(Debug, Clone)]
pub struct PayloadWriter {
    dir: PathBuf,
    naming: OutputNaming,
}

impl PayloadWriter {
    /// Create the dataset directory if needed.
    pub fn new<P: AsRef<Path>>(output_root: P, dataset: &str) -> Result<Self> {
        let dir = output_root.as_ref().join(dataset);
        fs::create_dir_all(&dir).map_err(|e| HubError::io(&dir, e))?;
        Ok(Self {
            dir,
            naming: OutputNaming::default(),
        })
    }

    /// Name payload files by `naming` instead of `<code>.json`.
    pub fn with_naming(mut self, naming: OutputNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Publish every payload, then the manifest.
    ///
    /// A failed location does not stop the others. The manifest lists only the
    /// locations that were written and is skipped when none were.
    pub fn write_all(&self, assembly: &Assembly) -> WriteReport {
        let mut report = WriteReport::default();

        for (code, payload) in &assembly.payloads {
            match self.write_location(payload) {
                Ok(path) => {
                    debug!("Wrote {}", path.display());
                    report.written.push(code.clone());
                }
                Err(e) => {
                    error!("Failed to write location {}: {}", code, e);
                    report.failed.push((code.clone(), e));
                }
            }
        }

        if report.written.is_empty() {
            warn!("No location files written, leaving {} untouched", MANIFEST_FILE);
            return report;
        }

        let manifest = Manifest {
            locations: report.written.clone(),
            ..assembly.manifest.clone()
        };
        match self.write_manifest(&manifest) {
            Ok(path) => {
                info!("Wrote {}", path.display());
                report.manifest_written = true;
            }
            Err(e) => error!("Failed to write {}: {}", MANIFEST_FILE, e),
        }

        report
    }

    /// File name of a location's payload.
    pub fn file_name(&self, payload: &LocationPayload) -> Result<String> {
        let key = match self.naming.key {
            FileKey::Code => payload.code(),
            FileKey::Abbreviation => payload.metadata.abbreviation.trim(),
        };
        let stem = format!("{}{}", key, self.naming.suffix);
        if !is_safe_file_stem(&stem) {
            return Err(HubError::ParseError(format!(
                "location {}: {:?} is not usable as a file name",
                payload.code(),
                stem
            )));
        }
        Ok(format!("{}.json", stem))
    }

    /// Publish the location's payload file.
    pub fn write_location(&self, payload: &LocationPayload) -> Result<PathBuf> {
        let name = self.file_name(payload)?;
        let bytes = serde_json::to_vec(payload)?;
        self.publish(&name, &bytes)
    }

    /// Publish `metadata.json`.
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let bytes = to_pretty_json(manifest)?;
        self.publish(MANIFEST_FILE, &bytes)
    }

    fn publish(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        publish_with(&self.dir, name, bytes, write_atomic)
    }
}

/// Run `write` with a single retry on failure.
fn publish_with<F>(dir: &Path, name: &str, bytes: &[u8], mut write: F) -> Result<PathBuf>
where
    F: FnMut(&Path, &str, &[u8]) -> Result<PathBuf>,
{
    match write(dir, name, bytes) {
        Ok(path) => Ok(path),
        Err(e) => {
            warn!("Writing {} failed ({}), retrying once", name, e);
            write(dir, name, bytes)
        }
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Codes become file names, so only plain identifiers are accepted.
fn is_safe_file_stem(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Write `bytes` to `dir/name` via temp file, fsync and rename.
pub fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let target = dir.join(name);
    let temp = dir.join(format!(".{}.tmp", name));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, &target)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(HubError::io(&target, e));
    }

    Ok(target)
}
