//! Persisting output records, one JSON file per document.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::output_name;
use crate::error::OutputError;
use crate::models::record::OutputRecord;

/// Writes records into an output directory.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    output_dir: PathBuf,
    pretty: bool,
}

impl RecordWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            pretty: false,
        }
    }

    /// Pretty-print written records.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Target file for a document reference.
    pub fn path_for(&self, reference: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", output_name(reference)))
    }

    /// Write the record for `reference` and return the file path.
    ///
    /// An existing JSON object in the target file is kept and the record's
    /// keys are merged over it; record keys that are absent this time are
    /// removed. The file is replaced atomically.
    pub fn write(&self, reference: &str, record: &OutputRecord) -> Result<PathBuf, OutputError> {
        let path = self.path_for(reference);
        let io_err = |source: std::io::Error| OutputError::Write {
            path: path.display().to_string(),
            source,
        };

        std::fs::create_dir_all(&self.output_dir).map_err(io_err)?;

        let merged = merge_record(read_existing(&path), record)?;
        let content = if self.pretty {
            serde_json::to_string_pretty(&merged)?
        } else {
            serde_json::to_string(&merged)?
        };

        let mut file = tempfile::NamedTempFile::new_in(&self.output_dir).map_err(io_err)?;
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.persist(&path).map_err(|e| io_err(e.error))?;

        debug!(path = %path.display(), "Wrote output record");
        Ok(path)
    }
}

/// Existing JSON object at `path`, if any. Corrupt files are ignored.
fn read_existing(path: &Path) -> Option<Map<String, Value>> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Some(map),
        _ => {
            warn!(path = %path.display(), "Existing output file is not a JSON object, replacing it");
            None
        }
    }
}

fn merge_record(
    existing: Option<Map<String, Value>>,
    record: &OutputRecord,
) -> Result<Map<String, Value>, OutputError> {
    let mut merged = existing.unwrap_or_default();
    for key in OutputRecord::OPTIONAL_KEYS {
        merged.remove(key);
    }
    if let Value::Object(fields) = serde_json::to_value(record)? {
        merged.extend(fields);
    }
    Ok(merged)
}
