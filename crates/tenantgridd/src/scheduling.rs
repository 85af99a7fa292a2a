//! Loading documents from disk, and TargetScheduling documents for offline
//! validation.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

use tenantgrid_admission::{AdmissionError, admit_target_scheduling};
use tenantgrid_state::{RawTargetScheduling, TargetScheduling};

/// Parse a document as JSON when the file says so, TOML otherwise.
pub fn parse_document<T: DeserializeOwned>(path: &Path, raw: &str) -> anyhow::Result<T> {
    let is_json = path.extension().is_some_and(|ext| ext == "json")
        || raw.trim_start().starts_with('{');
    if is_json {
        serde_json::from_str(raw).context("decoding JSON document")
    } else {
        toml::from_str(raw).context("decoding TOML document")
    }
}

/// Read and admit the document at `path`.
///
/// On rejection, the returned list holds one line per field error.
pub fn validate_file(path: &Path) -> anyhow::Result<Result<TargetScheduling, Vec<String>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let doc: RawTargetScheduling = parse_document(path, &raw)?;
    match admit_target_scheduling(&doc) {
        Ok(scheduling) => Ok(Ok(scheduling)),
        Err(AdmissionError::Invalid { errors, .. }) => {
            Ok(Err(errors.iter().map(|e| e.to_string()).collect()))
        }
    }
}
