//! `tenantgridd apply`: admitted writes of user-authored documents.
//!
//! A document names its kind in a top-level `kind` field and is otherwise
//! the object as stored, except for TargetScheduling, which is given in
//! its wire form and converted during admission.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use tenantgrid_admission::{AdmittedStore, Applied, WriteError, WriteResult};
use tenantgrid_state::{
    Deployment, Namespace, Object, ObjectRef, RawTargetScheduling, Registration, Target,
    TargetScheduling,
};

use crate::scheduling::parse_document;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    Namespace(Namespace),
    Target(Target),
    Deployment(Deployment),
    Registration(Registration),
    TargetScheduling(RawTargetScheduling),
}

/// The outcome of applying one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub kind: &'static str,
    pub key: ObjectRef,
    pub applied: Applied,
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.applied {
            Applied::Created => "created",
            Applied::Updated => "updated",
        };
        write!(f, "{} {} {verb}", self.kind, self.key)
    }
}

fn report<T: Object>((obj, applied): (T, Applied)) -> ApplyReport {
    ApplyReport {
        kind: T::KIND,
        key: obj.key(),
        applied,
    }
}

pub fn apply_manifest(writer: &AdmittedStore, manifest: Manifest) -> WriteResult<ApplyReport> {
    match manifest {
        Manifest::Namespace(obj) => writer.apply(obj).map(report),
        Manifest::Target(obj) => writer.apply(obj).map(report),
        Manifest::Deployment(obj) => writer.apply(obj).map(report),
        Manifest::Registration(obj) => writer.apply(obj).map(report),
        Manifest::TargetScheduling(doc) => writer
            .apply_target_scheduling(&doc)
            .map(report::<TargetScheduling>),
    }
}

/// Read the document at `path` and apply it.
///
/// An admission rejection comes back as one line per field error; store
/// and decoding failures are errors.
pub fn apply_file(
    writer: &AdmittedStore,
    path: &Path,
) -> anyhow::Result<Result<ApplyReport, Vec<String>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let manifest: Manifest = parse_document(path, &raw)?;
    debug!(path = %path.display(), "applying document");
    match apply_manifest(writer, manifest) {
        Ok(report) => Ok(Ok(report)),
        Err(WriteError::Rejected(e)) => Ok(Err(e.errors().iter().map(|e| e.to_string()).collect())),
        Err(e @ WriteError::State(_)) => Err(e).context("writing to the state store"),
    }
}
