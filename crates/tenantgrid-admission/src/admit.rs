//! Admission entry points.
//!
//! Every kind a user may write implements [`Admit`]: defaults are applied
//! first, then the object is validated, and on update also checked against
//! the stored copy. A non-empty error list rejects the write.

use tracing::debug;

use tenantgrid_placement::validate_target_scheduling;
use tenantgrid_state::{ErrorList, Object, RawTargetScheduling, TargetScheduling};

use crate::error::{AdmissionError, AdmissionResult};

/// Admission hooks for a stored kind.
pub trait Admit: Object {
    /// Fill zero-valued optional fields.
    fn apply_defaults(&mut self) {}

    /// Validate the object on its own.
    fn validate(&self) -> ErrorList;

    /// Validate an update against the currently stored object.
    fn validate_update(&self, old: &Self) -> ErrorList {
        let _ = old;
        ErrorList::new()
    }
}

/// Default and validate an object about to be created.
pub fn admit_create<T: Admit>(obj: &mut T) -> AdmissionResult<()> {
    obj.apply_defaults();
    reject_if_any::<T>(obj, obj.validate())
}

/// Default and validate an object about to replace `old`.
pub fn admit_update<T: Admit>(obj: &mut T, old: &T) -> AdmissionResult<()> {
    obj.apply_defaults();
    let mut errs = obj.validate();
    errs.extend(obj.validate_update(old));
    reject_if_any::<T>(obj, errs)
}

/// Validate a user-authored scheduling document and convert it to its
/// stored form.
pub fn admit_target_scheduling(doc: &RawTargetScheduling) -> AdmissionResult<TargetScheduling> {
    validate_target_scheduling(doc).map_err(|errors| {
        debug!(key = %doc.metadata.key(), errors = errors.len(), "target scheduling rejected");
        AdmissionError::Invalid {
            kind: TargetScheduling::KIND,
            key: doc.metadata.key().to_string(),
            errors,
        }
    })
}

fn reject_if_any<T: Object>(obj: &T, errors: ErrorList) -> AdmissionResult<()> {
    if errors.is_empty() {
        return Ok(());
    }
    debug!(kind = T::KIND, key = %obj.key(), errors = errors.len(), "object rejected");
    Err(AdmissionError::Invalid {
        kind: T::KIND,
        key: obj.key().to_string(),
        errors,
    })
}
