//! Error types for admission.

use tenantgrid_state::{ErrorList, StateError};
use thiserror::Error;

/// Result type alias for admission checks.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The object failed validation; nothing was written.
    #[error("{kind} {key} is invalid: {errors}")]
    Invalid {
        kind: &'static str,
        key: String,
        errors: ErrorList,
    },
}

impl AdmissionError {
    pub fn errors(&self) -> &ErrorList {
        match self {
            AdmissionError::Invalid { errors, .. } => errors,
        }
    }
}

/// Result type alias for admitted writes.
pub type WriteResult<T> = Result<T, WriteError>;

/// Failure of an admitted write: either admission said no, or the store did.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Rejected(#[from] AdmissionError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl WriteError {
    /// Field errors when admission rejected the write.
    pub fn rejection(&self) -> Option<&ErrorList> {
        match self {
            WriteError::Rejected(e) => Some(e.errors()),
            WriteError::State(_) => None,
        }
    }
}
