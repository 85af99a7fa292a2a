//! Sync error types.

use tenantgrid_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A store call failed during `operation`, at step `reason`.
    #[error("{operation}/{reason}: {source}")]
    State {
        operation: &'static str,
        reason: &'static str,
        #[source]
        source: StateError,
    },

    #[error("deployment {deployment} has malformed label {label}={value}")]
    MalformedLabel {
        deployment: String,
        label: &'static str,
        value: String,
    },
}

impl SyncError {
    /// Adapter for `map_err` on store calls.
    pub(crate) fn state(
        operation: &'static str,
        reason: &'static str,
    ) -> impl FnOnce(StateError) -> SyncError {
        move |source| SyncError::State {
            operation,
            reason,
            source,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            SyncError::State { operation, .. } => operation,
            SyncError::MalformedLabel { .. } => "SyncStatus",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::State { reason, .. } => reason,
            SyncError::MalformedLabel { .. } => "ParseLabel",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::State { source, .. } if source.is_conflict())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
