//! Lifecycle error types.

use tenantgrid_placement::PlacementError;
use tenantgrid_state::StateError;
use thiserror::Error;

/// A failed reconcile step.
///
/// `operation` names the reconcile phase and `reason` the step that failed
/// within it; both end up on the object's `lastError`.
#[derive(Debug, Error)]
#[error("{operation}/{reason}: {source}")]
pub struct LifecycleError {
    pub operation: &'static str,
    pub reason: &'static str,
    #[source]
    pub source: Cause,
}

/// Underlying cause of a [`LifecycleError`].
#[derive(Debug, Error)]
pub enum Cause {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// Every attempt of a read-modify-write loop lost to a concurrent writer.
    #[error("gave up on {key} after {attempts} conflicting writes")]
    Contention { key: String, attempts: u32 },

    #[error("no free instance id after {attempts} attempts")]
    IdsExhausted { attempts: u32 },
}

impl LifecycleError {
    pub fn new(operation: &'static str, reason: &'static str, cause: impl Into<Cause>) -> Self {
        Self {
            operation,
            reason,
            source: cause.into(),
        }
    }

    /// True when no target could take the instance. Resolved only by an
    /// external change, so callers should not retry eagerly.
    pub fn is_no_capacity(&self) -> bool {
        matches!(self.source, Cause::Placement(PlacementError::NoCapacity))
    }

    pub fn is_conflict(&self) -> bool {
        match &self.source {
            Cause::State(e) => e.is_conflict(),
            Cause::Contention { .. } => true,
            _ => false,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Shorthand for attaching operation/reason to a fallible step.
pub(crate) trait Context<T> {
    fn context(self, operation: &'static str, reason: &'static str) -> LifecycleResult<T>;
}

impl<T, E: Into<Cause>> Context<T> for Result<T, E> {
    fn context(self, operation: &'static str, reason: &'static str) -> LifecycleResult<T> {
        self.map_err(|e| LifecycleError::new(operation, reason, e))
    }
}
