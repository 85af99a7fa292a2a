//! Error types for target selection.

use thiserror::Error;

/// Result type alias for placement decisions.
pub type PlacementResult<T> = Result<T, PlacementError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// No eligible target is left after filtering. Terminal until a target
    /// becomes visible or the deployment's constraints are relaxed.
    #[error("no target with remaining capacity available")]
    NoCapacity,
}
