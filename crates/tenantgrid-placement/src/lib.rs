//! tenantgrid target selection — selector rules, priority-over-load ranking.
//!
//! This crate decides which target a deployment's instance is placed on.
//! It does NOT record the decision (that's `tenantgrid-lifecycle`, which
//! owns the targets' capacity bookkeeping). Every function here is a pure
//! read over the targets and rules it is handed.
//!
//! # Components
//!
//! - **`selector`** — Selector validation, conversion, and evaluation
//! - **`scorer`** — Target scoring (`priority / (load + 1)`)
//! - **`placer`** — Rule resolution and final target selection

pub mod error;
pub mod placer;
pub mod scorer;
pub mod selector;

pub use error::{PlacementError, PlacementResult};
pub use placer::{candidate_targets, find_target, select_target};
pub use scorer::{TargetScore, rank_targets, score_target};
pub use selector::{
    evaluate, rule_applies, to_selector, validate_scheduling_rule, validate_selector,
    validate_target_scheduling,
};
