//! tenantgrid-admission — validation and defaulting for every resource kind.
//!
//! Runs before a user write is committed; [`AdmittedStore`] is the write
//! path that enforces it. Validation failures are terminal
//! and never reach reconciliation. Errors are reported as field-path lists
//! so that a deeply nested mistake is located exactly.

pub mod admit;
pub mod error;
pub mod kinds;
pub mod shared;
pub mod write;

pub use admit::{Admit, admit_create, admit_target_scheduling, admit_update};
pub use error::{AdmissionError, AdmissionResult, WriteError, WriteResult};
pub use write::{AdmittedStore, Applied};
