//! tenantgridd — the tenantgrid daemon.
//!
//! Library half of the binary: configuration, the resync driver that
//! stands in for an event-driven work queue, admitted writes of
//! user-authored documents, and offline validation of scheduling
//! documents.

pub mod apply;
pub mod config;
pub mod driver;
pub mod scheduling;

pub use apply::{ApplyReport, Manifest, apply_file, apply_manifest};
pub use config::{Config, LogFormat, SchedulingConfig};
pub use driver::{Driver, TickReport};
