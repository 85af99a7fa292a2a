//! tenantgrid-sync — keeps tenant registrations and internal deployments
//! in step.
//!
//! Two one-directional paths:
//!
//! - [`RegistrationController`] (spec-down) turns a registration into a
//!   tenant namespace and a correlated deployment whenever the
//!   registration's generation moves, and tears the deployment down when
//!   the registration is deleted.
//! - [`StatusSync`] (status-up) copies instance errors and credentials back
//!   onto the registration after a deployment's status changed.

pub mod error;
pub mod spec_down;
pub mod status_up;

pub use error::{SyncError, SyncResult};
pub use spec_down::{Outcome, RegistrationController};
pub use status_up::StatusSync;
