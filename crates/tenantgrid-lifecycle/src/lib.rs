//! tenantgrid-lifecycle — instance creation, retirement and target capacity.
//!
//! Each deployment is realised by exactly one instance placed on a target.
//! The controllers here are level-triggered: every pass re-reads the store,
//! does at most one kind of write per step, and can be repeated safely.
//!
//! # Architecture
//!
//! ```text
//! DeploymentController
//!   ├── StateStore (Deployment, Instance, Target, TargetScheduling)
//!   ├── find_target (from tenantgrid-placement)
//!   └── Capacity (assignedInstances read-modify-write)
//!
//! InstanceController
//!   ├── StateStore (Instance)
//!   └── Capacity (release on retire)
//!
//! TargetController
//!   └── Capacity (publish remaining capacity)
//! ```

pub mod capacity;
pub mod deployment;
pub mod error;
pub mod ids;
pub mod instance;
pub mod target;

pub use capacity::{Capacity, NOMINAL_CAPACITY};
pub use deployment::{DeploymentController, LifecycleConfig, Outcome};
pub use error::{Cause, LifecycleError, LifecycleResult};
pub use ids::{IdGenerator, random_ids};
pub use instance::InstanceController;
pub use target::TargetController;
