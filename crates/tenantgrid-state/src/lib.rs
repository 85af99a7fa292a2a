//! tenantgrid-state — object model and versioned object store for tenantgrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for namespaces, targets, deployments, instances, registrations,
//! and target scheduling rules.
//!
//! # Architecture
//!
//! All kinds are JSON-serialized into redb's `&[u8]` value columns under
//! `{namespace}/{name}` keys. Writes are optimistic: each carries the
//! resource version it was read at and fails with a conflict when another
//! writer got there first. A label index maintained in the same transaction
//! answers "which objects carry `label=value`" without scanning.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod field;
pub mod meta;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use field::{ErrorList, FieldError, FieldErrorKind, FieldPath};
pub use meta::*;
pub use store::StateStore;
pub use types::*;
