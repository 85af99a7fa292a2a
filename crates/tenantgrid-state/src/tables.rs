//! redb table definitions for the tenantgrid object store.
//!
//! Object tables use `&str` keys of the form `{namespace}/{name}` (cluster
//! scoped objects use an empty namespace) and `&[u8]` JSON values.

use redb::TableDefinition;

/// Tenant namespaces, cluster scoped.
pub const NAMESPACES: TableDefinition<&str, &[u8]> = TableDefinition::new("namespaces");

/// Registered target clusters.
pub const TARGETS: TableDefinition<&str, &[u8]> = TableDefinition::new("targets");

/// Internal deployment requests.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Runtime instances, one per deployment.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Tenant-facing registrations.
pub const REGISTRATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("registrations");

/// Manual target scheduling rule sets.
pub const SCHEDULINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("schedulings");

/// Secondary index over object labels.
///
/// Keys are `{kind}\0{label}\0{value}\0{namespace}/{name}`; values are empty.
pub const LABEL_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("label_index");

/// Store-wide counters. Holds the last issued resource version.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] for the resource version counter.
pub const RESOURCE_VERSION_KEY: &str = "resource_version";
