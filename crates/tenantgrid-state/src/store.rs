//! StateStore — redb-backed versioned object store.
//!
//! Provides typed get/list/create/update/update_status/delete over every
//! [`Object`] kind. Values are JSON-serialized into redb's `&[u8]` value
//! columns. Every write takes a fresh store-wide resource version, and
//! `update`/`update_status` fail with [`StateError::Conflict`] when the
//! caller's copy is stale. Label entries are kept in a secondary index in
//! the same write transaction as the object itself.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::meta::{Object, ObjectMeta, ObjectRef, epoch_secs};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const GENERATED_SUFFIX_LEN: usize = 5;
const GENERATE_NAME_ATTEMPTS: usize = 8;

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            NAMESPACES,
            TARGETS,
            DEPLOYMENTS,
            INSTANCES,
            REGISTRATIONS,
            SCHEDULINGS,
            LABEL_INDEX,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Get an object, failing with `NotFound` if it does not exist.
    pub fn get<T: Object>(&self, key: &ObjectRef) -> StateResult<T> {
        self.try_get(key)?.ok_or_else(|| StateError::NotFound {
            kind: T::KIND,
            key: key.to_string(),
        })
    }

    /// Get an object if it exists.
    pub fn try_get<T: Object>(&self, key: &ObjectRef) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(T::TABLE).map_err(map_err!(Table))?;
        let found = match table.get(key.table_key().as_str()).map_err(map_err!(Read))? {
            Some(guard) => Some(decode::<T>(guard.value())?),
            None => None,
        };
        Ok(found)
    }

    /// List objects of a kind, optionally restricted to one namespace.
    ///
    /// Results are ordered by `{namespace}/{name}`.
    pub fn list<T: Object>(&self, namespace: Option<&str>) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(T::TABLE).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        match namespace {
            Some(ns) => {
                let prefix = format!("{ns}/");
                for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
                    let (key, value) = entry.map_err(map_err!(Read))?;
                    if !key.value().starts_with(&prefix) {
                        break;
                    }
                    results.push(decode::<T>(value.value())?);
                }
            }
            None => {
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    results.push(decode::<T>(value.value())?);
                }
            }
        }
        Ok(results)
    }

    /// List objects of a kind carrying `label=value`, via the label index.
    pub fn list_by_label<T: Object>(&self, label: &str, value: &str) -> StateResult<Vec<T>> {
        let prefix = index_prefix(T::KIND, label, value);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(LABEL_INDEX).map_err(map_err!(Table))?;
        let table = txn.open_table(T::TABLE).map_err(map_err!(Table))?;

        let mut results = Vec::new();
        for entry in index.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            let Some(object_key) = key.value().strip_prefix(prefix.as_str()) else {
                break;
            };
            if let Some(guard) = table.get(object_key).map_err(map_err!(Read))? {
                results.push(decode::<T>(guard.value())?);
            }
        }
        Ok(results)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Create a new object.
    ///
    /// An empty `name` with a non-empty `generate_name` gets a random
    /// suffix appended. Generation starts at 1.
    pub fn create<T: Object>(&self, obj: &T) -> StateResult<T> {
        let mut obj = obj.clone();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;

        if obj.meta().name.is_empty() {
            let name = generate_name::<T>(&txn, obj.meta())?;
            obj.meta_mut().name = name;
        }
        let key = obj.key();
        let table_key = key.table_key();
        if load::<T>(&txn, &table_key)?.is_some() {
            return Err(StateError::AlreadyExists {
                kind: T::KIND,
                key: key.to_string(),
            });
        }

        let version = next_version(&txn)?;
        let meta = obj.meta_mut();
        meta.resource_version = version;
        meta.generation = 1;
        meta.creation_timestamp = epoch_secs();
        meta.deletion_timestamp = None;

        persist(&txn, &table_key, None, Some(&obj))?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND, %key, version, "object created");
        Ok(obj)
    }

    /// Replace metadata and spec, keeping the stored status.
    ///
    /// Generation moves only when the spec changed. An object that is
    /// deleting and has no finalizers left is removed.
    pub fn update<T: Object>(&self, obj: &T) -> StateResult<T> {
        let key = obj.key();
        let table_key = key.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let current = load_current::<T>(&txn, &key, obj.meta().resource_version)?;

        let mut next = obj.clone();
        *next.status_mut() = current.status().clone();
        let version = next_version(&txn)?;
        {
            let stored = current.meta();
            let meta = next.meta_mut();
            meta.resource_version = version;
            meta.creation_timestamp = stored.creation_timestamp;
            meta.deletion_timestamp = stored.deletion_timestamp;
            meta.generation = if current.spec() != obj.spec() {
                stored.generation + 1
            } else {
                stored.generation
            };
        }

        let purge = next.meta().is_deleting() && next.meta().finalizers.is_empty();
        let written = if purge { None } else { Some(&next) };
        persist(&txn, &table_key, Some(current.meta()), written)?;
        txn.commit().map_err(map_err!(Transaction))?;
        if purge {
            debug!(kind = T::KIND, %key, "last finalizer removed, object purged");
        } else {
            debug!(kind = T::KIND, %key, version, "object updated");
        }
        Ok(next)
    }

    /// Replace only the status of an object.
    pub fn update_status<T: Object>(&self, obj: &T) -> StateResult<T> {
        let key = obj.key();
        let table_key = key.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut next = load_current::<T>(&txn, &key, obj.meta().resource_version)?;

        *next.status_mut() = obj.status().clone();
        let version = next_version(&txn)?;
        next.meta_mut().resource_version = version;

        let previous = next.meta().clone();
        persist(&txn, &table_key, Some(&previous), Some(&next))?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND, %key, version, "status updated");
        Ok(next)
    }

    /// Delete an object.
    ///
    /// Objects with finalizers are only marked with a deletion timestamp;
    /// they disappear once the last finalizer is removed by `update`.
    pub fn delete<T: Object>(&self, key: &ObjectRef) -> StateResult<()> {
        let table_key = key.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let Some(mut current) = load::<T>(&txn, &table_key)? else {
            return Err(StateError::NotFound {
                kind: T::KIND,
                key: key.to_string(),
            });
        };

        if current.meta().finalizers.is_empty() {
            persist::<T>(&txn, &table_key, Some(current.meta()), None)?;
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(kind = T::KIND, %key, "object deleted");
            return Ok(());
        }

        if current.meta().is_deleting() {
            return Ok(());
        }
        let version = next_version(&txn)?;
        let meta = current.meta_mut();
        meta.deletion_timestamp = Some(epoch_secs());
        meta.resource_version = version;
        let previous = current.meta().clone();
        persist(&txn, &table_key, Some(&previous), Some(&current))?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = T::KIND, %key, "object marked for deletion");
        Ok(())
    }
}

// ── Transaction helpers ────────────────────────────────────────────

fn decode<T: Object>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn load<T: Object>(txn: &WriteTransaction, table_key: &str) -> StateResult<Option<T>> {
    let table = txn.open_table(T::TABLE).map_err(map_err!(Table))?;
    let found = match table.get(table_key).map_err(map_err!(Read))? {
        Some(guard) => Some(decode::<T>(guard.value())?),
        None => None,
    };
    Ok(found)
}

/// Load the stored copy and check the caller's resource version against it.
fn load_current<T: Object>(
    txn: &WriteTransaction,
    key: &ObjectRef,
    expected: u64,
) -> StateResult<T> {
    let current = load::<T>(txn, &key.table_key())?.ok_or_else(|| StateError::NotFound {
        kind: T::KIND,
        key: key.to_string(),
    })?;
    let actual = current.meta().resource_version;
    if actual != expected {
        return Err(StateError::Conflict {
            kind: T::KIND,
            key: key.to_string(),
            expected,
            actual,
        });
    }
    Ok(current)
}

fn next_version(txn: &WriteTransaction) -> StateResult<u64> {
    let mut table = txn.open_table(META).map_err(map_err!(Table))?;
    let current = table
        .get(RESOURCE_VERSION_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    table
        .insert(RESOURCE_VERSION_KEY, next)
        .map_err(map_err!(Write))?;
    Ok(next)
}

fn generate_name<T: Object>(txn: &WriteTransaction, meta: &ObjectMeta) -> StateResult<String> {
    if meta.generate_name.is_empty() {
        return Err(StateError::Invalid {
            kind: T::KIND,
            key: format!("{}/", meta.namespace),
            reason: "name or generateName is required".to_string(),
        });
    }
    for _ in 0..GENERATE_NAME_ATTEMPTS {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}{}", meta.generate_name, &suffix[..GENERATED_SUFFIX_LEN]);
        let candidate = ObjectRef::new(meta.namespace.clone(), name.clone()).table_key();
        if load::<T>(txn, &candidate)?.is_none() {
            return Ok(name);
        }
    }
    Err(StateError::AlreadyExists {
        kind: T::KIND,
        key: format!("{}/{}*", meta.namespace, meta.generate_name),
    })
}

fn index_prefix(kind: &str, label: &str, value: &str) -> String {
    format!("{kind}\0{label}\0{value}\0")
}

/// Write or remove an object and move its label index entries.
fn persist<T: Object>(
    txn: &WriteTransaction,
    table_key: &str,
    previous: Option<&ObjectMeta>,
    next: Option<&T>,
) -> StateResult<()> {
    {
        let mut table = txn.open_table(T::TABLE).map_err(map_err!(Table))?;
        match next {
            Some(obj) => {
                let value = serde_json::to_vec(obj).map_err(map_err!(Serialize))?;
                table
                    .insert(table_key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            None => {
                table.remove(table_key).map_err(map_err!(Write))?;
            }
        }
    }

    let mut index = txn.open_table(LABEL_INDEX).map_err(map_err!(Table))?;
    if let Some(meta) = previous {
        for (label, value) in &meta.labels {
            let entry = format!("{}{table_key}", index_prefix(T::KIND, label, value));
            index.remove(entry.as_str()).map_err(map_err!(Write))?;
        }
    }
    if let Some(obj) = next {
        for (label, value) in &obj.meta().labels {
            let entry = format!("{}{table_key}", index_prefix(T::KIND, label, value));
            index
                .insert(entry.as_str(), b"".as_slice())
                .map_err(map_err!(Write))?;
        }
    }
    Ok(())
}
