//! Admitted writes.
//!
//! User-authored objects reach the store through [`AdmittedStore`], which
//! runs admission before every create or update. Controller-owned metadata
//! on the stored copy (finalizers, owner references and `tenantgrid.io/`
//! labels) survives an update that does not mention it.

use tracing::info;

use tenantgrid_state::{Object, ObjectMeta, RawTargetScheduling, StateStore, TargetScheduling};

use crate::admit::{Admit, admit_create, admit_target_scheduling, admit_update};
use crate::error::WriteResult;

const MANAGED_LABEL_PREFIX: &str = "tenantgrid.io/";

/// What an apply did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
}

#[derive(Clone)]
pub struct AdmittedStore {
    store: StateStore,
}

impl AdmittedStore {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Default, validate and create.
    pub fn create<T: Admit>(&self, mut obj: T) -> WriteResult<T> {
        admit_create(&mut obj)?;
        let created = self.store.create(&obj)?;
        info!(kind = T::KIND, key = %created.key(), "object created");
        Ok(created)
    }

    /// Default, validate against the stored copy, and replace it.
    ///
    /// The write is made at the stored copy's resource version when `obj`
    /// carries none.
    pub fn update<T: Admit>(&self, mut obj: T) -> WriteResult<T> {
        let old: T = self.store.get(&obj.key())?;
        carry_managed_metadata(obj.meta_mut(), old.meta());
        admit_update(&mut obj, &old)?;
        let updated = self.store.update(&obj)?;
        info!(kind = T::KIND, key = %updated.key(), "object updated");
        Ok(updated)
    }

    /// Create the object, or update it when one with the same key exists.
    pub fn apply<T: Admit>(&self, obj: T) -> WriteResult<(T, Applied)> {
        if !obj.meta().name.is_empty() && self.store.try_get::<T>(&obj.key())?.is_some() {
            return Ok((self.update(obj)?, Applied::Updated));
        }
        Ok((self.create(obj)?, Applied::Created))
    }

    /// Admit a scheduling document and store its validated form.
    pub fn apply_target_scheduling(
        &self,
        doc: &RawTargetScheduling,
    ) -> WriteResult<(TargetScheduling, Applied)> {
        let mut scheduling = admit_target_scheduling(doc)?;
        let key = scheduling.key();
        match self.store.try_get::<TargetScheduling>(&key)? {
            Some(old) => {
                carry_managed_metadata(&mut scheduling.metadata, &old.metadata);
                let updated = self.store.update(&scheduling)?;
                info!(%key, rules = updated.spec.rules.len(), "target scheduling updated");
                Ok((updated, Applied::Updated))
            }
            None => {
                let created = self.store.create(&scheduling)?;
                info!(%key, rules = created.spec.rules.len(), "target scheduling created");
                Ok((created, Applied::Created))
            }
        }
    }
}

fn carry_managed_metadata(next: &mut ObjectMeta, stored: &ObjectMeta) {
    if next.resource_version == 0 {
        next.resource_version = stored.resource_version;
    }
    next.finalizers = stored.finalizers.clone();
    next.owner_references = stored.owner_references.clone();
    for (key, value) in &stored.labels {
        if key.starts_with(MANAGED_LABEL_PREFIX) {
            next.labels.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
