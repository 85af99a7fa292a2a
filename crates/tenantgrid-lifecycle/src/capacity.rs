//! Capacity bookkeeping on targets.
//!
//! A target's `assignedInstances` list is the only load signal the scorer
//! sees. Several deployments may be placed on the same target at once, so
//! every change is a read-modify-write against the target's resource
//! version, retried on conflict with a fresh read.
//!
//! Each write also refreshes `status.capacity`, the free slots out of
//! [`NOMINAL_CAPACITY`].

use tracing::{debug, info};

use tenantgrid_state::{ObjectRef, StateStore, Target};

use crate::error::{Cause, Context, LifecycleError, LifecycleResult};

/// Instances a target is nominally sized for.
pub const NOMINAL_CAPACITY: i64 = 10;

/// Free slots left on `target`. Negative once it is overcommitted.
pub fn remaining(target: &Target) -> i64 {
    NOMINAL_CAPACITY - target.assigned_count() as i64
}

#[derive(Clone)]
pub struct Capacity {
    store: StateStore,
    retries: u32,
}

impl Capacity {
    pub fn new(store: StateStore, retries: u32) -> Self {
        Self { store, retries }
    }

    /// Record `instance` on `target` if it is not there yet.
    ///
    /// Returns whether a write happened.
    pub fn assign(&self, target: &ObjectRef, instance: &ObjectRef) -> LifecycleResult<bool> {
        for _ in 0..=self.retries {
            let mut current: Target = self
                .store
                .get(target)
                .context("Reconcile", "GetTarget")?;
            if current.is_assigned(instance) {
                debug!(%target, %instance, "instance already counted on target");
                return Ok(false);
            }
            current.status.assigned_instances.push(instance.clone());
            current.status.capacity = Some(remaining(&current));
            match self.store.update_status(&current) {
                Ok(_) => {
                    info!(
                        %target,
                        %instance,
                        assigned = current.assigned_count(),
                        "instance assigned to target"
                    );
                    return Ok(true);
                }
                Err(e) if e.is_conflict() => {
                    debug!(%target, "conflict assigning capacity, retrying");
                }
                Err(e) => return Err(LifecycleError::new("Reconcile", "AssignCapacity", e)),
            }
        }
        Err(self.contention("Reconcile", "AssignCapacity", target))
    }

    /// Remove `instance` from `target`. A missing target counts as released.
    ///
    /// Returns whether a write happened.
    pub fn release(&self, target: &ObjectRef, instance: &ObjectRef) -> LifecycleResult<bool> {
        for _ in 0..=self.retries {
            let Some(mut current) = self
                .store
                .try_get::<Target>(target)
                .context("Delete", "GetTarget")?
            else {
                debug!(%target, %instance, "target gone, nothing to release");
                return Ok(false);
            };
            if !current.is_assigned(instance) {
                return Ok(false);
            }
            current
                .status
                .assigned_instances
                .retain(|assigned| assigned != instance);
            current.status.capacity = Some(remaining(&current));
            match self.store.update_status(&current) {
                Ok(_) => {
                    info!(
                        %target,
                        %instance,
                        assigned = current.assigned_count(),
                        "instance released from target"
                    );
                    return Ok(true);
                }
                Err(e) if e.is_conflict() => {
                    debug!(%target, "conflict releasing capacity, retrying");
                }
                Err(e) if e.is_not_found() => return Ok(false),
                Err(e) => return Err(LifecycleError::new("Delete", "ReleaseCapacity", e)),
            }
        }
        Err(self.contention("Delete", "ReleaseCapacity", target))
    }

    /// Bring `status.capacity` in line with the assigned list.
    ///
    /// Returns whether a write happened.
    pub fn publish(&self, target: &ObjectRef) -> LifecycleResult<bool> {
        for _ in 0..=self.retries {
            let Some(mut current) = self
                .store
                .try_get::<Target>(target)
                .context("Reconcile", "GetTarget")?
            else {
                return Ok(false);
            };
            let free = remaining(&current);
            if current.status.capacity == Some(free) {
                return Ok(false);
            }
            current.status.capacity = Some(free);
            match self.store.update_status(&current) {
                Ok(_) => {
                    debug!(%target, capacity = free, "target capacity published");
                    return Ok(true);
                }
                Err(e) if e.is_conflict() => {
                    debug!(%target, "conflict publishing capacity, retrying");
                }
                Err(e) if e.is_not_found() => return Ok(false),
                Err(e) => return Err(LifecycleError::new("Reconcile", "UpdateCapacity", e)),
            }
        }
        Err(self.contention("Reconcile", "UpdateCapacity", target))
    }

    fn contention(
        &self,
        operation: &'static str,
        reason: &'static str,
        target: &ObjectRef,
    ) -> LifecycleError {
        LifecycleError::new(
            operation,
            reason,
            Cause::Contention {
                key: target.to_string(),
                attempts: self.retries + 1,
            },
        )
    }
}
