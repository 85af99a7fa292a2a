//! Instance controller.
//!
//! Keeps the finalizer on every live instance and, once the instance is
//! marked for deletion, gives its slot back to the target before letting
//! the store purge it.

use tracing::{debug, info, warn};

use tenantgrid_state::{ErrorRecord, FINALIZER, Instance, ObjectRef, StateStore, epoch_secs};

use crate::capacity::Capacity;
use crate::deployment::{LifecycleConfig, Outcome};
use crate::error::{Context, LifecycleError, LifecycleResult};

#[derive(Clone)]
pub struct InstanceController {
    store: StateStore,
    capacity: Capacity,
}

impl InstanceController {
    pub fn new(store: StateStore, config: LifecycleConfig) -> Self {
        Self {
            capacity: Capacity::new(store.clone(), config.conflict_retries),
            store,
        }
    }

    pub fn reconcile(&self, key: &ObjectRef) -> LifecycleResult<Outcome> {
        let Some(mut instance) = self
            .store
            .try_get::<Instance>(key)
            .context("Reconcile", "GetInstance")?
        else {
            debug!(instance = %key, "instance not found");
            return Ok(Outcome::NotFound);
        };

        if !instance.metadata.is_deleting() {
            if instance.metadata.has_finalizer(FINALIZER) {
                return Ok(Outcome::Converged);
            }
            instance.metadata.add_finalizer(FINALIZER);
            self.store
                .update(&instance)
                .context("Reconcile", "AddFinalizer")?;
            info!(instance = %key, "finalizer added");
            return Ok(Outcome::FinalizerAdded);
        }

        if !instance.metadata.has_finalizer(FINALIZER) {
            // Some other finalizer is still holding the object.
            return Ok(Outcome::Waiting);
        }

        let result = self.retire(instance);
        if let Err(err) = &result {
            self.record_error(key, err);
        }
        result
    }

    fn retire(&self, mut instance: Instance) -> LifecycleResult<Outcome> {
        let key = instance.metadata.key();
        self.capacity.release(&instance.spec.target_ref, &key)?;

        instance.metadata.remove_finalizer(FINALIZER);
        self.store
            .update(&instance)
            .context("Delete", "RemoveFinalizer")?;
        info!(instance = %key, target = %instance.spec.target_ref, "instance retired");
        Ok(Outcome::Gone)
    }

    fn record_error(&self, key: &ObjectRef, err: &LifecycleError) {
        warn!(
            instance = %key,
            operation = err.operation,
            reason = err.reason,
            error = %err,
            "instance reconcile failed"
        );
        let Ok(Some(mut current)) = self.store.try_get::<Instance>(key) else {
            return;
        };
        current.status.last_error = Some(ErrorRecord::next(
            current.status.last_error.as_ref(),
            err.operation,
            err.reason,
            &err.to_string(),
            epoch_secs(),
        ));
        if let Err(e) = self.store.update_status(&current) {
            warn!(instance = %key, error = %e, "unable to record error on status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantgrid_state::{InstanceSpec, ObjectMeta, Target, TargetSpec};

    fn setup() -> (StateStore, InstanceController, ObjectRef) {
        let store = StateStore::open_in_memory().unwrap();
        let target = Target {
            metadata: ObjectMeta::new("targets", "a"),
            spec: TargetSpec {
                priority: 10,
                visible: true,
                ..Default::default()
            },
            status: Default::default(),
        };
        store.create(&target).unwrap();

        let instance = Instance {
            metadata: ObjectMeta::new("tenant01", "dev-abcde"),
            spec: InstanceSpec {
                tenant_id: "tenant01".into(),
                id: "abcdefgh".into(),
                target_ref: ObjectRef::new("targets", "a"),
                ..Default::default()
            },
            status: Default::default(),
        };
        let key = store.create(&instance).unwrap().metadata.key();
        let controller = InstanceController::new(store.clone(), LifecycleConfig::default());
        (store, controller, key)
    }

    #[test]
    fn live_instance_gets_finalizer_once() {
        let (store, controller, key) = setup();
        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::FinalizerAdded);
        let version = store.get::<Instance>(&key).unwrap().metadata.resource_version;

        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Converged);
        let inst: Instance = store.get(&key).unwrap();
        assert!(inst.metadata.has_finalizer(FINALIZER));
        assert_eq!(inst.metadata.resource_version, version);
    }

    #[test]
    fn retire_releases_capacity_then_purges() {
        let (store, controller, key) = setup();
        controller.reconcile(&key).unwrap();
        let target_key = ObjectRef::new("targets", "a");
        let mut target: Target = store.get(&target_key).unwrap();
        target.status.assigned_instances.push(key.clone());
        store.update_status(&target).unwrap();

        store.delete::<Instance>(&key).unwrap();
        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Gone);

        assert!(store.try_get::<Instance>(&key).unwrap().is_none());
        assert_eq!(store.get::<Target>(&target_key).unwrap().assigned_count(), 0);
        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::NotFound);
    }

    #[test]
    fn retire_tolerates_missing_target() {
        let (store, controller, key) = setup();
        controller.reconcile(&key).unwrap();
        store.delete::<Target>(&ObjectRef::new("targets", "a")).unwrap();

        store.delete::<Instance>(&key).unwrap();
        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Gone);
    }

    #[test]
    fn foreign_finalizer_keeps_instance_waiting() {
        let (store, controller, key) = setup();
        let mut inst: Instance = store.get(&key).unwrap();
        inst.metadata.add_finalizer("example.com/other");
        store.update(&inst).unwrap();

        store.delete::<Instance>(&key).unwrap();
        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Waiting);
        assert!(store.get::<Instance>(&key).unwrap().metadata.is_deleting());
    }
}
