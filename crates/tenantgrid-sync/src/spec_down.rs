//! Spec-down: Registration → Namespace + Deployment.
//!
//! A registration lives in the tenant's namespace and carries everything a
//! deployment needs except the tenant id, which is the namespace name. The
//! controller keeps one correlated deployment per registration and stamps
//! it with [`REGISTRATION_LABEL`] so the status-up path can find its way
//! back.

use tracing::{debug, info, warn};

use tenantgrid_state::{
    Deployment, ErrorRecord, FINALIZER, Namespace, ObjectMeta, ObjectRef, REGISTRATION_LABEL,
    Registration, StateStore, epoch_secs,
};

use crate::error::{SyncError, SyncResult};

/// Result of a single registration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotFound,
    FinalizerAdded,
    /// The current generation was already observed; nothing written.
    UpToDate,
    /// Namespace and deployment were reconciled and the generation recorded.
    Synced,
    /// The previous deployment is still going away.
    Waiting,
    DeleteIssued,
    Gone,
}

#[derive(Clone)]
pub struct RegistrationController {
    store: StateStore,
}

impl RegistrationController {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn reconcile(&self, key: &ObjectRef) -> SyncResult<Outcome> {
        let Some(mut registration) = self
            .store
            .try_get::<Registration>(key)
            .map_err(SyncError::state("Reconcile", "GetRegistration"))?
        else {
            debug!(registration = %key, "registration not found");
            return Ok(Outcome::NotFound);
        };

        if registration.metadata.is_deleting() {
            let result = self.retire(&registration);
            if let Err(err) = &result {
                self.record_error(key, err);
            }
            return result;
        }

        if !registration.metadata.has_finalizer(FINALIZER) {
            registration.metadata.add_finalizer(FINALIZER);
            self.store
                .update(&registration)
                .map_err(SyncError::state("Reconcile", "AddFinalizer"))?;
            info!(registration = %key, "finalizer added");
            return Ok(Outcome::FinalizerAdded);
        }

        if registration.status.observed_generation == registration.metadata.generation {
            debug!(
                registration = %key,
                generation = registration.metadata.generation,
                "generation already observed"
            );
            return Ok(Outcome::UpToDate);
        }

        let result = self.sync(&registration);
        if let Err(err) = &result {
            self.record_error(key, err);
        }
        result
    }

    fn sync(&self, registration: &Registration) -> SyncResult<Outcome> {
        let key = registration.metadata.key();
        self.ensure_namespace(&key.namespace)?;

        let Some(deployment_ref) = self.ensure_deployment(registration)? else {
            return Ok(Outcome::Waiting);
        };

        let mut next = registration.clone();
        next.status.observed_generation = registration.metadata.generation;
        next.status.deployment_ref = Some(deployment_ref);
        next.status.last_error = None;
        self.store
            .update_status(&next)
            .map_err(SyncError::state("Reconcile", "UpdateStatus"))?;
        info!(
            registration = %key,
            generation = registration.metadata.generation,
            "registration synced"
        );
        Ok(Outcome::Synced)
    }

    fn ensure_namespace(&self, name: &str) -> SyncResult<()> {
        match self.store.create(&Namespace::new(name)) {
            Ok(_) => {
                info!(namespace = name, "namespace created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(SyncError::state("Reconcile", "CreateNamespace")(e)),
        }
    }

    /// Create or update the correlated deployment. `None` means the old
    /// deployment is still being deleted.
    fn ensure_deployment(&self, registration: &Registration) -> SyncResult<Option<ObjectRef>> {
        let key = registration.metadata.key();
        let spec = registration.spec.to_deployment_spec(&key.namespace);
        let correlation = key.to_string();

        let existing = self
            .store
            .try_get::<Deployment>(&key)
            .map_err(SyncError::state("Reconcile", "GetDeployment"))?;

        match existing {
            None => {
                let mut metadata = ObjectMeta::new(&key.namespace, &key.name);
                metadata
                    .labels
                    .insert(REGISTRATION_LABEL.to_string(), correlation);
                let created = self
                    .store
                    .create(&Deployment {
                        metadata,
                        spec,
                        status: Default::default(),
                    })
                    .map_err(SyncError::state("Reconcile", "CreateDeployment"))?;
                info!(registration = %key, deployment = %created.metadata.key(), "deployment created");
                Ok(Some(created.metadata.key()))
            }
            Some(deployment) if deployment.metadata.is_deleting() => {
                debug!(registration = %key, "previous deployment still deleting");
                Ok(None)
            }
            Some(deployment) => {
                let labelled = deployment
                    .metadata
                    .has_label_with_value(REGISTRATION_LABEL, &correlation);
                if deployment.spec == spec && labelled {
                    return Ok(Some(deployment.metadata.key()));
                }
                let mut next = deployment.clone();
                next.spec = spec;
                next.metadata
                    .labels
                    .insert(REGISTRATION_LABEL.to_string(), correlation);
                let updated = self
                    .store
                    .update(&next)
                    .map_err(SyncError::state("Reconcile", "UpdateDeployment"))?;
                info!(registration = %key, deployment = %updated.metadata.key(), "deployment updated");
                Ok(Some(updated.metadata.key()))
            }
        }
    }

    fn retire(&self, registration: &Registration) -> SyncResult<Outcome> {
        let key = registration.metadata.key();
        let deployments = self
            .store
            .list_by_label::<Deployment>(REGISTRATION_LABEL, &key.to_string())
            .map_err(SyncError::state("Delete", "ListDeployments"))?;

        if !deployments.is_empty() {
            let mut issued = false;
            for deployment in deployments.iter().filter(|d| !d.metadata.is_deleting()) {
                let deployment_key = deployment.metadata.key();
                match self.store.delete::<Deployment>(&deployment_key) {
                    Ok(()) => {
                        info!(registration = %key, deployment = %deployment_key, "deployment delete issued");
                        issued = true;
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(SyncError::state("Delete", "DeleteDeployment")(e)),
                }
            }
            if issued {
                return Ok(Outcome::DeleteIssued);
            }
            debug!(registration = %key, remaining = deployments.len(), "waiting for deployments");
            return Ok(Outcome::Waiting);
        }

        if !registration.metadata.has_finalizer(FINALIZER) {
            return Ok(Outcome::Waiting);
        }
        let mut current = registration.clone();
        current.metadata.remove_finalizer(FINALIZER);
        self.store
            .update(&current)
            .map_err(SyncError::state("Delete", "RemoveFinalizer"))?;
        info!(registration = %key, "finalizer removed");
        Ok(Outcome::Gone)
    }

    fn record_error(&self, key: &ObjectRef, err: &SyncError) {
        warn!(
            registration = %key,
            operation = err.operation(),
            reason = err.reason(),
            error = %err,
            "registration reconcile failed"
        );
        let Ok(Some(mut current)) = self.store.try_get::<Registration>(key) else {
            return;
        };
        current.status.last_error = Some(ErrorRecord::next(
            current.status.last_error.as_ref(),
            err.operation(),
            err.reason(),
            &err.to_string(),
            epoch_secs(),
        ));
        if let Err(e) = self.store.update_status(&current) {
            warn!(registration = %key, error = %e, "unable to record error on status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tenantgrid_state::{Configuration, RegistrationSpec};

    fn test_registration(tenant: &str, name: &str) -> Registration {
        Registration {
            metadata: ObjectMeta::new(tenant, name),
            spec: RegistrationSpec {
                purpose: "development".into(),
                region: Some("eu-west".into()),
                target_labels: BTreeMap::from([("hardware".into(), "gpu".into())]),
                configuration: Configuration {
                    deployers: vec!["helm".into()],
                },
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    fn setup() -> (StateStore, RegistrationController, ObjectRef) {
        let store = StateStore::open_in_memory().unwrap();
        let key = store
            .create(&test_registration("tenant01", "dev"))
            .unwrap()
            .metadata
            .key();
        (store.clone(), RegistrationController::new(store), key)
    }

    fn synced(controller: &RegistrationController, key: &ObjectRef) {
        assert_eq!(controller.reconcile(key).unwrap(), Outcome::FinalizerAdded);
        assert_eq!(controller.reconcile(key).unwrap(), Outcome::Synced);
    }

    #[test]
    fn creates_namespace_and_correlated_deployment() {
        let (store, controller, key) = setup();
        synced(&controller, &key);

        assert!(store.try_get::<Namespace>(&ObjectRef::cluster("tenant01")).unwrap().is_some());

        let dep: Deployment = store.get(&key).unwrap();
        assert_eq!(dep.spec.tenant_id, "tenant01");
        assert_eq!(dep.spec.purpose, "development");
        assert_eq!(dep.spec.region.as_deref(), Some("eu-west"));
        assert_eq!(dep.spec.target_labels["hardware"], "gpu");
        assert_eq!(dep.metadata.label(REGISTRATION_LABEL), Some("tenant01/dev"));

        let reg: Registration = store.get(&key).unwrap();
        assert_eq!(reg.status.observed_generation, reg.metadata.generation);
        assert_eq!(reg.status.deployment_ref, Some(key.clone()));
    }

    #[test]
    fn observed_generation_short_circuits() {
        let (store, controller, key) = setup();
        synced(&controller, &key);
        let reg_version = store.get::<Registration>(&key).unwrap().metadata.resource_version;
        let dep_version = store.get::<Deployment>(&key).unwrap().metadata.resource_version;

        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::UpToDate);

        assert_eq!(
            store.get::<Registration>(&key).unwrap().metadata.resource_version,
            reg_version
        );
        assert_eq!(
            store.get::<Deployment>(&key).unwrap().metadata.resource_version,
            dep_version
        );
    }

    #[test]
    fn spec_edit_updates_deployment() {
        let (store, controller, key) = setup();
        synced(&controller, &key);

        let mut reg: Registration = store.get(&key).unwrap();
        reg.spec.purpose = "production".into();
        store.update(&reg).unwrap();

        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Synced);
        let dep: Deployment = store.get(&key).unwrap();
        assert_eq!(dep.spec.purpose, "production");
        let reg: Registration = store.get(&key).unwrap();
        assert_eq!(reg.status.observed_generation, 2);
    }

    #[test]
    fn existing_namespace_is_fine() {
        let (store, controller, key) = setup();
        store.create(&Namespace::new("tenant01")).unwrap();
        synced(&controller, &key);
    }

    #[test]
    fn unlabelled_deployment_is_adopted() {
        let (store, controller, key) = setup();
        store
            .create(&Deployment {
                metadata: ObjectMeta::new("tenant01", "dev"),
                spec: test_registration("tenant01", "dev")
                    .spec
                    .to_deployment_spec("tenant01"),
                status: Default::default(),
            })
            .unwrap();

        synced(&controller, &key);
        let dep: Deployment = store.get(&key).unwrap();
        assert_eq!(dep.metadata.label(REGISTRATION_LABEL), Some("tenant01/dev"));
    }

    #[test]
    fn delete_removes_deployments_before_finalizer() {
        let (store, controller, key) = setup();
        synced(&controller, &key);

        // Hold the deployment like its own controller would.
        let mut dep: Deployment = store.get(&key).unwrap();
        dep.metadata.add_finalizer(FINALIZER);
        store.update(&dep).unwrap();

        store.delete::<Registration>(&key).unwrap();
        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::DeleteIssued);
        assert!(store.get::<Deployment>(&key).unwrap().metadata.is_deleting());

        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Waiting);
        assert!(store.try_get::<Registration>(&key).unwrap().is_some());

        let mut dep: Deployment = store.get(&key).unwrap();
        dep.metadata.remove_finalizer(FINALIZER);
        store.update(&dep).unwrap();

        assert_eq!(controller.reconcile(&key).unwrap(), Outcome::Gone);
        assert!(store.try_get::<Registration>(&key).unwrap().is_none());
    }

    #[test]
    fn missing_registration_is_not_found() {
        let (_, controller, _) = setup();
        let ghost = ObjectRef::new("tenant01", "ghost");
        assert_eq!(controller.reconcile(&ghost).unwrap(), Outcome::NotFound);
    }
}
