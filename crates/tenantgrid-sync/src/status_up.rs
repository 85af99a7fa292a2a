//! Status-up: Deployment/Instance → Registration.
//!
//! Invoked when a deployment's status changed. Copies what the tenant cares
//! about (the last error and the generated user credentials) back onto the
//! originating registration.

use tracing::{debug, warn};

use tenantgrid_state::{Deployment, Instance, ObjectRef, REGISTRATION_LABEL, Registration, StateStore};

use crate::error::{SyncError, SyncResult};

#[derive(Clone)]
pub struct StatusSync {
    store: StateStore,
}

impl StatusSync {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Push the status of the deployment at `key` up to its registration.
    ///
    /// Returns whether the registration status was written.
    pub fn sync(&self, key: &ObjectRef) -> SyncResult<bool> {
        let Some(deployment) = self
            .store
            .try_get::<Deployment>(key)
            .map_err(SyncError::state("SyncStatus", "GetDeployment"))?
        else {
            return Ok(false);
        };

        let Some(instance_ref) = &deployment.status.instance_ref else {
            debug!(deployment = %key, "no instance yet, nothing to report");
            return Ok(false);
        };
        let Some(instance) = self
            .store
            .try_get::<Instance>(instance_ref)
            .map_err(SyncError::state("SyncStatus", "GetInstance"))?
        else {
            debug!(deployment = %key, instance = %instance_ref, "instance gone");
            return Ok(false);
        };

        let Some(label) = deployment.metadata.label(REGISTRATION_LABEL) else {
            warn!(
                deployment = %key,
                label = REGISTRATION_LABEL,
                "deployment has no registration label, skipping status sync"
            );
            return Ok(false);
        };
        let registration_ref: ObjectRef =
            label.parse().map_err(|_| SyncError::MalformedLabel {
                deployment: key.to_string(),
                label: REGISTRATION_LABEL,
                value: label.to_string(),
            })?;

        let Some(registration) = self
            .store
            .try_get::<Registration>(&registration_ref)
            .map_err(SyncError::state("SyncStatus", "GetRegistration"))?
        else {
            debug!(deployment = %key, registration = %registration_ref, "registration gone");
            return Ok(false);
        };

        let mut next = registration.clone();
        next.status.last_error = instance
            .status
            .last_error
            .clone()
            .or_else(|| deployment.status.last_error.clone());
        next.status.user_kubeconfig = instance.status.user_kubeconfig.clone();
        if next.status == registration.status {
            debug!(registration = %registration_ref, "registration status up to date");
            return Ok(false);
        }

        self.store
            .update_status(&next)
            .map_err(SyncError::state("SyncStatus", "UpdateRegistration"))?;
        debug!(registration = %registration_ref, deployment = %key, "registration status updated");
        Ok(true)
    }
}
