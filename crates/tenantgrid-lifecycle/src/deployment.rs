//! Deployment controller — owns the create/retire choreography between a
//! deployment and its single instance.
//!
//! ```text
//! NoFinalizer ──add finalizer──▶ Active ──deletion timestamp──▶ Deleting ──▶ Gone
//!                                  │ ▲                            │ ▲
//!                                  └─┘ create/sync instance,      └─┘ delete instance,
//!                                      assign capacity,               wait for it to vanish
//!                                      write status
//! ```
//!
//! Every step is safe to run again from scratch. The instance carries a
//! label naming its deployment, so a pass that crashed after creating the
//! instance but before recording it on the deployment finds it again
//! through the label index instead of creating a second one.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use tenantgrid_admission::Admit;
use tenantgrid_placement::find_target;
use tenantgrid_state::{
    DEPLOYMENT_LABEL, DataPlaneType, Deployment, ErrorRecord, FINALIZER, Instance, InstanceSpec,
    Object, ObjectMeta, ObjectRef, OwnerReference, SchedulingRule, StateStore, Target,
    TargetScheduling, epoch_secs,
};

use crate::capacity::Capacity;
use crate::error::{Context, LifecycleError, LifecycleResult};
use crate::ids::{IdGenerator, random_ids, unique_id};

/// Result of a single reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The object no longer exists; nothing to do.
    NotFound,
    /// The finalizer was attached; no other work happened in this pass.
    FinalizerAdded,
    /// Desired state is in place.
    Converged,
    /// Delete was issued for the dependent instance.
    DeleteIssued,
    /// A dependent is still going away; the next pass continues.
    Waiting,
    /// The finalizer was removed and the object is gone from the store.
    Gone,
}

/// Settings shared by the lifecycle controllers.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// TargetScheduling object holding the manual rules, if any.
    pub scheduling: Option<ObjectRef>,
    /// Extra attempts for capacity read-modify-write loops.
    pub conflict_retries: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            scheduling: None,
            conflict_retries: 5,
        }
    }
}

#[derive(Clone)]
pub struct DeploymentController {
    store: StateStore,
    capacity: Capacity,
    config: LifecycleConfig,
    ids: IdGenerator,
}

impl DeploymentController {
    pub fn new(store: StateStore, config: LifecycleConfig) -> Self {
        Self {
            capacity: Capacity::new(store.clone(), config.conflict_retries),
            store,
            config,
            ids: random_ids(),
        }
    }

    /// Replace the instance id source.
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Drive the deployment at `key` one step towards its desired state.
    ///
    /// Failures are also recorded on the deployment's `lastError`.
    pub fn reconcile(&self, key: &ObjectRef) -> LifecycleResult<Outcome> {
        let Some(mut deployment) = self
            .store
            .try_get::<Deployment>(key)
            .context("Reconcile", "GetDeployment")?
        else {
            debug!(deployment = %key, "deployment not found");
            return Ok(Outcome::NotFound);
        };

        if !deployment.metadata.is_deleting() && !deployment.metadata.has_finalizer(FINALIZER) {
            deployment.metadata.add_finalizer(FINALIZER);
            self.store
                .update(&deployment)
                .context("Reconcile", "AddFinalizer")?;
            info!(deployment = %key, "finalizer added");
            return Ok(Outcome::FinalizerAdded);
        }

        let result = if deployment.metadata.is_deleting() {
            self.retire(&deployment)
        } else {
            self.converge(&deployment)
        };
        if let Err(err) = &result {
            self.record_error(key, err);
        }
        result
    }

    // ── Active ─────────────────────────────────────────────────────

    fn converge(&self, deployment: &Deployment) -> LifecycleResult<Outcome> {
        let key = deployment.metadata.key();
        let mut desired = deployment.clone();
        desired.apply_defaults();

        let instance = match self.find_instance("Reconcile", deployment)? {
            Some(existing) if existing.metadata.is_deleting() => {
                debug!(
                    deployment = %key,
                    instance = %existing.metadata.key(),
                    "instance is being deleted, waiting"
                );
                return Ok(Outcome::Waiting);
            }
            Some(existing) => self.sync_instance(&desired, existing)?,
            None => self.create_instance(&desired)?,
        };
        let instance_key = instance.metadata.key();

        self.capacity.assign(&instance.spec.target_ref, &instance_key)?;

        let mut status = deployment.status.clone();
        status.instance_ref = Some(instance_key);
        status.phase = instance.status.phase.clone();
        status.data_plane_type = DataPlaneType::of(deployment.spec.data_plane.as_ref());
        status.observed_generation = deployment.metadata.generation;
        status.last_error = None;

        if status == deployment.status {
            debug!(deployment = %key, "deployment up to date");
            return Ok(Outcome::Converged);
        }
        let mut next = deployment.clone();
        next.status = status;
        self.store
            .update_status(&next)
            .context("Reconcile", "UpdateStatus")?;
        debug!(deployment = %key, "deployment status updated");
        Ok(Outcome::Converged)
    }

    /// Locate the deployment's instance by status reference, falling back
    /// to the correlation label.
    fn find_instance(
        &self,
        operation: &'static str,
        deployment: &Deployment,
    ) -> LifecycleResult<Option<Instance>> {
        if let Some(instance_ref) = &deployment.status.instance_ref {
            let found = self
                .store
                .try_get::<Instance>(instance_ref)
                .context(operation, "GetInstance")?;
            if found.is_some() {
                return Ok(found);
            }
        }

        let owner = deployment.metadata.key().to_string();
        let labelled = self
            .store
            .list_by_label::<Instance>(DEPLOYMENT_LABEL, &owner)
            .context(operation, "ListInstances")?;
        Ok(labelled.into_iter().next())
    }

    fn create_instance(&self, deployment: &Deployment) -> LifecycleResult<Instance> {
        let key = deployment.metadata.key();
        let rules = self.scheduling_rules()?;
        let targets = self
            .store
            .list::<Target>(None)
            .context("Reconcile", "ListTargets")?;
        let target = find_target(deployment, &rules, &targets).context("Reconcile", "FindTarget")?;

        let taken: HashSet<String> = self
            .store
            .list::<Instance>(Some(&key.namespace))
            .context("Reconcile", "ListInstances")?
            .into_iter()
            .map(|i| i.spec.id)
            .collect();
        let id = unique_id(&self.ids, &taken)?;

        let mut metadata = ObjectMeta {
            namespace: key.namespace.clone(),
            generate_name: format!("{}-", key.name),
            ..Default::default()
        };
        metadata
            .labels
            .insert(DEPLOYMENT_LABEL.to_string(), key.to_string());
        metadata.add_finalizer(FINALIZER);
        metadata.owner_references.push(OwnerReference {
            kind: Deployment::KIND.to_string(),
            name: key.name.clone(),
        });

        let instance = Instance {
            metadata,
            spec: InstanceSpec {
                tenant_id: deployment.spec.tenant_id.clone(),
                id,
                target_ref: target.metadata.key(),
                configuration: deployment.spec.configuration.clone(),
                high_availability: deployment.spec.high_availability.clone(),
                data_plane: deployment.spec.data_plane.clone(),
            },
            status: Default::default(),
        };
        let created = self
            .store
            .create(&instance)
            .context("Reconcile", "CreateInstance")?;
        info!(
            deployment = %key,
            instance = %created.metadata.key(),
            target = %created.spec.target_ref,
            id = %created.spec.id,
            "instance created"
        );
        Ok(created)
    }

    /// Carry later deployment edits into the instance. Target and ids stay.
    fn sync_instance(&self, deployment: &Deployment, existing: Instance) -> LifecycleResult<Instance> {
        let mut next = existing.clone();
        next.spec.configuration = deployment.spec.configuration.clone();
        next.spec.high_availability = deployment.spec.high_availability.clone();
        next.spec.data_plane = deployment.spec.data_plane.clone();
        if next.spec == existing.spec {
            return Ok(existing);
        }

        let updated = self
            .store
            .update(&next)
            .context("Reconcile", "UpdateInstance")?;
        info!(
            deployment = %deployment.metadata.key(),
            instance = %updated.metadata.key(),
            "instance spec updated"
        );
        Ok(updated)
    }

    fn scheduling_rules(&self) -> LifecycleResult<Vec<SchedulingRule>> {
        let Some(key) = &self.config.scheduling else {
            return Ok(Vec::new());
        };
        match self
            .store
            .try_get::<TargetScheduling>(key)
            .context("Reconcile", "GetScheduling")?
        {
            Some(scheduling) => Ok(scheduling.spec.rules),
            None => {
                debug!(scheduling = %key, "no scheduling object, using automatic placement");
                Ok(Vec::new())
            }
        }
    }

    // ── Deleting ───────────────────────────────────────────────────

    fn retire(&self, deployment: &Deployment) -> LifecycleResult<Outcome> {
        let key = deployment.metadata.key();

        if let Some(instance) = self.find_instance("Delete", deployment)? {
            let instance_key = instance.metadata.key();
            if instance.metadata.is_deleting() {
                debug!(deployment = %key, instance = %instance_key, "waiting for instance deletion");
                return Ok(Outcome::Waiting);
            }
            // Without our finalizer the instance vanishes immediately, so
            // its capacity has to go first.
            if !instance.metadata.has_finalizer(FINALIZER) {
                self.capacity
                    .release(&instance.spec.target_ref, &instance_key)?;
            }
            match self.store.delete::<Instance>(&instance_key) {
                Ok(()) => {
                    info!(deployment = %key, instance = %instance_key, "instance delete issued");
                    return Ok(Outcome::DeleteIssued);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(LifecycleError::new("Delete", "DeleteInstance", e)),
            }
        }

        let mut current = deployment.clone();
        if current.status.instance_ref.is_some() {
            current.status.instance_ref = None;
            current = self
                .store
                .update_status(&current)
                .context("Delete", "ClearInstanceRef")?;
        }
        current.metadata.remove_finalizer(FINALIZER);
        self.store
            .update(&current)
            .context("Delete", "RemoveFinalizer")?;
        info!(deployment = %key, "finalizer removed");
        Ok(Outcome::Gone)
    }

    fn record_error(&self, key: &ObjectRef, err: &LifecycleError) {
        warn!(
            deployment = %key,
            operation = err.operation,
            reason = err.reason,
            no_capacity = err.is_no_capacity(),
            error = %err,
            "reconcile failed"
        );
        let mut current = match self.store.try_get::<Deployment>(key) {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                warn!(deployment = %key, error = %e, "unable to load deployment to record error");
                return;
            }
        };
        let message = err.to_string();
        if let Some(previous) = &current.status.last_error {
            if previous.operation == err.operation
                && previous.reason == err.reason
                && previous.message == message
            {
                return;
            }
        }
        current.status.last_error = Some(ErrorRecord::next(
            current.status.last_error.as_ref(),
            err.operation,
            err.reason,
            &message,
            epoch_secs(),
        ));
        if let Err(e) = self.store.update_status(&current) {
            warn!(deployment = %key, error = %e, "unable to record error on status");
        }
    }
}
