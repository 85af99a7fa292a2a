//! Periodic resync driver.
//!
//! Every tick lists each kind and hands every key to its reconciler, one
//! at a time, so a key is never worked on twice concurrently. Failures
//! are logged and picked up again on the next tick. Status-up only runs
//! for deployments whose status, or whose instance's status, differs from
//! what the previous tick saw. Targets come last, once instance deletions
//! have given their slots back, and publish their remaining capacity.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use tenantgrid_lifecycle::{
    DeploymentController, InstanceController, LifecycleConfig, TargetController,
};
use tenantgrid_state::{
    Deployment, DeploymentStatus, Instance, InstanceStatus, ObjectRef, Registration, StateResult,
    StateStore, Target,
};
use tenantgrid_sync::{RegistrationController, StatusSync};

/// Counters for one pass over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reconciled: usize,
    pub failed: usize,
    pub status_synced: usize,
}

/// What status-up reads for one deployment.
#[derive(Debug, Clone, PartialEq)]
struct ObservedStatus {
    deployment: DeploymentStatus,
    instance: Option<InstanceStatus>,
}

pub struct Driver {
    store: StateStore,
    registrations: RegistrationController,
    deployments: DeploymentController,
    instances: InstanceController,
    targets: TargetController,
    status: StatusSync,
    /// Deployment and instance statuses as of the previous tick.
    seen: HashMap<ObjectRef, ObservedStatus>,
}

impl Driver {
    pub fn new(store: StateStore, config: LifecycleConfig) -> Self {
        Self {
            registrations: RegistrationController::new(store.clone()),
            deployments: DeploymentController::new(store.clone(), config.clone()),
            instances: InstanceController::new(store.clone(), config.clone()),
            targets: TargetController::new(store.clone(), config),
            status: StatusSync::new(store.clone()),
            store,
            seen: HashMap::new(),
        }
    }

    /// Run one resync pass.
    pub fn tick(&mut self) -> StateResult<TickReport> {
        let mut report = TickReport::default();

        for registration in self.store.list::<Registration>(None)? {
            let key = registration.metadata.key();
            match self.registrations.reconcile(&key) {
                Ok(outcome) => {
                    debug!(registration = %key, ?outcome, "registration reconciled");
                    report.reconciled += 1;
                }
                Err(e) => {
                    debug!(registration = %key, error = %e, "registration retry next tick");
                    report.failed += 1;
                }
            }
        }

        for deployment in self.store.list::<Deployment>(None)? {
            let key = deployment.metadata.key();
            match self.deployments.reconcile(&key) {
                Ok(outcome) => {
                    debug!(deployment = %key, ?outcome, "deployment reconciled");
                    report.reconciled += 1;
                }
                Err(e) => {
                    debug!(deployment = %key, error = %e, "deployment retry next tick");
                    report.failed += 1;
                }
            }
        }

        self.sync_changed_statuses(&mut report)?;

        for instance in self.store.list::<Instance>(None)? {
            let key = instance.metadata.key();
            match self.instances.reconcile(&key) {
                Ok(outcome) => {
                    debug!(instance = %key, ?outcome, "instance reconciled");
                    report.reconciled += 1;
                }
                Err(e) => {
                    debug!(instance = %key, error = %e, "instance retry next tick");
                    report.failed += 1;
                }
            }
        }

        for target in self.store.list::<Target>(None)? {
            let key = target.metadata.key();
            match self.targets.reconcile(&key) {
                Ok(_) => report.reconciled += 1,
                Err(e) => {
                    debug!(target = %key, error = %e, "target retry next tick");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn sync_changed_statuses(&mut self, report: &mut TickReport) -> StateResult<()> {
        let mut current = HashMap::new();
        for deployment in self.store.list::<Deployment>(None)? {
            let key = deployment.metadata.key();
            let instance = match &deployment.status.instance_ref {
                Some(instance_ref) => self
                    .store
                    .try_get::<Instance>(instance_ref)?
                    .map(|i| i.status),
                None => None,
            };
            let observed = ObservedStatus {
                deployment: deployment.status,
                instance,
            };
            if self.seen.get(&key) != Some(&observed) {
                match self.status.sync(&key) {
                    Ok(true) => report.status_synced += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(deployment = %key, error = %e, "status sync failed");
                        report.failed += 1;
                        // Forget it so the next tick tries again.
                        continue;
                    }
                }
            }
            current.insert(key, observed);
        }
        self.seen = current;
        Ok(())
    }

    /// Tick every `interval` until `shutdown` fires.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "resync driver started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick() {
                        Ok(report) => debug!(
                            reconciled = report.reconciled,
                            failed = report.failed,
                            status_synced = report.status_synced,
                            "resync pass complete"
                        ),
                        Err(e) => error!(error = %e, "resync pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("resync driver shutting down");
                    break;
                }
            }
        }
    }
}
