//! Registration pipeline tests.
//!
//! Drives a registration through spec-down, placement, status-up and
//! deletion with the real controllers over an in-memory store.

use tenantgrid_lifecycle::{DeploymentController, InstanceController, LifecycleConfig};
use tenantgrid_state::*;
use tenantgrid_sync::{RegistrationController, StatusSync};

struct Pipeline {
    store: StateStore,
    registrations: RegistrationController,
    deployments: DeploymentController,
    instances: InstanceController,
    status: StatusSync,
}

impl Pipeline {
    fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        Self {
            registrations: RegistrationController::new(store.clone()),
            deployments: DeploymentController::new(store.clone(), LifecycleConfig::default()),
            instances: InstanceController::new(store.clone(), LifecycleConfig::default()),
            status: StatusSync::new(store.clone()),
            store,
        }
    }

    /// One resync round over every kind, like the daemon does.
    fn tick(&self) {
        for reg in self.store.list::<Registration>(None).unwrap() {
            let _ = self.registrations.reconcile(&reg.metadata.key());
        }
        for dep in self.store.list::<Deployment>(None).unwrap() {
            let key = dep.metadata.key();
            let _ = self.deployments.reconcile(&key);
            let _ = self.status.sync(&key);
        }
        for inst in self.store.list::<Instance>(None).unwrap() {
            let _ = self.instances.reconcile(&inst.metadata.key());
        }
    }
}

fn make_target(name: &str, priority: i64) -> Target {
    Target {
        metadata: ObjectMeta::new("targets", name),
        spec: TargetSpec {
            priority,
            visible: true,
            ingress_domain: format!("{name}.example.com"),
            ..Default::default()
        },
        status: Default::default(),
    }
}

fn test_registration(tenant: &str) -> Registration {
    Registration {
        metadata: ObjectMeta::new(tenant, "dev"),
        spec: RegistrationSpec {
            purpose: "development".into(),
            ..Default::default()
        },
        status: Default::default(),
    }
}

#[test]
fn registration_to_instance_and_back() {
    let p = Pipeline::new();
    p.store.create(&make_target("a", 30)).unwrap();
    let key = p.store.create(&test_registration("tenant01")).unwrap().metadata.key();

    for _ in 0..4 {
        p.tick();
    }

    let dep: Deployment = p.store.get(&key).unwrap();
    let inst_ref = dep.status.instance_ref.clone().expect("instance scheduled");
    let mut inst: Instance = p.store.get(&inst_ref).unwrap();
    assert_eq!(inst.spec.tenant_id, "tenant01");
    assert_eq!(inst.spec.target_ref, ObjectRef::new("targets", "a"));

    // Credentials appear on the instance and flow up.
    inst.status.user_kubeconfig = "apiVersion: v1".into();
    p.store.update_status(&inst).unwrap();
    p.tick();

    let reg: Registration = p.store.get(&key).unwrap();
    assert_eq!(reg.status.user_kubeconfig, "apiVersion: v1");
    assert_eq!(reg.status.deployment_ref, Some(key.clone()));
}

#[test]
fn deleting_registration_tears_everything_down() {
    let p = Pipeline::new();
    p.store.create(&make_target("a", 30)).unwrap();
    let key = p.store.create(&test_registration("tenant01")).unwrap().metadata.key();
    for _ in 0..4 {
        p.tick();
    }
    let target = ObjectRef::new("targets", "a");
    assert_eq!(p.store.get::<Target>(&target).unwrap().assigned_count(), 1);

    p.store.delete::<Registration>(&key).unwrap();
    for _ in 0..6 {
        p.tick();
    }

    assert!(p.store.try_get::<Registration>(&key).unwrap().is_none());
    assert!(p.store.try_get::<Deployment>(&key).unwrap().is_none());
    assert!(p.store.list::<Instance>(Some("tenant01")).unwrap().is_empty());
    assert_eq!(p.store.get::<Target>(&target).unwrap().assigned_count(), 0);
}

#[test]
fn no_capacity_recovers_once_a_target_appears() {
    let p = Pipeline::new();
    let key = p.store.create(&test_registration("tenant01")).unwrap().metadata.key();
    for _ in 0..3 {
        p.tick();
    }

    let dep: Deployment = p.store.get(&key).unwrap();
    assert!(dep.status.instance_ref.is_none());
    assert_eq!(dep.status.last_error.unwrap().reason, "FindTarget");

    p.store.create(&make_target("late", 5)).unwrap();
    for _ in 0..2 {
        p.tick();
    }
    let dep: Deployment = p.store.get(&key).unwrap();
    assert!(dep.status.instance_ref.is_some());
    assert!(dep.status.last_error.is_none());
}
