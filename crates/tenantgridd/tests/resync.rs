//! Resync driver tests.
//!
//! Full lifecycle through the driver: registration in, instance placed,
//! status reported, registration deleted, everything gone and capacity
//! returned.

use std::time::Duration;

use tokio::sync::watch;

use tenantgrid_lifecycle::{LifecycleConfig, NOMINAL_CAPACITY};
use tenantgrid_state::*;
use tenantgridd::{Config, Driver};

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

fn settle(driver: &mut Driver, ticks: usize) {
    for _ in 0..ticks {
        driver.tick().unwrap();
    }
}

#[test]
fn create_schedule_delete_gone() {
    let store = StateStore::open_in_memory().unwrap();
    store.create(&make_target("a", 30)).unwrap();
    store.create(&make_target("b", 20)).unwrap();
    let mut driver = Driver::new(store.clone(), LifecycleConfig::default());

    let first = store.create(&test_registration("tenant01")).unwrap().metadata.key();
    let second = store.create(&test_registration("tenant02")).unwrap().metadata.key();
    settle(&mut driver, 4);

    let placed = |key: &ObjectRef| {
        let dep: Deployment = store.get(key).unwrap();
        let inst: Instance = store.get(&dep.status.instance_ref.unwrap()).unwrap();
        inst.spec.target_ref.name
    };
    assert_eq!(placed(&first), "a");
    assert_eq!(placed(&second), "b");

    store.delete::<Registration>(&first).unwrap();
    store.delete::<Registration>(&second).unwrap();
    settle(&mut driver, 5);

    assert!(store.list::<Registration>(None).unwrap().is_empty());
    assert!(store.list::<Deployment>(None).unwrap().is_empty());
    assert!(store.list::<Instance>(None).unwrap().is_empty());
    for target in store.list::<Target>(None).unwrap() {
        assert_eq!(target.assigned_count(), 0, "{} still holds capacity", target.metadata.name);
    }
}

#[test]
fn targets_publish_remaining_capacity() {
    let store = StateStore::open_in_memory().unwrap();
    let target = store.create(&make_target("a", 30)).unwrap().metadata.key();
    let idle = store.create(&make_target("b", 0)).unwrap().metadata.key();
    let mut driver = Driver::new(store.clone(), LifecycleConfig::default());

    let first = store.create(&test_registration("tenant01")).unwrap().metadata.key();
    store.create(&test_registration("tenant02")).unwrap();
    settle(&mut driver, 4);

    let capacity = |key: &ObjectRef| store.get::<Target>(key).unwrap().status.capacity;
    assert_eq!(capacity(&target), Some(NOMINAL_CAPACITY - 2));
    assert_eq!(capacity(&idle), Some(NOMINAL_CAPACITY));

    store.delete::<Registration>(&first).unwrap();
    settle(&mut driver, 5);
    assert_eq!(capacity(&target), Some(NOMINAL_CAPACITY - 1));
}

#[test]
fn converged_store_is_quiet() {
    let store = StateStore::open_in_memory().unwrap();
    store.create(&make_target("a", 30)).unwrap();
    store.create(&test_registration("tenant01")).unwrap();
    let mut driver = Driver::new(store.clone(), LifecycleConfig::default());
    settle(&mut driver, 4);

    let versions = |store: &StateStore| {
        let mut v: Vec<u64> = Vec::new();
        v.extend(store.list::<Registration>(None).unwrap().iter().map(|o| o.metadata.resource_version));
        v.extend(store.list::<Deployment>(None).unwrap().iter().map(|o| o.metadata.resource_version));
        v.extend(store.list::<Instance>(None).unwrap().iter().map(|o| o.metadata.resource_version));
        v.extend(store.list::<Target>(None).unwrap().iter().map(|o| o.metadata.resource_version));
        v
    };
    let before = versions(&store);

    let report = driver.tick().unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.status_synced, 0);
    assert_eq!(versions(&store), before);
}

#[test]
fn status_changes_flow_up_once() {
    let store = StateStore::open_in_memory().unwrap();
    store.create(&make_target("a", 30)).unwrap();
    let key = store.create(&test_registration("tenant01")).unwrap().metadata.key();
    let mut driver = Driver::new(store.clone(), LifecycleConfig::default());
    settle(&mut driver, 4);

    let dep: Deployment = store.get(&key).unwrap();
    let mut inst: Instance = store.get(&dep.status.instance_ref.unwrap()).unwrap();
    inst.status.phase = "Succeeded".into();
    inst.status.user_kubeconfig = "apiVersion: v1".into();
    store.update_status(&inst).unwrap();

    // The phase lands on the deployment, which makes its status differ
    // from the previous tick and triggers status-up.
    let report = driver.tick().unwrap();
    assert_eq!(report.status_synced, 1);
    let reg: Registration = store.get(&key).unwrap();
    assert_eq!(reg.status.user_kubeconfig, "apiVersion: v1");

    assert_eq!(driver.tick().unwrap().status_synced, 0);
}

#[test]
fn instance_only_status_changes_flow_up() {
    let store = StateStore::open_in_memory().unwrap();
    store.create(&make_target("a", 30)).unwrap();
    let key = store.create(&test_registration("tenant01")).unwrap().metadata.key();
    let mut driver = Driver::new(store.clone(), LifecycleConfig::default());
    settle(&mut driver, 4);

    // Phase stays as it was, so the deployment status does not move.
    let dep: Deployment = store.get(&key).unwrap();
    let mut inst: Instance = store.get(&dep.status.instance_ref.unwrap()).unwrap();
    let error = ErrorRecord::next(None, "Provision", "Timeout", "timed out", 100);
    inst.status.user_kubeconfig = "apiVersion: v1".into();
    inst.status.last_error = Some(error.clone());
    store.update_status(&inst).unwrap();

    let report = driver.tick().unwrap();
    assert_eq!(report.status_synced, 1);
    let reg: Registration = store.get(&key).unwrap();
    assert_eq!(reg.status.user_kubeconfig, "apiVersion: v1");
    assert_eq!(reg.status.last_error, Some(error));

    let dep_after: Deployment = store.get(&key).unwrap();
    assert_eq!(dep_after.metadata.resource_version, dep.metadata.resource_version);
    assert_eq!(driver.tick().unwrap().status_synced, 0);
}

#[test]
fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let key = {
        let store = StateStore::open(&config.db_path()).unwrap();
        store.create(&make_target("a", 30)).unwrap();
        let key = store.create(&test_registration("tenant01")).unwrap().metadata.key();
        let mut driver = Driver::new(store, config.lifecycle());
        settle(&mut driver, 4);
        key
    };

    let store = StateStore::open(&config.db_path()).unwrap();
    let mut driver = Driver::new(store.clone(), config.lifecycle());
    let before: Deployment = store.get(&key).unwrap();
    settle(&mut driver, 2);

    let after: Deployment = store.get(&key).unwrap();
    assert!(after.status.instance_ref.is_some());
    assert_eq!(after.metadata.resource_version, before.metadata.resource_version);
    assert_eq!(store.list::<Instance>(Some("tenant01")).unwrap().len(), 1);
}

#[tokio::test]
async fn run_loop_converges_and_stops() {
    let store = StateStore::open_in_memory().unwrap();
    store.create(&make_target("a", 30)).unwrap();
    let key = store.create(&test_registration("tenant01")).unwrap().metadata.key();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut driver = Driver::new(store.clone(), LifecycleConfig::default());
    let handle = tokio::spawn(async move {
        driver.run(Duration::from_millis(10), shutdown_rx).await;
    });

    let mut converged = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let dep = store.try_get::<Deployment>(&key).unwrap();
        if dep.is_some_and(|d| d.status.instance_ref.is_some()) {
            converged = true;
            break;
        }
    }
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert!(converged);
}
