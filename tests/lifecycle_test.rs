mod common;

use common::fake_runtime::FakeRuntime;
use dbaas_control_plane::config::Config;
use dbaas_control_plane::context::AppContext;
use dbaas_control_plane::lifecycle::{reconcile, LifecycleManager};
use dbaas_control_plane::model::{CreateSpec, InstanceStatus};
use dbaas_control_plane::persistence::Store;
use dbaas_control_plane::vnet::VNetAllocator;
use dbaas_control_plane::volume::VolumeService;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn test_config(data_root: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_root: data_root.to_path_buf(),
        runtime_socket: None,
        container_bin: "podman".to_string(),
        default_host_ip: "127.0.0.1".to_string(),
        vnet_default_name: None,
        health_interval_s: 30,
        metrics_interval_s: 10,
        metrics_retention_days: 30,
        health_sample_retention: 1000,
        image_pull_timeout_s: 5,
        readiness_timeout_s: HashMap::new(),
        default_readiness_timeout_s: 2,
        probe_pool_size: 16,
        auto_restart_enabled: false,
        health_failure_threshold: 3,
    }
}

async fn test_context(data_root: &Path) -> AppContext {
    let store = Store::connect(Path::new(":memory:")).await.unwrap();
    store.migrate().await.unwrap();

    let config = test_config(data_root);

    AppContext {
        store: Arc::new(store),
        runtime: Arc::new(FakeRuntime::new()),
        volumes: Arc::new(VolumeService::new(data_root.join("volumes"))),
        vnets: Arc::new(VNetAllocator::new(vec![])),
        config: Arc::new(config),
    }
}

fn create_spec(name: &str) -> CreateSpec {
    CreateSpec {
        engine: "postgresql".to_string(),
        name: Some(name.to_string()),
        database_name: "app".to_string(),
        sku: "d2".to_string(),
        memory_limit_mb: None,
        cpu_limit: None,
        storage_limit_gb: None,
        external_access: false,
        tls_enabled: false,
        tls_cert: None,
        tls_key: None,
        vnet_name: None,
    }
}

#[tokio::test]
async fn create_reaches_running_within_the_readiness_window() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path()).await;
    let manager = Arc::new(LifecycleManager::new(ctx.clone()));

    let instance = manager.create(create_spec("scenario-1")).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Pending);

    let mut reached_running = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = ctx.store.get_instance(instance.id).await.unwrap().unwrap();
        if current.status == InstanceStatus::Running {
            reached_running = true;
            assert_eq!(current.host, "127.0.0.1");
            assert!(current.port >= 20000 && current.port <= 29999);
            assert!(!current.username.is_empty());
            assert!(!current.password.is_empty());
            break;
        }
        assert_ne!(current.status, InstanceStatus::Failed, "provisioning unexpectedly failed");
    }
    assert!(reached_running, "instance never reached running");
}

#[tokio::test]
async fn two_concurrent_creates_never_collide_on_port_or_name() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path()).await;
    let manager = Arc::new(LifecycleManager::new(ctx.clone()));

    let a = manager.create(create_spec("scenario-5-a")).await.unwrap();
    let b = manager.create(create_spec("scenario-5-b")).await.unwrap();

    for id in [a.id, b.id] {
        for _ in 0..50 {
            let current = ctx.store.get_instance(id).await.unwrap().unwrap();
            if current.status == InstanceStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    let a_final = ctx.store.get_instance(a.id).await.unwrap().unwrap();
    let b_final = ctx.store.get_instance(b.id).await.unwrap().unwrap();
    assert_ne!(a_final.port, b_final.port);
    assert_ne!(a_final.name, b_final.name);
}

#[tokio::test]
async fn duplicate_name_is_rejected_as_validation_with_no_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path()).await;
    let manager = Arc::new(LifecycleManager::new(ctx.clone()));

    manager.create(create_spec("scenario-duplicate")).await.unwrap();
    let err = manager.create(create_spec("scenario-duplicate")).await.unwrap_err();
    assert!(matches!(err, dbaas_control_plane::error::ApiError::Collision(_)));
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path()).await;
    let manager = Arc::new(LifecycleManager::new(ctx.clone()));

    let instance = manager.create(create_spec("scenario-destroy")).await.unwrap();
    for _ in 0..50 {
        let current = ctx.store.get_instance(instance.id).await.unwrap().unwrap();
        if current.status == InstanceStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    manager.destroy(instance.id).await.unwrap();
    manager.destroy(instance.id).await.unwrap();

    let final_state = ctx.store.get_instance(instance.id).await.unwrap().unwrap();
    assert_eq!(final_state.status, InstanceStatus::Destroyed);
}

#[tokio::test]
async fn reconcile_twice_in_succession_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path()).await;
    let manager = Arc::new(LifecycleManager::new(ctx.clone()));

    let instance = manager.create(create_spec("scenario-reconcile")).await.unwrap();
    for _ in 0..50 {
        let current = ctx.store.get_instance(instance.id).await.unwrap().unwrap();
        if current.status == InstanceStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    reconcile::run(&ctx).await.unwrap();
    let after_first = ctx.store.get_instance(instance.id).await.unwrap().unwrap();
    reconcile::run(&ctx).await.unwrap();
    let after_second = ctx.store.get_instance(instance.id).await.unwrap().unwrap();

    assert_eq!(after_first.status, after_second.status);
}
