mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::fake_runtime::FakeRuntime;
use dbaas_control_plane::api::{self, allow_all, ApiState};
use dbaas_control_plane::config::Config;
use dbaas_control_plane::context::AppContext;
use dbaas_control_plane::health_monitor::HealthMonitor;
use dbaas_control_plane::lifecycle::LifecycleManager;
use dbaas_control_plane::metrics_sampler::MetricsSampler;
use dbaas_control_plane::persistence::Store;
use dbaas_control_plane::snapshot_service::SnapshotService;
use dbaas_control_plane::vnet::VNetAllocator;
use dbaas_control_plane::volume::VolumeService;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

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

async fn test_router(data_root: &Path) -> (axum::Router, AppContext) {
    let store = Store::connect(Path::new(":memory:")).await.unwrap();
    store.migrate().await.unwrap();

    let ctx = AppContext {
        store: Arc::new(store),
        runtime: Arc::new(FakeRuntime::new()),
        volumes: Arc::new(VolumeService::new(data_root.join("volumes"))),
        vnets: Arc::new(VNetAllocator::new(vec![])),
        config: Arc::new(test_config(data_root)),
    };

    let lifecycle = Arc::new(LifecycleManager::new(ctx.clone()));
    let snapshots = Arc::new(SnapshotService::new(ctx.clone()));
    let health = HealthMonitor::new(ctx.clone());
    let metrics = MetricsSampler::new(ctx.clone());

    let state = ApiState { ctx: ctx.clone(), lifecycle, snapshots, health, metrics, check: allow_all() };
    (api::build_router(state), ctx)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn listing_engines_returns_the_six_supported_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let (router, _ctx) = test_router(tmp.path()).await;

    let response = router
        .oneshot(Request::builder().uri("/engines").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let engines = body.as_array().expect("engines list is a JSON array");
    assert_eq!(engines.len(), 6);
}

#[tokio::test]
async fn create_then_get_round_trips_through_http() {
    let tmp = tempfile::tempdir().unwrap();
    let (router, ctx) = test_router(tmp.path()).await;

    let payload = serde_json::json!({
        "engine": "postgresql",
        "name": "http-scenario",
        "database_name": "app",
        "sku": "d2",
        "external_access": false,
        "tls_enabled": false,
    });

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/instances")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let id = created["id"].as_i64().expect("created instance has an id");
    assert_eq!(created["status"], "pending");

    let mut final_status = String::new();
    for _ in 0..50 {
        let current = ctx.store.get_instance(id).await.unwrap().unwrap();
        final_status = current.status.as_str().to_string();
        if final_status == "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(final_status, "running");

    let response = router
        .oneshot(Request::builder().uri(format!("/instances/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["id"].as_i64().unwrap(), id);
    assert_eq!(fetched["status"], "running");
}

#[tokio::test]
async fn getting_an_unknown_instance_is_a_404() {
    let tmp = tempfile::tempdir().unwrap();
    let (router, _ctx) = test_router(tmp.path()).await;

    let response = router
        .oneshot(Request::builder().uri("/instances/999999").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn denying_permission_check_yields_403_without_touching_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let deny_all: dbaas_control_plane::api::PermissionCheck = Arc::new(|_perm, _subject| false);

    let store = Store::connect(Path::new(":memory:")).await.unwrap();
    store.migrate().await.unwrap();
    let ctx = AppContext {
        store: Arc::new(store),
        runtime: Arc::new(FakeRuntime::new()),
        volumes: Arc::new(VolumeService::new(tmp.path().join("volumes"))),
        vnets: Arc::new(VNetAllocator::new(vec![])),
        config: Arc::new(test_config(tmp.path())),
    };
    let lifecycle = Arc::new(LifecycleManager::new(ctx.clone()));
    let snapshots = Arc::new(SnapshotService::new(ctx.clone()));
    let health = HealthMonitor::new(ctx.clone());
    let metrics = MetricsSampler::new(ctx.clone());
    let state = ApiState { ctx, lifecycle, snapshots, health, metrics, check: deny_all };
    let denying_router = api::build_router(state);

    let payload = serde_json::json!({
        "engine": "postgresql",
        "name": "should-not-be-created",
        "database_name": "app",
        "sku": "d2",
        "external_access": false,
        "tls_enabled": false,
    });
    let response = denying_router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/instances")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
