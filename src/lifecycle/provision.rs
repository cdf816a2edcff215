//! Implements the `creating`/`starting` half of the state machine (spec
//! §4.2) and the idempotent destroy ordering (spec §4.2.1). Kept out of
//! `lifecycle::mod` proper since it's pure data-flow with no locking
//! decisions of its own — the caller already holds the per-instance lock.

use crate::context::AppContext;
use crate::engine::EngineAdapter;
use crate::error::{ApiError, ApiResult};
use crate::model::{CreateSpec, Instance, InstanceStatus};
use crate::orchestrator::{ContainerSpec, ContainerState, PortBinding, VolumeMount};
use crate::sku_catalog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Host ports are allocated out of this fixed range; spec §6 doesn't name a
/// range explicitly, so a conventional high/ephemeral-adjacent band is used,
/// wide enough that collisions are rare in a single-host deployment.
const PORT_RANGE: std::ops::RangeInclusive<u16> = 20000..=29999;

/// Flat per-container process-count cap applied regardless of SKU (spec
/// §4.3 "pids-limit"); the spec gives no per-series number, so one
/// conservative ceiling is used everywhere.
const PIDS_LIMIT: u32 = 512;

pub async fn run(ctx: &AppContext, instance_id: i64, spec: CreateSpec) -> ApiResult<()> {
    match try_provision(ctx, instance_id, &spec).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(instance_id, error = %e, "provisioning failed, rolling back");
            let _ = rollback_failed_provision(ctx, instance_id, &spec).await;
            ctx.store.update_status(instance_id, InstanceStatus::Failed, Some(&e.to_string())).await?;
            Err(e)
        }
    }
}

async fn try_provision(ctx: &AppContext, instance_id: i64, spec: &CreateSpec) -> ApiResult<()> {
    ctx.store.update_status(instance_id, InstanceStatus::Creating, None).await?;
    let mut instance = ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;

    let adapter = crate::engine::lookup(&instance.engine)?;
    let sku = sku_catalog::lookup(&instance.sku)
        .unwrap_or_else(|| sku_catalog::custom(instance.memory_limit_mb, instance.cpu_limit, instance.storage_limit_gb));
    let hints = sku.scheduling_hints();

    let volume_path = ctx.volumes.allocate(instance_id).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let port = ctx
        .store
        .reserve_port(instance_id, PORT_RANGE)
        .await
        .map_err(|_| ApiError::collision("no free port available"))?;

    let vnet_ip = match &spec.vnet_name {
        Some(name) => Some(ctx.vnets.reserve(name).map_err(|e| ApiError::collision(e.to_string()))?.to_string()),
        None => None,
    };

    let (tls_cert_path, tls_key_path) = if spec.tls_enabled {
        stage_tls_material(ctx, instance_id, spec).await?
    } else {
        (None, None)
    };

    ctx.store
        .set_provisioning_details(
            instance_id,
            port as i64,
            &volume_path.display().to_string(),
            spec.vnet_name.as_deref(),
            vnet_ip.as_deref(),
            tls_cert_path.as_deref(),
            tls_key_path.as_deref(),
        )
        .await?;
    instance = ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;

    let provision_spec = super::default_provision_spec(&instance, instance.memory_limit_mb, instance.cpu_limit);
    let config_bytes = adapter.render_config(&provision_spec, &hints)?;
    let config_host_path = ctx.config.containers_dir().join(instance_id.to_string()).join("config");
    if let Some(parent) = config_host_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    tokio::fs::write(&config_host_path, &config_bytes).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let image = adapter.image_reference();
    ctx.runtime.pull_image(&image.reference(), ctx.config.image_pull_timeout_s).await?;

    let mut volume_mounts = vec![
        VolumeMount { host_path: volume_path.clone(), container_path: "/var/lib/dbaas/data".into(), read_only: false },
        VolumeMount {
            host_path: config_host_path.clone(),
            container_path: adapter.config_mount_path().to_string(),
            read_only: true,
        },
    ];
    if let (Some(cert), Some(key)) = (&tls_cert_path, &tls_key_path) {
        volume_mounts.push(VolumeMount {
            host_path: cert.into(),
            container_path: "/run/dbaas/tls/cert.pem".into(),
            read_only: true,
        });
        volume_mounts.push(VolumeMount {
            host_path: key.into(),
            container_path: "/run/dbaas/tls/key.pem".into(),
            read_only: true,
        });
    }

    let host_ip = if instance.external_access { "0.0.0.0".to_string() } else { "127.0.0.1".to_string() };
    let mut labels = HashMap::new();
    labels.insert("managed-by".to_string(), "dbaas".to_string());
    labels.insert("instance-id".to_string(), instance_id.to_string());
    labels.insert("engine".to_string(), instance.engine.clone());

    let container_spec = ContainerSpec {
        name: format!("dbaas-{instance_id}"),
        image: image.reference(),
        env: adapter.container_env(&provision_spec),
        port_bindings: vec![PortBinding { host_ip, host_port: port, container_port: adapter.default_port() }],
        volume_mounts,
        memory_limit_mb: instance.memory_limit_mb,
        cpu_shares: hints.cpu_shares,
        oom_score_adj: hints.oom_score_adj,
        swappiness: hints.swappiness,
        network: spec.vnet_name.clone(),
        labels,
        drop_all_capabilities: true,
        no_new_privileges: true,
        pids_limit: Some(PIDS_LIMIT),
        read_only_rootfs: adapter.supports_read_only_rootfs(),
    };

    let container_id = ctx.runtime.create(&container_spec).await?;
    ctx.store.update_container_id(instance_id, Some(&container_id)).await?;
    instance.container_id = Some(container_id.clone());

    ctx.store.update_status(instance_id, InstanceStatus::Starting, None).await?;
    ctx.runtime.start(&container_id).await?;

    match wait_for_ready(ctx, &adapter, &instance, &container_id).await {
        Ok(()) => {
            ctx.store.update_status(instance_id, InstanceStatus::Running, None).await?;
            Ok(())
        }
        Err(e) => {
            // Readiness gate timeout: force-stop and remove to avoid leaks
            // (spec §4.2 "creation is transactional from the user's
            // perspective").
            let _ = ctx.runtime.stop(&container_id, 5).await;
            let _ = ctx.runtime.remove(&container_id, true).await;
            Err(e)
        }
    }
}

pub(super) async fn wait_for_ready(
    ctx: &AppContext,
    adapter: &Arc<dyn EngineAdapter>,
    instance: &Instance,
    container_id: &str,
) -> ApiResult<()> {
    let timeout = ctx.config.readiness_timeout(&instance.engine);
    let deadline = Instant::now() + timeout;
    let probe = adapter.health_probe_command(instance);

    loop {
        match ctx.runtime.inspect(container_id).await {
            Ok(ContainerState::Running) => {
                if let Ok(output) = ctx.runtime.exec(container_id, &probe).await {
                    if output.success() {
                        return Ok(());
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(container_id, error = %e, "readiness inspect failed, retrying"),
        }

        if Instant::now() >= deadline {
            return Err(crate::lifecycle::LifecycleError::ReadinessTimeout { timeout_s: timeout.as_secs() }.into());
        }
        sleep(Duration::from_secs(1)).await;
    }
}

async fn stage_tls_material(
    ctx: &AppContext,
    instance_id: i64,
    spec: &CreateSpec,
) -> ApiResult<(Option<String>, Option<String>)> {
    let dir = ctx.config.tls_dir().join(instance_id.to_string());
    tokio::fs::create_dir_all(&dir).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    let cert_bytes = spec.tls_cert.as_ref().ok_or_else(|| ApiError::validation("tls_cert required"))?;
    let key_bytes = spec.tls_key.as_ref().ok_or_else(|| ApiError::validation("tls_key required"))?;

    tokio::fs::write(&cert_path, cert_bytes).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    tokio::fs::write(&key_path, key_bytes).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    // Private key material is mode 0600 (spec §7 "TLS private keys ... are
    // mode 0600"); the cert is public but kept at the same mode for
    // consistency with the rest of the directory.
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::Permissions::from_mode(0o600);
    tokio::fs::set_permissions(&key_path, mode.clone()).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    tokio::fs::set_permissions(&cert_path, mode).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((Some(cert_path.display().to_string()), Some(key_path.display().to_string())))
}

/// Best-effort cleanup of whatever partial resources a failed provisioning
/// attempt left behind (spec §4.2 "Volume or vnet allocation failure: no
/// container is created; ... resources released").
async fn rollback_failed_provision(ctx: &AppContext, instance_id: i64, spec: &CreateSpec) -> ApiResult<()> {
    let Some(instance) = ctx.store.get_instance(instance_id).await? else { return Ok(()) };

    if let Some(container_id) = &instance.container_id {
        let _ = ctx.runtime.stop(container_id, 5).await;
        let _ = ctx.runtime.remove(container_id, true).await;
    }
    if instance.port != 0 {
        let _ = ctx.store.release_port(instance.port as u16).await;
    }
    if let (Some(network), Some(ip)) = (&spec.vnet_name, instance.vnet_ip.as_deref().and_then(|s| s.parse().ok())) {
        let _ = ctx.vnets.release(network, ip);
    }
    ctx.volumes.release(instance_id).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(())
}

/// Destroy ordering (spec §4.2.1), every step idempotent so a crash mid-way
/// converges correctly on reconcile.
pub async fn destroy_resources(ctx: &AppContext, instance: &Instance) -> ApiResult<()> {
    if let Some(container_id) = &instance.container_id {
        match ctx.runtime.stop(container_id, 5).await {
            Ok(()) | Err(crate::orchestrator::OrchestratorError::ContainerNotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        match ctx.runtime.remove(container_id, true).await {
            Ok(()) | Err(crate::orchestrator::OrchestratorError::ContainerNotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    for snapshot in ctx.store.list_snapshots(instance.id).await? {
        let _ = tokio::fs::remove_file(&snapshot.path).await;
        ctx.store.delete_snapshot(snapshot.id).await?;
    }

    if let (Some(network), Some(ip)) =
        (instance.vnet_name.as_deref(), instance.vnet_ip.as_deref().and_then(|s| s.parse().ok()))
    {
        let _ = ctx.vnets.release(network, ip);
    }

    ctx.volumes.release(instance.id).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Some(cert_path) = &instance.tls_cert_path {
        let _ = tokio::fs::remove_file(cert_path).await;
    }
    if let Some(key_path) = &instance.tls_key_path {
        let _ = tokio::fs::remove_file(key_path).await;
    }
    let tls_dir = ctx.config.tls_dir().join(instance.id.to_string());
    let _ = tokio::fs::remove_dir(&tls_dir).await;

    if instance.port != 0 {
        let _ = ctx.store.release_port(instance.port as u16).await;
    }

    Ok(())
}
