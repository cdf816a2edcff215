//! Instance Lifecycle Manager (spec §4.2): the only writer of
//! `Instance::status`, driving each instance through the state machine spec
//! §4.2 diagrams, with a per-instance exclusive lock serializing concurrent
//! operations (spec §4.2 "Concurrency").

mod provision;
pub mod reconcile;

use crate::context::AppContext;
use crate::engine::{self, ProvisionSpec};
use crate::error::{ApiError, ApiResult};
use crate::model::{CreateSpec, Instance, InstanceStatus};
use crate::sku_catalog;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot transition instance {instance_id} from {from} to {to}")]
    InvalidTransition { instance_id: i64, from: String, to: String },

    #[error("readiness gate timed out after {timeout_s}s")]
    ReadinessTimeout { timeout_s: u64 },

    #[error("reconciliation failed for instance {instance_id}: {reason}")]
    ReconcileFailed { instance_id: i64, reason: String },
}

/// Per-instance exclusive lock table (spec §4.2 "serialized by a per-instance
/// exclusive lock held for the duration of the transition"). A plain
/// `Mutex<HashMap<..>>` guard table, same granularity the teacher's
/// `connection::pool` uses for its shared connection state — no extra crate
/// needed for this.
#[derive(Default)]
struct LockTable {
    locks: std::sync::Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    fn handle(&self, instance_id: i64) -> Arc<AsyncMutex<()>> {
        self.locks.lock().unwrap().entry(instance_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

pub struct LifecycleManager {
    ctx: AppContext,
    locks: LockTable,
}

impl LifecycleManager {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx, locks: LockTable::default() }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    fn guard_transition(
        current: InstanceStatus,
        allowed: &[InstanceStatus],
        instance_id: i64,
        to: InstanceStatus,
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&current) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                instance_id,
                from: current.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    /// Validates the request and inserts a `pending` row; the actual
    /// provisioning runs on a spawned task so `Create` returns immediately
    /// (spec §4.8 "side effect: spawns a background provisioning task").
    pub async fn create(self: &Arc<Self>, spec: CreateSpec) -> ApiResult<Instance> {
        let adapter = engine::lookup(&spec.engine)?;

        let sku = if spec.sku.eq_ignore_ascii_case("custom") {
            let (mem, cpu, storage) = (
                spec.memory_limit_mb.ok_or_else(|| ApiError::validation("custom sku requires memory_limit_mb"))?,
                spec.cpu_limit.ok_or_else(|| ApiError::validation("custom sku requires cpu_limit"))?,
                spec.storage_limit_gb.ok_or_else(|| ApiError::validation("custom sku requires storage_limit_gb"))?,
            );
            sku_catalog::custom(mem, cpu, storage)
        } else {
            sku_catalog::lookup(&spec.sku).ok_or_else(|| ApiError::validation(format!("unknown sku: {}", spec.sku)))?
        };

        if spec.tls_enabled && (spec.tls_cert.is_none() || spec.tls_key.is_none()) {
            return Err(ApiError::validation("tls_enabled requires both tls_cert and tls_key"));
        }

        let name = spec.name.clone().unwrap_or_else(|| format!("{}-{}", spec.engine, uuid::Uuid::new_v4()));
        if self.ctx.store.name_in_use(&name).await? {
            return Err(ApiError::collision(format!("name already in use: {name}")));
        }

        let username = crate::credential::generate_username(&adapter.tag().to_string());
        let password = crate::credential::generate_password(adapter.charset_constraints());

        let new_instance = crate::persistence::NewInstance {
            name,
            engine: spec.engine.clone(),
            sku: sku.id.clone(),
            database_name: spec.database_name.clone(),
            username,
            password,
            host: self.ctx.config.default_host_ip.clone(),
            port: 0,
            volume_path: String::new(),
            vnet_name: spec.vnet_name.clone(),
            vnet_ip: None,
            memory_limit_mb: sku.memory_mb,
            cpu_limit: sku.vcpu,
            storage_limit_gb: sku.storage_gb,
            external_access: spec.external_access,
            tls_enabled: spec.tls_enabled,
            tls_cert_path: None,
            tls_key_path: None,
        };

        let instance = self.ctx.store.insert_instance(new_instance).await?;

        let manager = Arc::clone(self);
        let spec_for_task = spec;
        let instance_id = instance.id;
        tokio::spawn(async move {
            if let Err(e) = manager.provision(instance_id, spec_for_task).await {
                tracing::error!(instance_id, error = %e, "provisioning failed");
            }
        });

        Ok(instance)
    }

    async fn provision(&self, instance_id: i64, spec: CreateSpec) -> ApiResult<()> {
        let _lock = self.locks.handle(instance_id).lock_owned().await;
        provision::run(&self.ctx, instance_id, spec).await
    }

    pub async fn start(&self, instance_id: i64) -> ApiResult<Instance> {
        let _lock = self.locks.handle(instance_id).lock_owned().await;
        let instance =
            self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;

        Self::guard_transition(
            instance.status,
            &[InstanceStatus::Stopped, InstanceStatus::Failed],
            instance_id,
            InstanceStatus::Starting,
        )?;

        self.ctx.store.update_status(instance_id, InstanceStatus::Starting, None).await?;
        let adapter = engine::lookup(&instance.engine)?;
        let container_id =
            instance.container_id.clone().ok_or_else(|| ApiError::Internal("missing container id".into()))?;

        self.ctx.runtime.start(&container_id).await?;
        if let Err(e) = provision::wait_for_ready(&self.ctx, &adapter, &instance, &container_id).await {
            let _ = self.ctx.runtime.stop(&container_id, 5).await;
            self.ctx.store.update_status(instance_id, InstanceStatus::Failed, Some(&e.to_string())).await?;
            return Err(e);
        }

        self.ctx.store.update_status(instance_id, InstanceStatus::Running, None).await?;
        self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))
    }

    pub async fn stop(&self, instance_id: i64) -> ApiResult<Instance> {
        let _lock = self.locks.handle(instance_id).lock_owned().await;
        let instance =
            self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;

        Self::guard_transition(
            instance.status,
            &[InstanceStatus::Running],
            instance_id,
            InstanceStatus::Stopping,
        )?;

        self.ctx.store.update_status(instance_id, InstanceStatus::Stopping, None).await?;
        if let Some(container_id) = &instance.container_id {
            self.ctx.runtime.stop(container_id, 30).await?;
        }
        self.ctx.store.update_status(instance_id, InstanceStatus::Stopped, None).await?;
        self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))
    }

    /// `restarting` is `stopping → starting` without an intermediate
    /// `stopped` exposure (spec §4.2).
    pub async fn restart(&self, instance_id: i64) -> ApiResult<Instance> {
        let _lock = self.locks.handle(instance_id).lock_owned().await;
        let instance =
            self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;

        Self::guard_transition(
            instance.status,
            &[InstanceStatus::Running],
            instance_id,
            InstanceStatus::Restarting,
        )?;

        self.ctx.store.update_status(instance_id, InstanceStatus::Restarting, None).await?;
        let container_id =
            instance.container_id.clone().ok_or_else(|| ApiError::Internal("missing container id".into()))?;

        self.ctx.runtime.stop(&container_id, 30).await?;
        self.ctx.runtime.start(&container_id).await?;

        let adapter = engine::lookup(&instance.engine)?;
        if let Err(e) = provision::wait_for_ready(&self.ctx, &adapter, &instance, &container_id).await {
            let _ = self.ctx.runtime.stop(&container_id, 5).await;
            self.ctx.store.update_status(instance_id, InstanceStatus::Failed, Some(&e.to_string())).await?;
            return Err(e);
        }

        self.ctx.store.update_status(instance_id, InstanceStatus::Running, None).await?;
        self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))
    }

    /// Destroy is idempotent: destroying an already-`destroyed` instance
    /// returns success without error (spec §4.8).
    pub async fn destroy(&self, instance_id: i64) -> ApiResult<()> {
        let _lock = self.locks.handle(instance_id).lock_owned().await;
        let Some(instance) = self.ctx.store.get_instance(instance_id).await? else {
            return Ok(());
        };
        if instance.status == InstanceStatus::Destroyed {
            return Ok(());
        }

        self.ctx.store.update_status(instance_id, InstanceStatus::Destroying, None).await?;
        provision::destroy_resources(&self.ctx, &instance).await?;
        self.ctx.store.update_status(instance_id, InstanceStatus::Destroyed, None).await?;
        Ok(())
    }

    pub async fn rotate_credentials(&self, instance_id: i64) -> ApiResult<(String, String)> {
        let _lock = self.locks.handle(instance_id).lock_owned().await;
        let instance =
            self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;
        if !instance.is_running() {
            return Err(ApiError::validation("credentials can only be rotated on a running instance"));
        }

        let adapter = engine::lookup(&instance.engine)?;
        let container_id =
            instance.container_id.clone().ok_or_else(|| ApiError::Internal("missing container id".into()))?;
        let new_password = crate::credential::generate_password(adapter.charset_constraints());

        let command = adapter.rotate_credentials_command(&instance, &new_password);
        let output = self.ctx.runtime.exec(&container_id, &command).await?;
        if !output.success() {
            return Err(crate::engine::EngineError::Op { exit_code: output.exit_code, stderr: output.stderr }.into());
        }

        self.ctx.store.update_password(instance_id, &new_password).await?;
        Ok((instance.username, new_password))
    }
}

pub(crate) fn default_provision_spec(instance: &Instance, memory_limit_mb: i64, cpu_limit: f64) -> ProvisionSpec {
    ProvisionSpec {
        database_name: instance.database_name.clone(),
        username: instance.username.clone(),
        password: instance.password.clone(),
        memory_limit_mb,
        cpu_limit,
        tls_enabled: instance.tls_enabled,
    }
}
