//! Startup crash recovery (spec §4.2 "Crash recovery"). Runs once before the
//! API surface starts accepting traffic: any instance left mid-transition by
//! a killed process is brought back into agreement with the container
//! runtime rather than left stuck.

use super::provision;
use crate::context::AppContext;
use crate::error::ApiResult;
use crate::model::{Instance, InstanceFilter, InstanceStatus};
use crate::orchestrator::ContainerState;

const IN_FLIGHT: &[InstanceStatus] =
    &[InstanceStatus::Creating, InstanceStatus::Starting, InstanceStatus::Stopping, InstanceStatus::Restarting];

/// Scans every persisted instance and reconciles the ones crash recovery
/// cares about. Idempotent: a second pass back-to-back is a no-op.
pub async fn run(ctx: &AppContext) -> ApiResult<()> {
    let instances = ctx.store.list_instances(&InstanceFilter::default()).await?;

    for instance in instances {
        if IN_FLIGHT.contains(&instance.status) {
            reconcile_in_flight(ctx, &instance).await?;
        } else if instance.status == InstanceStatus::Destroying {
            reconcile_destroying(ctx, &instance).await?;
        }
    }

    Ok(())
}

async fn reconcile_in_flight(ctx: &AppContext, instance: &Instance) -> ApiResult<()> {
    let Some(container_id) = &instance.container_id else {
        tracing::warn!(instance_id = instance.id, status = %instance.status, "reconcile: no container id, marking failed");
        ctx.store.update_status(instance.id, InstanceStatus::Failed, Some("crash recovery: never created a container")).await?;
        return Ok(());
    };

    match ctx.runtime.inspect(container_id).await {
        Ok(ContainerState::Running) => {
            let adapter = crate::engine::lookup(&instance.engine)?;
            match provision::wait_for_ready(ctx, &adapter, instance, container_id).await {
                Ok(()) => {
                    tracing::info!(instance_id = instance.id, "reconcile: container healthy, marking running");
                    ctx.store.update_status(instance.id, InstanceStatus::Running, None).await?;
                }
                Err(e) => {
                    tracing::warn!(instance_id = instance.id, error = %e, "reconcile: readiness gate failed, marking failed");
                    ctx.store.update_status(instance.id, InstanceStatus::Failed, Some(&e.to_string())).await?;
                }
            }
        }
        Ok(_) => {
            tracing::info!(instance_id = instance.id, "reconcile: container present but not running, marking stopped");
            ctx.store.update_status(instance.id, InstanceStatus::Stopped, None).await?;
        }
        Err(crate::orchestrator::OrchestratorError::ContainerNotFound { .. }) => {
            tracing::warn!(instance_id = instance.id, "reconcile: container absent, marking failed");
            ctx.store.update_status(instance.id, InstanceStatus::Failed, Some("crash recovery: container not found")).await?;
        }
        Err(e) => {
            return Err(super::LifecycleError::ReconcileFailed { instance_id: instance.id, reason: e.to_string() }.into());
        }
    }

    Ok(())
}

async fn reconcile_destroying(ctx: &AppContext, instance: &Instance) -> ApiResult<()> {
    tracing::info!(instance_id = instance.id, "reconcile: resuming interrupted destroy");
    provision::destroy_resources(ctx, instance).await?;
    ctx.store.update_status(instance.id, InstanceStatus::Destroyed, None).await?;
    Ok(())
}
