//! Health Monitor (spec §4.5): periodically probes every `running` instance
//! through a bounded concurrent pool and maintains an in-memory
//! current-status index, the same "ticker + `Semaphore`-bounded fan-out"
//! shape the teacher's background workers use for their own polling loops.

use crate::context::AppContext;
use crate::model::{HealthCurrent, HealthStatus, InstanceStatus};
use crate::orchestrator::ContainerState;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

#[derive(Default)]
struct CurrentIndex {
    entries: RwLock<HashMap<i64, HealthCurrent>>,
}

/// Runs the periodic probe loop. Cheaply cloneable; the same handle is
/// shared between the background ticker task and `GET /instances/{id}/health`.
#[derive(Clone)]
pub struct HealthMonitor {
    ctx: AppContext,
    index: Arc<CurrentIndex>,
    pool: Arc<Semaphore>,
}

impl HealthMonitor {
    pub fn new(ctx: AppContext) -> Self {
        let pool = Arc::new(Semaphore::new(ctx.config.probe_pool_size));
        Self { ctx, index: Arc::new(CurrentIndex::default()), pool }
    }

    pub async fn current(&self, instance_id: i64) -> Option<HealthCurrent> {
        self.index.entries.read().await.get(&instance_id).cloned()
    }

    /// Spawns the background ticker; returns immediately. Intended to be
    /// called once at process start from `main`.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.ctx.config.health_interval_s));
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        let instances = match self.ctx.store.list_instances(&Default::default()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "health monitor: failed to list instances");
                return;
            }
        };

        let due: Vec<_> = instances.into_iter().filter(|i| i.status == InstanceStatus::Running).collect();

        let mut tasks = Vec::with_capacity(due.len());
        for instance in due {
            // Backpressure: instances exceeding the pool are skipped for
            // this tick rather than queued (spec §5 "Backpressure").
            let Ok(permit) = Arc::clone(&self.pool).try_acquire_owned() else {
                tracing::debug!(instance_id = instance.id, "health monitor: pool saturated, skipping this tick");
                continue;
            };
            let monitor = self.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                monitor.probe_one(instance.id).await;
            }));
        }
        for t in tasks {
            let _ = t.await;
        }
    }

    async fn probe_one(&self, instance_id: i64) {
        // ±10% jitter so probes desynchronize across instances (spec §4.5).
        let jitter_ms = rand::thread_rng().gen_range(0..(self.ctx.config.health_interval_s * 100));
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let Ok(Some(instance)) = self.ctx.store.get_instance(instance_id).await else { return };
        if instance.status != InstanceStatus::Running {
            return;
        }
        let Ok(adapter) = crate::engine::lookup(&instance.engine) else { return };
        let Some(container_id) = instance.container_id.clone() else { return };

        let timeout = Duration::from_secs(self.ctx.config.health_interval_s.max(2) / 2);
        let probe = adapter.health_probe_command(&instance);

        let (status, response_time_ms, details) = match self.ctx.runtime.inspect(&container_id).await {
            Ok(ContainerState::Running) => {
                let started = tokio::time::Instant::now();
                match tokio::time::timeout(timeout, self.ctx.runtime.exec(&container_id, &probe)).await {
                    Ok(Ok(output)) if output.success() => (
                        HealthStatus::Healthy,
                        Some(started.elapsed().as_millis() as i64),
                        adapter.interpret_health_output(&output.stdout),
                    ),
                    Ok(Ok(_)) => (HealthStatus::Degraded, Some(started.elapsed().as_millis() as i64), None),
                    Ok(Err(_)) => (HealthStatus::Unknown, None, None),
                    Err(_) => (HealthStatus::Unknown, None, None),
                }
            }
            Ok(_) => (HealthStatus::Unhealthy, None, None),
            Err(_) => (HealthStatus::Unknown, None, None),
        };

        let sample = match self.ctx.store.insert_health_sample(instance_id, status, response_time_ms, details).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(instance_id, error = %e, "health monitor: failed to persist sample");
                return;
            }
        };

        let mut entries = self.index.entries.write().await;
        let entry = entries.entry(instance_id).or_insert_with(|| HealthCurrent {
            instance_id,
            status,
            consecutive_transitions: 0,
            last_sample: None,
        });
        let transitioned = entry.status != status;
        entry.consecutive_transitions = if transitioned { 1 } else { entry.consecutive_transitions + 1 };
        entry.status = status;
        entry.last_sample = Some(sample);

        // Sustained flip for K consecutive samples may trigger an automatic
        // restart; off by default (spec §9 open question 2).
        if self.ctx.config.auto_restart_enabled
            && status == HealthStatus::Unhealthy
            && entry.consecutive_transitions >= self.ctx.config.health_failure_threshold
        {
            tracing::warn!(instance_id, "health monitor: sustained unhealthy, auto-restart would trigger here");
        }
    }
}
