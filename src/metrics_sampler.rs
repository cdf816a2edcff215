//! Metrics Sampler (spec §4.6): fuses container-runtime stats with adapter
//! in-engine metrics into one sample per tick, plus an hourly retention
//! sweep. Structurally a sibling of `health_monitor` — same ticker +
//! bounded-pool shape, different fusion logic.

use crate::context::AppContext;
use crate::model::MetricsSample;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct MetricsSampler {
    ctx: AppContext,
    pool: Arc<Semaphore>,
}

impl MetricsSampler {
    pub fn new(ctx: AppContext) -> Self {
        let pool = Arc::new(Semaphore::new(ctx.config.probe_pool_size));
        Self { ctx, pool }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let sampler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sampler.ctx.config.metrics_interval_s));
            loop {
                interval.tick().await;
                sampler.tick().await;
            }
        })
    }

    /// Every hour, deletes samples older than `metrics_retention_days` per
    /// instance (spec §4.6 "Retention").
    pub fn spawn_retention_sweep(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let cutoff = chrono::Utc::now() - chrono::Duration::days(self.ctx.config.metrics_retention_days as i64);
                match self.ctx.store.prune_metrics_older_than(cutoff).await {
                    Ok(deleted) if deleted > 0 => tracing::info!(deleted, "metrics retention sweep pruned samples"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "metrics retention sweep failed"),
                }
            }
        })
    }

    async fn tick(&self) {
        let instances = match self.ctx.store.list_instances(&Default::default()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "metrics sampler: failed to list instances");
                return;
            }
        };
        let due: Vec<_> =
            instances.into_iter().filter(|i| i.status == crate::model::InstanceStatus::Running).collect();

        let mut tasks = Vec::with_capacity(due.len());
        for instance in due {
            let Ok(permit) = Arc::clone(&self.pool).try_acquire_owned() else {
                tracing::debug!(instance_id = instance.id, "metrics sampler: pool saturated, skipping this tick");
                continue;
            };
            let sampler = self.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                sampler.sample_one(instance.id).await;
            }));
        }
        for t in tasks {
            let _ = t.await;
        }
    }

    async fn sample_one(&self, instance_id: i64) {
        let jitter_ms = rand::thread_rng().gen_range(0..(self.ctx.config.metrics_interval_s * 100));
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let Ok(Some(instance)) = self.ctx.store.get_instance(instance_id).await else { return };
        if instance.status != crate::model::InstanceStatus::Running {
            return;
        }
        let Some(container_id) = instance.container_id.clone() else { return };
        let Ok(adapter) = crate::engine::lookup(&instance.engine) else { return };

        let stats = match self.ctx.runtime.stats(&container_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(instance_id, error = %e, "metrics sampler: stats fetch failed");
                return;
            }
        };

        let commands = adapter.metrics_commands(&instance);
        let mut outputs = Vec::with_capacity(commands.len());
        for command in &commands {
            match self.ctx.runtime.exec(&container_id, command).await {
                Ok(output) if output.success() => outputs.push(output.stdout),
                _ => outputs.push(String::new()),
            }
        }
        let engine_metrics = adapter.parse_metrics(&outputs);

        if let Err(e) = self
            .ctx
            .store
            .insert_metrics_sample(
                instance_id,
                stats.cpu_percent,
                stats.memory_used_mb,
                stats.memory_limit_mb,
                engine_metrics.connections,
                engine_metrics.active_queries,
                engine_metrics.cache_hit_ratio,
                stats.uptime_seconds,
            )
            .await
        {
            tracing::warn!(instance_id, error = %e, "metrics sampler: failed to persist sample");
        }
    }

    pub async fn current(&self, instance_id: i64) -> Option<MetricsSample> {
        self.ctx.store.latest_metrics(instance_id).await.ok().flatten()
    }

    /// History is bounded to ~720 samples by default (spec §4.6 "2 h @
    /// 10 s") unless the caller narrows it further via `range`.
    pub async fn history(&self, instance_id: i64, mut range: crate::model::MetricsRange) -> Vec<MetricsSample> {
        if range.limit.is_none() {
            range.limit = Some(720);
        }
        self.ctx.store.metrics_history(instance_id, &range).await.unwrap_or_default()
    }
}
