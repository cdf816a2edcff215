//! Shared axum state plus the host-supplied permission extension point (spec
//! §6 "The core consumes a callback `check(permission, subject) -> bool`
//! supplied by the host").

use crate::context::AppContext;
use crate::health_monitor::HealthMonitor;
use crate::lifecycle::LifecycleManager;
use crate::metrics_sampler::MetricsSampler;
use crate::model::Permission;
use crate::snapshot_service::SnapshotService;
use std::sync::Arc;

/// Opaque caller identity threaded in by the embedding host's own auth
/// middleware, via a request extension, before this router's handlers run.
/// The core never interprets its contents — only `check` does.
#[derive(Debug, Clone, Default)]
pub struct Subject(pub Option<String>);

pub type PermissionCheck = Arc<dyn Fn(Permission, &Subject) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct ApiState {
    pub ctx: AppContext,
    pub lifecycle: Arc<LifecycleManager>,
    pub snapshots: Arc<SnapshotService>,
    pub health: HealthMonitor,
    pub metrics: MetricsSampler,
    pub check: PermissionCheck,
}

/// Default predicate used when the host doesn't supply one: permissive,
/// suitable for local testing and the standalone `dbaasd serve` binary
/// where the host's own auth layer hasn't been wired in front yet.
pub fn allow_all() -> PermissionCheck {
    Arc::new(|_permission, _subject| true)
}
