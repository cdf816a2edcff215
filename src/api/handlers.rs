use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::error::{ApiError, ApiResult};
use crate::model::{
    CreateSpec, EngineInfo, HealthCurrent, HostCapacity, Instance, InstanceFilter, MetricsRange, MetricsView,
    Permission, Sku, Snapshot,
};

use super::dto::{
    CredentialsView, InspectView, LogEntry, LogsQuery, LogsView, SnapshotCreateBody, StatsView,
};
use super::state::{ApiState, Subject};

fn authorize(state: &ApiState, subject: &Option<Extension<Subject>>, perm: Permission) -> ApiResult<()> {
    let subject = subject.as_ref().map(|Extension(s)| s.clone()).unwrap_or_default();
    if (state.check)(perm, &subject) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub async fn list_engines(State(state): State<ApiState>) -> Json<Vec<EngineInfo>> {
    let cfg = &state.ctx.config;
    Json(crate::engine::list_engines(|tag| cfg.readiness_timeout(tag).as_secs()))
}

pub async fn list_skus() -> Json<Vec<Sku>> {
    Json(crate::sku_catalog::catalog())
}

pub async fn host_capacity(State(state): State<ApiState>) -> ApiResult<Json<HostCapacity>> {
    let instances = state.ctx.store.list_instances(&InstanceFilter::default()).await?;
    let allocated_memory_mb = instances.iter().map(|i| i.memory_limit_mb).sum();
    let allocated_cpu = instances.iter().map(|i| i.cpu_limit).sum();

    let sys = sysinfo::System::new_all();
    let total_memory_mb = (sys.total_memory() / (1024 * 1024)) as i64;
    let total_cpu = sys.cpus().len() as f64;

    Ok(Json(HostCapacity {
        total_memory_mb,
        allocated_memory_mb,
        total_cpu,
        allocated_cpu,
        instance_count: instances.len() as i64,
    }))
}

pub async fn list_instances(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Query(filter): Query<InstanceFilter>,
) -> ApiResult<Json<Vec<Instance>>> {
    authorize(&state, &subject, Permission::Read)?;
    Ok(Json(state.ctx.store.list_instances(&filter).await?))
}

pub async fn create_instance(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Json(spec): Json<CreateSpec>,
) -> ApiResult<Json<Instance>> {
    authorize(&state, &subject, Permission::Write)?;
    Ok(Json(state.lifecycle.create(spec).await?))
}

pub async fn get_instance(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Instance>> {
    authorize(&state, &subject, Permission::Read)?;
    state.ctx.store.get_instance(id).await?.map(Json).ok_or_else(|| ApiError::not_found("instance"))
}

pub async fn start_instance(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Instance>> {
    authorize(&state, &subject, Permission::Write)?;
    Ok(Json(state.lifecycle.start(id).await?))
}

pub async fn stop_instance(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Instance>> {
    authorize(&state, &subject, Permission::Write)?;
    Ok(Json(state.lifecycle.stop(id).await?))
}

pub async fn restart_instance(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Instance>> {
    authorize(&state, &subject, Permission::Write)?;
    Ok(Json(state.lifecycle.restart(id).await?))
}

pub async fn destroy_instance(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&state, &subject, Permission::Write)?;
    state.lifecycle.destroy(id).await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn logs(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
    Query(q): Query<LogsQuery>,
) -> ApiResult<Json<LogsView>> {
    authorize(&state, &subject, Permission::Read)?;
    let instance = state.ctx.store.get_instance(id).await?.ok_or_else(|| ApiError::not_found("instance"))?;
    let container_id = instance.container_id.ok_or_else(|| ApiError::validation("instance has no container yet"))?;
    let opts = crate::orchestrator::LogOptions {
        tail: q.tail,
        since_seconds: q.since,
        until_seconds: q.until,
        level: q.level,
    };
    let raw = state.ctx.runtime.logs(&container_id, opts).await?;
    let entries = raw.lines().map(|line| LogEntry { line: line.to_string() }).collect();
    Ok(Json(LogsView { entries }))
}

pub async fn stats(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StatsView>> {
    authorize(&state, &subject, Permission::Read)?;
    let instance = state.ctx.store.get_instance(id).await?.ok_or_else(|| ApiError::not_found("instance"))?;
    let container_id = instance.container_id.ok_or_else(|| ApiError::validation("instance has no container yet"))?;
    let stats = state.ctx.runtime.stats(&container_id).await?;
    Ok(Json(StatsView { stats }))
}

pub async fn inspect(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<InspectView>> {
    authorize(&state, &subject, Permission::Read)?;
    let instance = state.ctx.store.get_instance(id).await?.ok_or_else(|| ApiError::not_found("instance"))?;
    let container_state = match &instance.container_id {
        Some(cid) => state.ctx.runtime.inspect(cid).await.ok(),
        None => None,
    };
    Ok(Json(InspectView {
        instance_id: instance.id,
        status: instance.status,
        container_id: instance.container_id.clone(),
        container_state,
        host: instance.host.clone(),
        port: instance.port,
        external_access: instance.external_access,
    }))
}

pub async fn metrics(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
    Query(range): Query<MetricsRange>,
) -> ApiResult<Json<MetricsView>> {
    authorize(&state, &subject, Permission::Read)?;
    let current = state.metrics.current(id).await;
    let history = state.metrics.history(id, range).await;
    Ok(Json(MetricsView { current, history }))
}

pub async fn health(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<HealthCurrent>> {
    authorize(&state, &subject, Permission::Read)?;
    state.health.current(id).await.map(Json).ok_or_else(|| ApiError::not_found("no health samples yet"))
}

pub async fn create_snapshot(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
    Json(body): Json<SnapshotCreateBody>,
) -> ApiResult<Json<Snapshot>> {
    authorize(&state, &subject, Permission::Write)?;
    Ok(Json(state.snapshots.create(id, body.notes.as_deref()).await?))
}

pub async fn list_snapshots(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Snapshot>>> {
    authorize(&state, &subject, Permission::Read)?;
    Ok(Json(state.snapshots.list(id).await?))
}

pub async fn restore_snapshot(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path((id, sid)): Path<(i64, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&state, &subject, Permission::Write)?;
    state.snapshots.restore(id, sid).await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn delete_snapshot(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path((id, sid)): Path<(i64, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&state, &subject, Permission::Write)?;
    state.snapshots.delete(id, sid).await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn export(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<u8>> {
    authorize(&state, &subject, Permission::Read)?;
    Ok(state.snapshots.export(id).await?)
}

pub async fn rotate_credentials(
    State(state): State<ApiState>,
    subject: Option<Extension<Subject>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CredentialsView>> {
    authorize(&state, &subject, Permission::Write)?;
    let (username, password) = state.lifecycle.rotate_credentials(id).await?;
    Ok(Json(CredentialsView { username, password }))
}
