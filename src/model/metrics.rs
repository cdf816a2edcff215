use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single fused container+engine metrics observation (spec §3
/// `MetricsSample`, §4.6).
///
/// Engine-specific fields are `Option` rather than defaulted to zero: a
/// missing value means "waiting for data", not "zero" (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricsSample {
    pub id: i64,
    pub instance_id: i64,
    pub cpu_percent: f64,
    pub memory_used_mb: i64,
    pub memory_limit_mb: i64,
    pub memory_percent: f64,
    pub connections: Option<i64>,
    pub active_queries: Option<i64>,
    pub cache_hit_ratio: Option<f64>,
    pub uptime_seconds: Option<i64>,
    pub collected_at: DateTime<Utc>,
}

/// Response shape for `GET /instances/{id}/metrics` (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct MetricsView {
    pub current: Option<MetricsSample>,
    pub history: Vec<MetricsSample>,
}

/// Query range for the metrics API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}
