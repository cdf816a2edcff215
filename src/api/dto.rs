//! Response/request shapes that aren't already part of `crate::model` (spec
//! §6 `Inspect`, `Stats`, the logs envelope).

use crate::model::InstanceStatus;
use crate::orchestrator::{ContainerState, ContainerStats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct InspectView {
    pub instance_id: i64,
    pub status: InstanceStatus,
    pub container_id: Option<String>,
    pub container_state: Option<ContainerState>,
    pub host: String,
    pub port: i64,
    pub external_access: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    #[serde(flatten)]
    pub stats: ContainerStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub line: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsView {
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotCreateBody {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialsView {
    pub username: String,
    pub password: String,
}
