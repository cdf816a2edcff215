//! Container Orchestrator (spec §4.3): a thin async wrapper around a
//! rootless container runtime, invoked as a subprocess rather than linked in
//! as a client library — the same shape the teacher's background workers use
//! `tokio::process::Command` for external tool calls, generalized here to the
//! runtime boundary the spec calls for instead of a daemon socket client.

mod podman;

use crate::engine::CommandSpec;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub use podman::PodmanRuntime;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("container runtime binary not found: {0}")]
    RuntimeUnavailable(String),

    #[error("image pull failed for {image}: {stderr}")]
    PullFailed { image: String, stderr: String },

    #[error("container {container_id} not found")]
    ContainerNotFound { container_id: String },

    #[error("container operation '{op}' failed (exit {exit_code}): {stderr}")]
    OperationFailed { op: String, exit_code: i32, stderr: String },

    #[error("exec inside container {container_id} timed out after {timeout_s}s")]
    ExecTimeout { container_id: String, timeout_s: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Everything needed to create a container (spec §4.3 "create(spec)").
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub port_bindings: Vec<PortBinding>,
    pub volume_mounts: Vec<VolumeMount>,
    pub memory_limit_mb: i64,
    pub cpu_shares: u32,
    /// `None` means "use the runtime default".
    pub oom_score_adj: Option<i16>,
    /// `None` means "use the runtime default".
    pub swappiness: Option<u8>,
    pub network: Option<String>,
    pub labels: HashMap<String, String>,

    /// Security hardening, applied unconditionally (spec §4.3 "drop all
    /// Linux capabilities, no-new-privileges, pids-limit, read-only root
    /// filesystem where the engine permits").
    pub drop_all_capabilities: bool,
    pub no_new_privileges: bool,
    pub pids_limit: Option<u32>,
    pub read_only_rootfs: bool,
}

#[derive(Debug, Clone)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Exited,
    Dead,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_used_mb: i64,
    pub memory_limit_mb: i64,
    pub uptime_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub tail: Option<usize>,
    pub since_seconds: Option<u64>,
    pub until_seconds: Option<u64>,
    /// Free-form level tag (e.g. "error", "warn"); lines not containing it
    /// are dropped. Runtimes don't understand engine log levels themselves,
    /// so this is applied as a post-filter over the raw log text.
    pub level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The container lifecycle primitives spec §4.3 lists: create, start, stop,
/// remove, inspect, exec, logs, stats — the Instance Lifecycle Manager
/// composes these into the higher-level instance operations.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull_image(&self, image: &str, timeout_s: u64) -> OrchestratorResult<()>;
    async fn create(&self, spec: &ContainerSpec) -> OrchestratorResult<String>;
    async fn start(&self, container_id: &str) -> OrchestratorResult<()>;
    async fn stop(&self, container_id: &str, timeout_s: u64) -> OrchestratorResult<()>;
    async fn remove(&self, container_id: &str, force: bool) -> OrchestratorResult<()>;
    async fn inspect(&self, container_id: &str) -> OrchestratorResult<ContainerState>;
    async fn exec(&self, container_id: &str, command: &CommandSpec) -> OrchestratorResult<ExecOutput>;
    async fn logs(&self, container_id: &str, opts: LogOptions) -> OrchestratorResult<String>;
    async fn stats(&self, container_id: &str) -> OrchestratorResult<ContainerStats>;
}
