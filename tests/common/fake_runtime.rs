//! In-process `ContainerRuntime` double. A real rootless Podman isn't
//! available under test, so lifecycle/orchestrator logic is exercised
//! against this instead — it implements the same trait the production
//! `PodmanRuntime` does, tracking just enough state (existence, running)
//! to drive the state machine and readiness gate.

use async_trait::async_trait;
use dbaas_control_plane::engine::CommandSpec;
use dbaas_control_plane::orchestrator::{
    ContainerRuntime, ContainerSpec, ContainerState, ContainerStats, ExecOutput, LogOptions, OrchestratorError,
    OrchestratorResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct FakeContainer {
    running: bool,
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    next_id: AtomicU64,
    /// When set, every probe `exec` call fails — used to exercise the
    /// readiness-timeout and degraded/unhealthy paths.
    pub fail_probes: std::sync::atomic::AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull_image(&self, _image: &str, _timeout_s: u64) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn create(&self, _spec: &ContainerSpec) -> OrchestratorResult<String> {
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().unwrap().insert(id.clone(), FakeContainer { running: false });
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> OrchestratorResult<()> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| OrchestratorError::ContainerNotFound { container_id: container_id.to_string() })?;
        container.running = true;
        Ok(())
    }

    async fn stop(&self, container_id: &str, _timeout_s: u64) -> OrchestratorResult<()> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| OrchestratorError::ContainerNotFound { container_id: container_id.to_string() })?;
        container.running = false;
        Ok(())
    }

    async fn remove(&self, container_id: &str, _force: bool) -> OrchestratorResult<()> {
        self.containers
            .lock()
            .unwrap()
            .remove(container_id)
            .ok_or_else(|| OrchestratorError::ContainerNotFound { container_id: container_id.to_string() })?;
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> OrchestratorResult<ContainerState> {
        let containers = self.containers.lock().unwrap();
        let container = containers
            .get(container_id)
            .ok_or_else(|| OrchestratorError::ContainerNotFound { container_id: container_id.to_string() })?;
        Ok(if container.running { ContainerState::Running } else { ContainerState::Exited })
    }

    async fn exec(&self, container_id: &str, _command: &CommandSpec) -> OrchestratorResult<ExecOutput> {
        if !self.containers.lock().unwrap().contains_key(container_id) {
            return Err(OrchestratorError::ContainerNotFound { container_id: container_id.to_string() });
        }
        if self.fail_probes.load(Ordering::SeqCst) {
            return Ok(ExecOutput { exit_code: 1, stdout: String::new(), stderr: "probe failed".into() });
        }
        Ok(ExecOutput { exit_code: 0, stdout: "1".into(), stderr: String::new() })
    }

    async fn logs(&self, _container_id: &str, _opts: LogOptions) -> OrchestratorResult<String> {
        Ok("fake log line 1\nfake log line 2\n".to_string())
    }

    async fn stats(&self, container_id: &str) -> OrchestratorResult<ContainerStats> {
        if !self.containers.lock().unwrap().contains_key(container_id) {
            return Err(OrchestratorError::ContainerNotFound { container_id: container_id.to_string() });
        }
        Ok(ContainerStats { cpu_percent: 1.5, memory_used_mb: 64, memory_limit_mb: 256, uptime_seconds: Some(42) })
    }
}
