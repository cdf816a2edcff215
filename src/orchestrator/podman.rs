use super::{
    ContainerRuntime, ContainerSpec, ContainerState, ContainerStats, ExecOutput, LogOptions,
    OrchestratorError, OrchestratorResult,
};
use crate::engine::CommandSpec;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Drives a rootless `podman` binary as a subprocess (spec §4.3 "a rootless
/// container runtime (e.g. Podman)"). Every call shells out rather than
/// talking to a daemon socket, matching the CLI-shaped operations the spec
/// describes (`create`, `start`, `stop`, ...).
pub struct PodmanRuntime {
    binary: String,
    default_exec_timeout_s: u64,
}

impl PodmanRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), default_exec_timeout_s: 30 }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    async fn run(&self, args: &[&str]) -> OrchestratorResult<std::process::Output> {
        self.command()
            .args(args)
            .output()
            .await
            .map_err(OrchestratorError::Io)
    }
}

#[derive(Debug, Deserialize)]
struct PodmanInspectEntry {
    #[serde(rename = "State")]
    state: PodmanInspectState,
}

#[derive(Debug, Deserialize)]
struct PodmanInspectState {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct PodmanStatsEntry {
    #[serde(rename = "CPU")]
    cpu: String,
    #[serde(rename = "MemUsage")]
    mem_usage: String,
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn pull_image(&self, image: &str, timeout_s: u64) -> OrchestratorResult<()> {
        let fut = self.command().args(["pull", image]).output();
        let output = timeout(Duration::from_secs(timeout_s), fut)
            .await
            .map_err(|_| OrchestratorError::OperationFailed {
                op: "pull".into(),
                exit_code: -1,
                stderr: format!("timed out after {timeout_s}s"),
            })?
            .map_err(OrchestratorError::Io)?;
        if !output.status.success() {
            return Err(OrchestratorError::PullFailed {
                image: image.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> OrchestratorResult<String> {
        let mut args: Vec<String> = vec!["create".into(), "--name".into(), spec.name.clone()];

        for (k, v) in &spec.env {
            args.push("-e".into());
            args.push(format!("{k}={v}"));
        }
        for binding in &spec.port_bindings {
            args.push("-p".into());
            args.push(format!("{}:{}:{}", binding.host_ip, binding.host_port, binding.container_port));
        }
        for mount in &spec.volume_mounts {
            let ro = if mount.read_only { ":ro" } else { "" };
            args.push("-v".into());
            args.push(format!("{}:{}{}", mount.host_path.display(), mount.container_path, ro));
        }
        args.push("--memory".into());
        args.push(format!("{}m", spec.memory_limit_mb));
        args.push("--cpu-shares".into());
        args.push(spec.cpu_shares.to_string());
        if let Some(adj) = spec.oom_score_adj {
            args.push("--oom-score-adj".into());
            args.push(adj.to_string());
        }
        if let Some(swappiness) = spec.swappiness {
            args.push("--memory-swappiness".into());
            args.push(swappiness.to_string());
        }
        if let Some(network) = &spec.network {
            args.push("--network".into());
            args.push(network.clone());
        }
        if spec.drop_all_capabilities {
            args.push("--cap-drop".into());
            args.push("ALL".into());
        }
        if spec.no_new_privileges {
            args.push("--security-opt".into());
            args.push("no-new-privileges".into());
        }
        if let Some(pids_limit) = spec.pids_limit {
            args.push("--pids-limit".into());
            args.push(pids_limit.to_string());
        }
        if spec.read_only_rootfs {
            args.push("--read-only".into());
            // Engines still need somewhere to write scratch files; a
            // tmpfs keeps the rootfs itself immutable.
            args.push("--tmpfs".into());
            args.push("/tmp:rw,noexec,nosuid,size=64m".into());
        }
        for (k, v) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{k}={v}"));
        }
        args.push(spec.image.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs).await?;
        if !output.status.success() {
            return Err(OrchestratorError::OperationFailed {
                op: "create".into(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn start(&self, container_id: &str) -> OrchestratorResult<()> {
        let output = self.run(&["start", container_id]).await?;
        if !output.status.success() {
            return Err(OrchestratorError::OperationFailed {
                op: "start".into(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn stop(&self, container_id: &str, timeout_s: u64) -> OrchestratorResult<()> {
        let timeout_arg = timeout_s.to_string();
        let output = self.run(&["stop", "-t", &timeout_arg, container_id]).await?;
        if !output.status.success() {
            return Err(OrchestratorError::OperationFailed {
                op: "stop".into(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn remove(&self, container_id: &str, force: bool) -> OrchestratorResult<()> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(container_id);
        let output = self.run(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if stderr.contains("no such container") {
                return Err(OrchestratorError::ContainerNotFound { container_id: container_id.to_string() });
            }
            return Err(OrchestratorError::OperationFailed {
                op: "remove".into(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> OrchestratorResult<ContainerState> {
        let output = self.run(&["inspect", container_id]).await?;
        if !output.status.success() {
            return Err(OrchestratorError::ContainerNotFound { container_id: container_id.to_string() });
        }
        let entries: Vec<PodmanInspectEntry> = serde_json::from_slice(&output.stdout).map_err(|e| {
            OrchestratorError::OperationFailed {
                op: "inspect".into(),
                exit_code: 0,
                stderr: format!("malformed inspect output: {e}"),
            }
        })?;
        let state = entries
            .first()
            .map(|e| match e.state.status.as_str() {
                "created" => ContainerState::Created,
                "running" => ContainerState::Running,
                "paused" => ContainerState::Paused,
                "exited" => ContainerState::Exited,
                "dead" => ContainerState::Dead,
                _ => ContainerState::Unknown,
            })
            .unwrap_or(ContainerState::Unknown);
        Ok(state)
    }

    async fn exec(&self, container_id: &str, command: &CommandSpec) -> OrchestratorResult<ExecOutput> {
        let mut args: Vec<String> = vec!["exec".into(), container_id.into(), command.program.clone()];
        args.extend(command.args.iter().cloned());

        let fut = self.command().args(&args).output();
        let output = timeout(Duration::from_secs(self.default_exec_timeout_s), fut)
            .await
            .map_err(|_| OrchestratorError::ExecTimeout {
                container_id: container_id.to_string(),
                timeout_s: self.default_exec_timeout_s,
            })?
            .map_err(OrchestratorError::Io)?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn logs(&self, container_id: &str, opts: LogOptions) -> OrchestratorResult<String> {
        let mut args = vec!["logs".to_string()];
        if let Some(tail) = opts.tail {
            args.push("--tail".into());
            args.push(tail.to_string());
        }
        if let Some(since) = opts.since_seconds {
            args.push("--since".into());
            args.push(format!("{since}s"));
        }
        if let Some(until) = opts.until_seconds {
            args.push("--until".into());
            args.push(format!("{until}s"));
        }
        args.push(container_id.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs).await?;
        if !output.status.success() {
            return Err(OrchestratorError::OperationFailed {
                op: "logs".into(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if let Some(level) = &opts.level {
            combined = combined
                .lines()
                .filter(|line| line.to_ascii_lowercase().contains(&level.to_ascii_lowercase()))
                .collect::<Vec<_>>()
                .join("\n");
        }
        Ok(combined)
    }

    async fn stats(&self, container_id: &str) -> OrchestratorResult<ContainerStats> {
        let output = self
            .run(&["stats", "--no-stream", "--format", "json", container_id])
            .await?;
        if !output.status.success() {
            return Err(OrchestratorError::OperationFailed {
                op: "stats".into(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let entries: Vec<PodmanStatsEntry> = serde_json::from_slice(&output.stdout).map_err(|e| {
            OrchestratorError::OperationFailed {
                op: "stats".into(),
                exit_code: 0,
                stderr: format!("malformed stats output: {e}"),
            }
        })?;
        let entry = entries.first().ok_or_else(|| OrchestratorError::ContainerNotFound {
            container_id: container_id.to_string(),
        })?;

        let cpu_percent = entry.cpu.trim_end_matches('%').parse().unwrap_or(0.0);
        let (used_mb, limit_mb) = parse_mem_usage(&entry.mem_usage);

        Ok(ContainerStats { cpu_percent, memory_used_mb: used_mb, memory_limit_mb: limit_mb, uptime_seconds: None })
    }
}

/// Parses podman's `"12.3MiB / 256MiB"` mem-usage string into (used, limit)
/// megabytes.
fn parse_mem_usage(raw: &str) -> (i64, i64) {
    let mut parts = raw.split('/').map(str::trim);
    let used = parts.next().map(parse_mem_token).unwrap_or(0);
    let limit = parts.next().map(parse_mem_token).unwrap_or(0);
    (used, limit)
}

fn parse_mem_token(token: &str) -> i64 {
    let token = token.trim();
    let (num, unit) = token.split_at(token.find(|c: char| c.is_alphabetic()).unwrap_or(token.len()));
    let value: f64 = num.trim().parse().unwrap_or(0.0);
    let mb = match unit.trim() {
        "GiB" | "GB" => value * 1024.0,
        "KiB" | "KB" => value / 1024.0,
        _ => value,
    };
    mb as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mem_usage_pair() {
        let (used, limit) = parse_mem_usage("12.3MiB / 256MiB");
        assert_eq!(used, 12);
        assert_eq!(limit, 256);
    }

    #[test]
    fn parses_gib_units() {
        let (used, limit) = parse_mem_usage("1.5GiB / 4GiB");
        assert_eq!(used, 1536);
        assert_eq!(limit, 4096);
    }
}
