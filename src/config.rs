use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment-derived configuration (spec §6 "Environment / config knobs").
///
/// Loaded once at startup the same way the teacher's own
/// `todo_backend_postgresql::config::AppConfig::from_env` reads its
/// environment, with `dotenvy` picking up a local `.env` file if present.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub data_root: PathBuf,
    pub runtime_socket: Option<String>,
    /// Container runtime binary to invoke (spec §4.3 "rootless container
    /// runtime"). Defaults to `podman`, overridable for tests/alternate
    /// hosts.
    pub container_bin: String,
    pub default_host_ip: String,
    pub vnet_default_name: Option<String>,

    pub health_interval_s: u64,
    pub metrics_interval_s: u64,
    pub metrics_retention_days: u64,
    pub health_sample_retention: u64,
    pub image_pull_timeout_s: u64,

    /// Per-engine readiness timeout override, spec §4.2 "default 120 s for
    /// relational, 300 s for search/analytical".
    pub readiness_timeout_s: HashMap<String, u64>,
    pub default_readiness_timeout_s: u64,

    pub probe_pool_size: usize,
    pub auto_restart_enabled: bool,
    pub health_failure_threshold: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("DBAAS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_parse("DBAAS_PORT", 8080)?;

        let data_root = env::var("DBAAS_DATA_ROOT")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        let runtime_socket = env::var("DBAAS_RUNTIME_SOCKET").ok();
        let container_bin = env::var("DBAAS_CONTAINER_BIN").unwrap_or_else(|_| "podman".to_string());
        let default_host_ip = env::var("DBAAS_DEFAULT_HOST_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let vnet_default_name = env::var("DBAAS_VNET_DEFAULT_NAME").ok();

        let health_interval_s = env_parse("DBAAS_HEALTH_INTERVAL_S", 30)?;
        let metrics_interval_s = env_parse("DBAAS_METRICS_INTERVAL_S", 10)?;
        let metrics_retention_days = env_parse("DBAAS_METRICS_RETENTION_DAYS", 30)?;
        let health_sample_retention = env_parse("DBAAS_HEALTH_SAMPLE_RETENTION", 1000)?;
        let image_pull_timeout_s = env_parse("DBAAS_IMAGE_PULL_TIMEOUT_S", 360)?;

        let default_readiness_timeout_s = env_parse("DBAAS_READINESS_TIMEOUT_S", 120)?;
        let search_analytical_timeout_s = env_parse("DBAAS_READINESS_TIMEOUT_SEARCH_S", 300)?;
        let mut readiness_timeout_s = HashMap::new();
        readiness_timeout_s.insert("clickhouse".to_string(), search_analytical_timeout_s);

        let probe_pool_size = env_parse("DBAAS_PROBE_POOL_SIZE", 16)?;
        let auto_restart_enabled = env::var("DBAAS_AUTO_RESTART_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let health_failure_threshold = env_parse("DBAAS_HEALTH_FAILURE_THRESHOLD", 3)?;

        Ok(Self {
            host,
            port,
            data_root,
            runtime_socket,
            container_bin,
            default_host_ip,
            vnet_default_name,
            health_interval_s,
            metrics_interval_s,
            metrics_retention_days,
            health_sample_retention,
            image_pull_timeout_s,
            readiness_timeout_s,
            default_readiness_timeout_s,
            probe_pool_size,
            auto_restart_enabled,
            health_failure_threshold,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_root.join("instances.db")
    }

    pub fn containers_dir(&self) -> PathBuf {
        self.data_root.join("containers")
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.data_root.join("volumes")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_root.join("snapshots")
    }

    pub fn tls_dir(&self) -> PathBuf {
        self.data_root.join("tls")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_root.join("logs")
    }

    pub fn readiness_timeout(&self, engine: &str) -> Duration {
        Duration::from_secs(
            *self
                .readiness_timeout_s
                .get(engine)
                .unwrap_or(&self.default_readiness_timeout_s),
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} invalid: {e}"))
            .context(format!("parsing {key}")),
        Err(_) => Ok(default),
    }
}
