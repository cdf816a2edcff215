use super::{
    CommandSpec, EngineAdapter, EngineCapabilities, EngineError, EngineMetrics, EngineResult,
    ImageReference, ProvisionSpec,
};
use crate::credential::CharsetConstraints;
use crate::model::{EngineFamily, Instance, SchedulingHints};

pub struct RedisAdapter;

impl EngineAdapter for RedisAdapter {
    fn tag(&self) -> &'static str {
        "redis"
    }

    fn family(&self) -> EngineFamily {
        EngineFamily::KeyValue
    }

    fn image_reference(&self) -> ImageReference {
        ImageReference { repository: "docker.io/library/redis".into(), tag: "7.2-alpine".into() }
    }

    fn default_port(&self) -> u16 {
        6379
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { logical_databases: false, users: false, backup: true, embedded: false }
    }

    fn charset_constraints(&self) -> CharsetConstraints {
        // requirepass can't contain whitespace or unescaped quotes safely
        // across redis.conf and redis-cli invocations.
        CharsetConstraints { allow_symbols: false, min_length: 24, max_length: 32 }
    }

    fn snapshot_extension(&self) -> &'static str {
        "rdb"
    }

    fn container_env(&self, _spec: &ProvisionSpec) -> Vec<(String, String)> {
        Vec::new()
    }

    fn render_config(&self, spec: &ProvisionSpec, _hints: &SchedulingHints) -> EngineResult<Vec<u8>> {
        if spec.memory_limit_mb < 16 {
            return Err(EngineError::ConfigInvalid {
                field: "memory_limit_mb".into(),
                message: "redis requires at least 16 MiB".into(),
            });
        }
        let maxmemory_mb = (spec.memory_limit_mb * 9 / 10).max(8);
        let body = format!(
            "# rendered by dbaas-control-plane, do not edit by hand\n\
             bind 0.0.0.0\n\
             requirepass {password}\n\
             maxmemory {maxmemory_mb}mb\n\
             maxmemory-policy allkeys-lru\n\
             appendonly yes\n",
            password = spec.password,
        );
        Ok(body.into_bytes())
    }

    fn config_mount_path(&self) -> &'static str {
        "/usr/local/etc/redis/redis.conf"
    }

    fn connection_string(&self, instance: &Instance) -> String {
        format!(
            "redis://:{}@{}:{}/0",
            instance.password,
            instance.connection_host_ip(),
            instance.port,
        )
    }

    fn snapshot_command(&self, instance: &Instance, dest_path: &str) -> CommandSpec {
        CommandSpec::new(
            "sh",
            vec![
                "-c".into(),
                format!(
                    "redis-cli -a {} --no-auth-warning SAVE && cp /data/dump.rdb {}",
                    instance.password, dest_path
                ),
            ],
        )
    }

    fn restore_command(&self, instance: &Instance, source_path: &str) -> CommandSpec {
        // Redis only loads dump.rdb at startup; restoring means placing the
        // file and letting the lifecycle manager restart the container.
        let _ = &instance.password;
        CommandSpec::new("cp", vec![source_path.into(), "/data/dump.rdb".into()])
    }

    fn health_probe_command(&self, instance: &Instance) -> CommandSpec {
        CommandSpec::new(
            "redis-cli",
            vec!["-a".into(), instance.password.clone(), "--no-auth-warning".into(), "PING".into()],
        )
    }

    fn metrics_commands(&self, instance: &Instance) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "redis-cli",
            vec![
                "-a".into(),
                instance.password.clone(),
                "--no-auth-warning".into(),
                "INFO".into(),
                "clients".into(),
            ],
        )]
    }

    fn parse_metrics(&self, outputs: &[String]) -> EngineMetrics {
        let mut m = EngineMetrics::default();
        if let Some(out) = outputs.first() {
            for line in out.lines() {
                if let Some(v) = line.strip_prefix("connected_clients:") {
                    m.connections = v.trim().parse().ok();
                }
            }
        }
        m
    }

    fn rotate_credentials_command(&self, instance: &Instance, new_password: &str) -> CommandSpec {
        CommandSpec::new(
            "redis-cli",
            vec![
                "-a".into(),
                instance.password.clone(),
                "--no-auth-warning".into(),
                "CONFIG".into(),
                "SET".into(),
                "requirepass".into(),
                new_password.into(),
            ],
        )
    }
}
