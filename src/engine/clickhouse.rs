use super::{
    CommandSpec, EngineAdapter, EngineCapabilities, EngineError, EngineMetrics, EngineResult,
    ImageReference, ProvisionSpec,
};
use crate::credential::CharsetConstraints;
use crate::model::{EngineFamily, Instance, SchedulingHints};

pub struct ClickhouseAdapter;

impl EngineAdapter for ClickhouseAdapter {
    fn tag(&self) -> &'static str {
        "clickhouse"
    }

    fn family(&self) -> EngineFamily {
        EngineFamily::Analytical
    }

    fn image_reference(&self) -> ImageReference {
        ImageReference { repository: "docker.io/clickhouse/clickhouse-server".into(), tag: "24.8".into() }
    }

    fn default_port(&self) -> u16 {
        9000
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { logical_databases: true, users: true, backup: true, embedded: false }
    }

    fn charset_constraints(&self) -> CharsetConstraints {
        CharsetConstraints::default()
    }

    fn snapshot_extension(&self) -> &'static str {
        "native"
    }

    fn container_env(&self, spec: &ProvisionSpec) -> Vec<(String, String)> {
        vec![
            ("CLICKHOUSE_DB".into(), spec.database_name.clone()),
            ("CLICKHOUSE_USER".into(), spec.username.clone()),
            ("CLICKHOUSE_PASSWORD".into(), spec.password.clone()),
        ]
    }

    fn render_config(&self, spec: &ProvisionSpec, _hints: &SchedulingHints) -> EngineResult<Vec<u8>> {
        if spec.memory_limit_mb < 256 {
            return Err(EngineError::ConfigInvalid {
                field: "memory_limit_mb".into(),
                message: "clickhouse requires at least 256 MiB".into(),
            });
        }
        let max_server_mem_bytes = spec.memory_limit_mb as i64 * 9 / 10 * 1024 * 1024;
        let body = format!(
            "<clickhouse>\n  <max_server_memory_usage>{max_server_mem_bytes}</max_server_memory_usage>\n\
             </clickhouse>\n",
        );
        Ok(body.into_bytes())
    }

    fn config_mount_path(&self) -> &'static str {
        "/etc/clickhouse-server/conf.d/dbaas-override.xml"
    }

    fn connection_string(&self, instance: &Instance) -> String {
        format!(
            "clickhouse://{}:{}@{}:{}/{}",
            instance.username,
            instance.password,
            instance.connection_host_ip(),
            instance.port,
            instance.database_name,
        )
    }

    fn snapshot_command(&self, instance: &Instance, dest_path: &str) -> CommandSpec {
        CommandSpec::new(
            "sh",
            vec![
                "-c".into(),
                format!(
                    "clickhouse-client --user {} --password {} --query \"SELECT * FROM {} FORMAT Native\" > {}",
                    instance.username, instance.password, instance.database_name, dest_path
                ),
            ],
        )
    }

    fn restore_command(&self, instance: &Instance, source_path: &str) -> CommandSpec {
        CommandSpec::new(
            "sh",
            vec![
                "-c".into(),
                format!(
                    "clickhouse-client --user {} --password {} --query \"INSERT INTO {} FORMAT Native\" < {}",
                    instance.username, instance.password, instance.database_name, source_path
                ),
            ],
        )
    }

    fn health_probe_command(&self, instance: &Instance) -> CommandSpec {
        CommandSpec::new(
            "clickhouse-client",
            vec![
                "--user".into(),
                instance.username.clone(),
                "--password".into(),
                instance.password.clone(),
                "--query".into(),
                "SELECT 1".into(),
            ],
        )
    }

    fn metrics_commands(&self, instance: &Instance) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "clickhouse-client",
            vec![
                "--user".into(),
                instance.username.clone(),
                "--password".into(),
                instance.password.clone(),
                "--query".into(),
                "SELECT count() FROM system.processes".into(),
            ],
        )]
    }

    fn parse_metrics(&self, outputs: &[String]) -> EngineMetrics {
        let mut m = EngineMetrics::default();
        m.active_queries = outputs.first().and_then(|o| o.trim().parse().ok());
        m
    }

    fn rotate_credentials_command(&self, instance: &Instance, new_password: &str) -> CommandSpec {
        CommandSpec::new(
            "clickhouse-client",
            vec![
                "--query".into(),
                format!(
                    "ALTER USER {} IDENTIFIED WITH plaintext_password BY '{}';",
                    instance.username, new_password
                ),
            ],
        )
    }
}
