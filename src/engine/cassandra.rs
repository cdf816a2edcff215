use super::{
    CommandSpec, EngineAdapter, EngineCapabilities, EngineError, EngineMetrics, EngineResult,
    ImageReference, ProvisionSpec,
};
use crate::credential::CharsetConstraints;
use crate::model::{EngineFamily, Instance, SchedulingHints};

pub struct CassandraAdapter;

impl EngineAdapter for CassandraAdapter {
    fn tag(&self) -> &'static str {
        "cassandra"
    }

    fn family(&self) -> EngineFamily {
        EngineFamily::WideColumn
    }

    fn image_reference(&self) -> ImageReference {
        ImageReference { repository: "docker.io/library/cassandra".into(), tag: "5.0".into() }
    }

    fn default_port(&self) -> u16 {
        9042
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { logical_databases: true, users: true, backup: true, embedded: false }
    }

    fn charset_constraints(&self) -> CharsetConstraints {
        CharsetConstraints::default()
    }

    fn snapshot_extension(&self) -> &'static str {
        "tar.gz"
    }

    fn container_env(&self, _spec: &ProvisionSpec) -> Vec<(String, String)> {
        vec![("CASSANDRA_START_RPC".into(), "false".into())]
    }

    fn render_config(&self, spec: &ProvisionSpec, hints: &SchedulingHints) -> EngineResult<Vec<u8>> {
        if spec.memory_limit_mb < 512 {
            return Err(EngineError::ConfigInvalid {
                field: "memory_limit_mb".into(),
                message: "cassandra requires at least 512 MiB".into(),
            });
        }
        let heap_mb = (spec.memory_limit_mb / 2).max(256);
        let body = format!(
            "# rendered by dbaas-control-plane, do not edit by hand\n\
             -Xms{heap_mb}M\n-Xmx{heap_mb}M\n\
             # cpu_shares={cpu_shares}\n",
            cpu_shares = hints.cpu_shares,
        );
        Ok(body.into_bytes())
    }

    fn config_mount_path(&self) -> &'static str {
        "/etc/cassandra/jvm-server.options"
    }

    fn connection_string(&self, instance: &Instance) -> String {
        format!(
            "cassandra://{}:{}@{}:{}/{}",
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
                    "nodetool snapshot -t dbaas_snap {} && tar czf {} -C /var/lib/cassandra/data .",
                    instance.database_name, dest_path
                ),
            ],
        )
    }

    fn restore_command(&self, _instance: &Instance, source_path: &str) -> CommandSpec {
        CommandSpec::new("tar", vec!["xzf".into(), source_path.into(), "-C".into(), "/var/lib/cassandra/data".into()])
    }

    fn health_probe_command(&self, _instance: &Instance) -> CommandSpec {
        CommandSpec::new("nodetool", vec!["status".into()])
    }

    fn metrics_commands(&self, _instance: &Instance) -> Vec<CommandSpec> {
        vec![CommandSpec::new("nodetool", vec!["info".into()])]
    }

    fn parse_metrics(&self, _outputs: &[String]) -> EngineMetrics {
        // `nodetool info` doesn't expose a connection count comparable to
        // the client-count metrics the other adapters report; left unset
        // rather than guessed.
        EngineMetrics::default()
    }

    fn rotate_credentials_command(&self, instance: &Instance, new_password: &str) -> CommandSpec {
        CommandSpec::new(
            "cqlsh",
            vec![
                "-u".into(),
                instance.username.clone(),
                "-p".into(),
                instance.password.clone(),
                "-e".into(),
                format!("ALTER ROLE {} WITH PASSWORD = '{}';", instance.username, new_password),
            ],
        )
    }
}
