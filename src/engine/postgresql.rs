use super::{
    CommandSpec, EngineAdapter, EngineCapabilities, EngineError, EngineMetrics, EngineResult,
    ImageReference, ProvisionSpec,
};
use crate::credential::CharsetConstraints;
use crate::model::{EngineFamily, Instance, SchedulingHints};

pub struct PostgresAdapter;

impl EngineAdapter for PostgresAdapter {
    fn tag(&self) -> &'static str {
        "postgresql"
    }

    fn family(&self) -> EngineFamily {
        EngineFamily::Relational
    }

    fn image_reference(&self) -> ImageReference {
        ImageReference { repository: "docker.io/library/postgres".into(), tag: "16-alpine".into() }
    }

    fn default_port(&self) -> u16 {
        5432
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { logical_databases: true, users: true, backup: true, embedded: false }
    }

    fn charset_constraints(&self) -> CharsetConstraints {
        CharsetConstraints::default()
    }

    fn snapshot_extension(&self) -> &'static str {
        "sql"
    }

    fn container_env(&self, spec: &ProvisionSpec) -> Vec<(String, String)> {
        vec![
            ("POSTGRES_DB".into(), spec.database_name.clone()),
            ("POSTGRES_USER".into(), spec.username.clone()),
            ("POSTGRES_PASSWORD".into(), spec.password.clone()),
        ]
    }

    fn render_config(&self, spec: &ProvisionSpec, hints: &SchedulingHints) -> EngineResult<Vec<u8>> {
        if spec.memory_limit_mb < 64 {
            return Err(EngineError::ConfigInvalid {
                field: "memory_limit_mb".into(),
                message: "postgresql requires at least 64 MiB".into(),
            });
        }
        let shared_buffers_mb = (spec.memory_limit_mb / 4).max(16);
        let effective_cache_mb = (spec.memory_limit_mb * 3 / 4).max(16);
        let ssl = if spec.tls_enabled { "on" } else { "off" };
        let body = format!(
            "# rendered by dbaas-control-plane, do not edit by hand\n\
             listen_addresses = '*'\n\
             shared_buffers = {shared_buffers_mb}MB\n\
             effective_cache_size = {effective_cache_mb}MB\n\
             ssl = {ssl}\n\
             max_connections = 100\n\
             # scheduling hints: cpu_shares={cpu_shares} oom_score_adj={oom:?}\n",
            cpu_shares = hints.cpu_shares,
            oom = hints.oom_score_adj,
        );
        Ok(body.into_bytes())
    }

    fn config_mount_path(&self) -> &'static str {
        "/etc/postgresql/postgresql.conf"
    }

    fn connection_string(&self, instance: &Instance) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            instance.username,
            instance.password,
            instance.connection_host_ip(),
            instance.port,
            instance.database_name,
        )
    }

    fn snapshot_command(&self, instance: &Instance, dest_path: &str) -> CommandSpec {
        CommandSpec::new(
            "pg_dump",
            vec![
                "-U".into(),
                instance.username.clone(),
                "-d".into(),
                instance.database_name.clone(),
                "-F".into(),
                "p".into(),
                "-f".into(),
                dest_path.into(),
            ],
        )
    }

    fn restore_command(&self, instance: &Instance, source_path: &str) -> CommandSpec {
        CommandSpec::new(
            "psql",
            vec![
                "-U".into(),
                instance.username.clone(),
                "-d".into(),
                instance.database_name.clone(),
                "-f".into(),
                source_path.into(),
            ],
        )
    }

    fn health_probe_command(&self, instance: &Instance) -> CommandSpec {
        CommandSpec::new(
            "pg_isready",
            vec!["-U".into(), instance.username.clone(), "-d".into(), instance.database_name.clone()],
        )
    }

    fn metrics_commands(&self, instance: &Instance) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "psql",
            vec![
                "-U".into(),
                instance.username.clone(),
                "-d".into(),
                instance.database_name.clone(),
                "-tA".into(),
                "-c".into(),
                "select count(*), \
                 coalesce(sum(blks_hit),0)::float / nullif(sum(blks_hit + blks_read), 0) \
                 from pg_stat_activity, pg_stat_database where pg_stat_database.datname = current_database();"
                    .into(),
            ],
        )]
    }

    fn parse_metrics(&self, outputs: &[String]) -> EngineMetrics {
        let mut m = EngineMetrics::default();
        if let Some(line) = outputs.first().and_then(|o| o.lines().next()) {
            let mut parts = line.split('|');
            m.connections = parts.next().and_then(|p| p.trim().parse().ok());
            m.cache_hit_ratio = parts.next().and_then(|p| p.trim().parse().ok());
        }
        m
    }

    fn rotate_credentials_command(&self, instance: &Instance, new_password: &str) -> CommandSpec {
        CommandSpec::new(
            "psql",
            vec![
                "-U".into(),
                instance.username.clone(),
                "-d".into(),
                instance.database_name.clone(),
                "-c".into(),
                format!("ALTER USER \"{}\" WITH PASSWORD '{}';", instance.username, new_password),
            ],
        )
    }
}
