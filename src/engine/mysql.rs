use super::{
    CommandSpec, EngineAdapter, EngineCapabilities, EngineError, EngineMetrics, EngineResult,
    ImageReference, ProvisionSpec,
};
use crate::credential::CharsetConstraints;
use crate::model::{EngineFamily, Instance, SchedulingHints};

pub struct MysqlAdapter;

impl EngineAdapter for MysqlAdapter {
    fn tag(&self) -> &'static str {
        "mysql"
    }

    fn family(&self) -> EngineFamily {
        EngineFamily::Relational
    }

    fn image_reference(&self) -> ImageReference {
        ImageReference { repository: "docker.io/library/mysql".into(), tag: "8.4".into() }
    }

    fn default_port(&self) -> u16 {
        3306
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { logical_databases: true, users: true, backup: true, embedded: false }
    }

    fn charset_constraints(&self) -> CharsetConstraints {
        // MySQL's authentication_string is more finicky about quote
        // characters than Postgres; keep the symbol set conservative.
        CharsetConstraints { allow_symbols: true, min_length: 20, max_length: 28 }
    }

    fn snapshot_extension(&self) -> &'static str {
        "sql"
    }

    fn container_env(&self, spec: &ProvisionSpec) -> Vec<(String, String)> {
        vec![
            ("MYSQL_DATABASE".into(), spec.database_name.clone()),
            ("MYSQL_USER".into(), spec.username.clone()),
            ("MYSQL_PASSWORD".into(), spec.password.clone()),
            ("MYSQL_RANDOM_ROOT_PASSWORD".into(), "yes".into()),
        ]
    }

    fn render_config(&self, spec: &ProvisionSpec, hints: &SchedulingHints) -> EngineResult<Vec<u8>> {
        if spec.memory_limit_mb < 64 {
            return Err(EngineError::ConfigInvalid {
                field: "memory_limit_mb".into(),
                message: "mysql requires at least 64 MiB".into(),
            });
        }
        let buffer_pool_mb = (spec.memory_limit_mb / 2).max(16);
        let body = format!(
            "# rendered by dbaas-control-plane, do not edit by hand\n\
             [mysqld]\n\
             bind-address = 0.0.0.0\n\
             innodb_buffer_pool_size = {buffer_pool_mb}M\n\
             max_connections = 100\n\
             require_secure_transport = {tls}\n\
             # cpu_shares={cpu_shares}\n",
            tls = if spec.tls_enabled { "ON" } else { "OFF" },
            cpu_shares = hints.cpu_shares,
        );
        Ok(body.into_bytes())
    }

    fn config_mount_path(&self) -> &'static str {
        "/etc/mysql/conf.d/dbaas-override.cnf"
    }

    fn connection_string(&self, instance: &Instance) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
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
                    "mysqldump -u{} -p{} {} > {}",
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
                    "mysql -u{} -p{} {} < {}",
                    instance.username, instance.password, instance.database_name, source_path
                ),
            ],
        )
    }

    fn health_probe_command(&self, instance: &Instance) -> CommandSpec {
        CommandSpec::new(
            "mysqladmin",
            vec!["ping".into(), "-u".into(), instance.username.clone(), format!("-p{}", instance.password)],
        )
    }

    fn metrics_commands(&self, instance: &Instance) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "mysql",
            vec![
                "-u".into(),
                instance.username.clone(),
                format!("-p{}", instance.password),
                "-N".into(),
                "-e".into(),
                "show status where Variable_name in ('Threads_connected');".into(),
            ],
        )]
    }

    fn parse_metrics(&self, outputs: &[String]) -> EngineMetrics {
        let mut m = EngineMetrics::default();
        if let Some(out) = outputs.first() {
            for line in out.lines() {
                let mut cols = line.split_whitespace();
                if let (Some("Threads_connected"), Some(v)) = (cols.next(), cols.next()) {
                    m.connections = v.parse().ok();
                }
            }
        }
        m
    }

    fn rotate_credentials_command(&self, instance: &Instance, new_password: &str) -> CommandSpec {
        CommandSpec::new(
            "mysql",
            vec![
                "-u".into(),
                "root".into(),
                "-e".into(),
                format!(
                    "ALTER USER '{}'@'%' IDENTIFIED BY '{}';",
                    instance.username, new_password
                ),
            ],
        )
    }
}
