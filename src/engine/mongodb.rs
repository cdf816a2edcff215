use super::{
    CommandSpec, EngineAdapter, EngineCapabilities, EngineError, EngineMetrics, EngineResult,
    ImageReference, ProvisionSpec,
};
use crate::credential::CharsetConstraints;
use crate::model::{EngineFamily, Instance, SchedulingHints};

pub struct MongoAdapter;

impl EngineAdapter for MongoAdapter {
    fn tag(&self) -> &'static str {
        "mongodb"
    }

    fn family(&self) -> EngineFamily {
        EngineFamily::Document
    }

    fn image_reference(&self) -> ImageReference {
        ImageReference { repository: "docker.io/library/mongo".into(), tag: "7.0".into() }
    }

    fn default_port(&self) -> u16 {
        27017
    }

    fn capabilities(&self) -> EngineCapabilities {
        // Mongo's notion of a "database" is created implicitly on first
        // write, and there is no separate CREATE USER DDL surfaced here —
        // the single application user is provisioned via --auth at startup.
        EngineCapabilities { logical_databases: false, users: false, backup: true, embedded: false }
    }

    fn charset_constraints(&self) -> CharsetConstraints {
        CharsetConstraints::default()
    }

    fn snapshot_extension(&self) -> &'static str {
        "archive"
    }

    fn container_env(&self, spec: &ProvisionSpec) -> Vec<(String, String)> {
        vec![
            ("MONGO_INITDB_ROOT_USERNAME".into(), spec.username.clone()),
            ("MONGO_INITDB_ROOT_PASSWORD".into(), spec.password.clone()),
            ("MONGO_INITDB_DATABASE".into(), spec.database_name.clone()),
        ]
    }

    fn render_config(&self, spec: &ProvisionSpec, _hints: &SchedulingHints) -> EngineResult<Vec<u8>> {
        if spec.memory_limit_mb < 128 {
            return Err(EngineError::ConfigInvalid {
                field: "memory_limit_mb".into(),
                message: "mongodb requires at least 128 MiB".into(),
            });
        }
        let cache_gb = (spec.memory_limit_mb as f64 / 1024.0 / 2.0).max(0.25);
        let body = format!(
            "# rendered by dbaas-control-plane, do not edit by hand\n\
             storage:\n  wiredTiger:\n    engineConfig:\n      cacheSizeGB: {cache_gb:.2}\n\
             net:\n  bindIp: 0.0.0.0\n  tls:\n    mode: {tls}\n",
            tls = if spec.tls_enabled { "requireTLS" } else { "disabled" },
        );
        Ok(body.into_bytes())
    }

    fn config_mount_path(&self) -> &'static str {
        "/etc/mongod.conf"
    }

    fn connection_string(&self, instance: &Instance) -> String {
        format!(
            "mongodb://{}:{}@{}:{}/{}?authSource=admin",
            instance.username,
            instance.password,
            instance.connection_host_ip(),
            instance.port,
            instance.database_name,
        )
    }

    fn snapshot_command(&self, instance: &Instance, dest_path: &str) -> CommandSpec {
        CommandSpec::new(
            "mongodump",
            vec![
                "--uri".into(),
                self.connection_string(instance),
                "--archive".into(),
                dest_path.into(),
                "--gzip".into(),
            ],
        )
    }

    fn restore_command(&self, instance: &Instance, source_path: &str) -> CommandSpec {
        CommandSpec::new(
            "mongorestore",
            vec![
                "--uri".into(),
                self.connection_string(instance),
                "--archive".into(),
                source_path.into(),
                "--gzip".into(),
                "--drop".into(),
            ],
        )
    }

    fn health_probe_command(&self, instance: &Instance) -> CommandSpec {
        CommandSpec::new(
            "mongosh",
            vec![
                self.connection_string(instance),
                "--quiet".into(),
                "--eval".into(),
                "db.adminCommand('ping')".into(),
            ],
        )
    }

    fn metrics_commands(&self, instance: &Instance) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "mongosh",
            vec![
                self.connection_string(instance),
                "--quiet".into(),
                "--eval".into(),
                "JSON.stringify(db.serverStatus().connections)".into(),
            ],
        )]
    }

    fn parse_metrics(&self, outputs: &[String]) -> EngineMetrics {
        let mut m = EngineMetrics::default();
        if let Some(out) = outputs.first() {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(out.trim()) {
                m.connections = v.get("current").and_then(|n| n.as_i64());
            }
        }
        m
    }

    fn rotate_credentials_command(&self, instance: &Instance, new_password: &str) -> CommandSpec {
        CommandSpec::new(
            "mongosh",
            vec![
                self.connection_string(instance),
                "--quiet".into(),
                "--eval".into(),
                format!(
                    "db.getSiblingDB('admin').changeUserPassword('{}', '{}')",
                    instance.username, new_password
                ),
            ],
        )
    }
}
