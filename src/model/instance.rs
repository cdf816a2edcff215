use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states an [`Instance`] can occupy. The Lifecycle Manager is the
/// only writer of this field; see `crate::lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Creating,
    Starting,
    Running,
    Stopping,
    Stopped,
    Restarting,
    Failed,
    Destroying,
    Destroyed,
}

impl InstanceStatus {
    /// Terminal states may never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Destroyed)
    }

    pub fn is_destroyed(self) -> bool {
        matches!(self, InstanceStatus::Destroyed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Creating => "creating",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Restarting => "restarting",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Destroying => "destroying",
            InstanceStatus::Destroyed => "destroyed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => InstanceStatus::Pending,
            "creating" => InstanceStatus::Creating,
            "starting" => InstanceStatus::Starting,
            "running" => InstanceStatus::Running,
            "stopping" => InstanceStatus::Stopping,
            "stopped" => InstanceStatus::Stopped,
            "restarting" => InstanceStatus::Restarting,
            "failed" => InstanceStatus::Failed,
            "destroying" => InstanceStatus::Destroying,
            "destroyed" => InstanceStatus::Destroyed,
            _ => return None,
        })
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for InstanceStatus {
    fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for InstanceStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for InstanceStatus {
    fn decode(
        value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <&str as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
        InstanceStatus::parse(s).ok_or_else(|| format!("unknown instance status: {s}").into())
    }
}

/// The central entity: a managed database running inside a container.
///
/// `password` is stored in cleartext by design — see spec §7 / §9 open
/// question 1: the security model is single-tenant per host.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Instance {
    pub id: i64,
    pub name: String,
    pub container_id: Option<String>,

    pub engine: String,
    pub sku: String,
    pub database_name: String,
    pub username: String,
    pub password: String,

    pub host: String,
    pub port: i64,
    pub volume_path: String,
    pub vnet_name: Option<String>,
    pub vnet_ip: Option<String>,

    pub memory_limit_mb: i64,
    pub cpu_limit: f64,
    pub storage_limit_gb: i64,
    pub external_access: bool,
    pub tls_enabled: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub status: InstanceStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    pub fn connection_host_ip(&self) -> &str {
        if self.external_access { "0.0.0.0" } else { "127.0.0.1" }
    }
}

/// Request body for `POST /instances` (spec §6 `CreateSpec`).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSpec {
    pub engine: String,
    pub name: Option<String>,
    pub database_name: String,
    pub sku: String,
    pub memory_limit_mb: Option<i64>,
    pub cpu_limit: Option<f64>,
    pub storage_limit_gb: Option<i64>,
    #[serde(default)]
    pub external_access: bool,
    #[serde(default)]
    pub tls_enabled: bool,
    pub tls_cert: Option<Vec<u8>>,
    pub tls_key: Option<Vec<u8>>,
    pub vnet_name: Option<String>,
}

/// Filter accepted by `List(filter)` (spec §4.8).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFilter {
    pub engine: Option<String>,
    pub status: Option<InstanceStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
