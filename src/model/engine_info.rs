use serde::Serialize;

/// Variant family a database engine belongs to (spec §4.1 design rationale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFamily {
    Relational,
    Document,
    KeyValue,
    WideColumn,
    TimeSeries,
    Search,
    Graph,
    Analytical,
    Embedded,
}

/// Static description of a registered adapter, returned by `ListEngines()`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub tag: String,
    pub family: EngineFamily,
    pub default_port: u16,
    pub supports_logical_databases: bool,
    pub supports_users: bool,
    pub supports_backup: bool,
    pub embedded: bool,
    pub readiness_timeout_s: u64,
}

/// Permission names consumed by the host-supplied predicate (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "dbaas:read",
            Permission::Write => "dbaas:write",
        }
    }
}

/// Static host-capacity summary returned by `HostCapacity()`.
#[derive(Debug, Clone, Serialize)]
pub struct HostCapacity {
    pub total_memory_mb: i64,
    pub allocated_memory_mb: i64,
    pub total_cpu: f64,
    pub allocated_cpu: f64,
    pub instance_count: i64,
}
