use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point-in-time engine-native backup (spec §3 `Snapshot`).
///
/// Invariant: the file at `path` exists iff this row exists — enforced by
/// `crate::snapshot_service` (file-first delete, no-row-until-file-exists
/// create).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Snapshot {
    pub id: i64,
    pub instance_id: i64,
    pub path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}
