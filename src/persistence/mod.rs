//! Persistence Store (spec §4.7): the single relational home for
//! instances/snapshots/health/metrics, built on `sqlx::SqlitePool` the way
//! the teacher's own `todo_backend_postgresql` wraps a pool behind a typed
//! repository rather than leaking raw SQL into handlers.

use crate::model::{
    HealthSample, HealthStatus, Instance, InstanceFilter, InstanceStatus, MetricsRange,
    MetricsSample, Snapshot,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;

pub type PersistResult<T> = Result<T, sqlx::Error>;

/// Everything needed to insert a brand-new instance row; assembled by the
/// Lifecycle Manager once it has allocated a port/volume/credentials.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub name: String,
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
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    /// Port allocation is serialized by a global short-held lock (spec §5
    /// "Port pool: ... allocation is serialized by a global short-held
    /// lock"); the pool itself lives in the `ports` table.
    port_lock: std::sync::Arc<Mutex<()>>,
}

impl Store {
    pub async fn connect(database_path: &Path) -> PersistResult<Self> {
        let is_memory = database_path == Path::new(":memory:");
        let url =
            if is_memory { "sqlite::memory:".to_string() } else { format!("sqlite://{}", database_path.display()) };
        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        // A pooled in-memory database is a fresh, empty database per
        // connection unless pinned to one; tests that rely on a single
        // logical database must go through one connection.
        let max_connections = if is_memory { 1 } else { 8 };
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
        Ok(Self { pool, port_lock: std::sync::Arc::new(Mutex::new(())) })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- instances ----------------------------------------------------

    /// A name is in use only while some non-destroyed instance holds it
    /// (spec §3 "`name` is unique across non-destroyed instances") — a
    /// destroyed instance's name is free for reuse.
    pub async fn name_in_use(&self, name: &str) -> PersistResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM instances WHERE name = ? AND status != 'destroyed'")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn insert_instance(&self, new: NewInstance) -> PersistResult<Instance> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO instances (
                name, container_id, engine, sku, database_name, username, password,
                host, port, volume_path, vnet_name, vnet_ip, memory_limit_mb, cpu_limit,
                storage_limit_gb, external_access, tls_enabled, tls_cert_path, tls_key_path,
                status, error_message, created_at, updated_at
            ) VALUES (?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
            RETURNING id",
        )
        .bind(&new.name)
        .bind(&new.engine)
        .bind(&new.sku)
        .bind(&new.database_name)
        .bind(&new.username)
        .bind(&new.password)
        .bind(&new.host)
        .bind(new.port)
        .bind(&new.volume_path)
        .bind(&new.vnet_name)
        .bind(&new.vnet_ip)
        .bind(new.memory_limit_mb)
        .bind(new.cpu_limit)
        .bind(new.storage_limit_gb)
        .bind(new.external_access)
        .bind(new.tls_enabled)
        .bind(&new.tls_cert_path)
        .bind(&new.tls_key_path)
        .bind(InstanceStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.get_instance(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_instance(&self, id: i64) -> PersistResult<Option<Instance>> {
        sqlx::query_as::<_, Instance>("SELECT * FROM instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_instances(&self, filter: &InstanceFilter) -> PersistResult<Vec<Instance>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM instances WHERE 1=1");
        if let Some(engine) = &filter.engine {
            qb.push(" AND engine = ").push_bind(engine.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }
        qb.build_query_as::<Instance>().fetch_all(&self.pool).await
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: InstanceStatus,
        error_message: Option<&str>,
    ) -> PersistResult<()> {
        sqlx::query("UPDATE instances SET status = ?, error_message = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error_message)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_container_id(&self, id: i64, container_id: Option<&str>) -> PersistResult<()> {
        sqlx::query("UPDATE instances SET container_id = ?, updated_at = ? WHERE id = ?")
            .bind(container_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn set_provisioning_details(
        &self,
        id: i64,
        port: i64,
        volume_path: &str,
        vnet_name: Option<&str>,
        vnet_ip: Option<&str>,
        tls_cert_path: Option<&str>,
        tls_key_path: Option<&str>,
    ) -> PersistResult<()> {
        sqlx::query(
            "UPDATE instances
             SET port = ?, volume_path = ?, vnet_name = ?, vnet_ip = ?, tls_cert_path = ?, tls_key_path = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(port)
        .bind(volume_path)
        .bind(vnet_name)
        .bind(vnet_ip)
        .bind(tls_cert_path)
        .bind(tls_key_path)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_password(&self, id: i64, password: &str) -> PersistResult<()> {
        sqlx::query("UPDATE instances SET password = ?, updated_at = ? WHERE id = ?")
            .bind(password)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- port pool ------------------------------------------------------

    /// Reserves the lowest free port in `range`, recording it against
    /// `instance_id`. Serialized by `port_lock` so two concurrent
    /// provisions never race on the same candidate (spec §5).
    pub async fn reserve_port(
        &self,
        instance_id: i64,
        range: std::ops::RangeInclusive<u16>,
    ) -> PersistResult<u16> {
        let _guard = self.port_lock.lock().await;
        for candidate in range {
            let inserted = sqlx::query("INSERT OR IGNORE INTO ports (port, instance_id) VALUES (?, ?)")
                .bind(candidate as i64)
                .bind(instance_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
            if inserted == 1 {
                return Ok(candidate);
            }
        }
        Err(sqlx::Error::RowNotFound)
    }

    pub async fn release_port(&self, port: u16) -> PersistResult<()> {
        let _guard = self.port_lock.lock().await;
        sqlx::query("DELETE FROM ports WHERE port = ?").bind(port as i64).execute(&self.pool).await?;
        Ok(())
    }

    // ---- snapshots --------------------------------------------------------

    pub async fn insert_snapshot(
        &self,
        instance_id: i64,
        path: &str,
        size_bytes: i64,
        notes: Option<&str>,
    ) -> PersistResult<Snapshot> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO snapshots (instance_id, path, size_bytes, created_at, notes)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(instance_id)
        .bind(path)
        .bind(size_bytes)
        .bind(Utc::now())
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn list_snapshots(&self, instance_id: i64) -> PersistResult<Vec<Snapshot>> {
        sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE instance_id = ? ORDER BY created_at DESC")
            .bind(instance_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_snapshot(&self, id: i64) -> PersistResult<Option<Snapshot>> {
        sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn delete_snapshot(&self, id: i64) -> PersistResult<()> {
        sqlx::query("DELETE FROM snapshots WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    // ---- health samples ---------------------------------------------------

    pub async fn insert_health_sample(
        &self,
        instance_id: i64,
        status: HealthStatus,
        response_time_ms: Option<i64>,
        details: Option<serde_json::Value>,
    ) -> PersistResult<HealthSample> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO health_samples (instance_id, status, response_time_ms, details, checked_at)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(instance_id)
        .bind(status.as_str())
        .bind(response_time_ms)
        .bind(details)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        sqlx::query_as::<_, HealthSample>("SELECT * FROM health_samples WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn recent_health_samples(&self, instance_id: i64, limit: i64) -> PersistResult<Vec<HealthSample>> {
        sqlx::query_as::<_, HealthSample>(
            "SELECT * FROM health_samples WHERE instance_id = ? ORDER BY checked_at DESC LIMIT ?",
        )
        .bind(instance_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn prune_health_samples(&self, instance_id: i64, retain: i64) -> PersistResult<()> {
        sqlx::query(
            "DELETE FROM health_samples WHERE instance_id = ? AND id NOT IN (
                SELECT id FROM health_samples WHERE instance_id = ? ORDER BY checked_at DESC LIMIT ?
            )",
        )
        .bind(instance_id)
        .bind(instance_id)
        .bind(retain)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- metrics samples ---------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_metrics_sample(
        &self,
        instance_id: i64,
        cpu_percent: f64,
        memory_used_mb: i64,
        memory_limit_mb: i64,
        connections: Option<i64>,
        active_queries: Option<i64>,
        cache_hit_ratio: Option<f64>,
        uptime_seconds: Option<i64>,
    ) -> PersistResult<MetricsSample> {
        let memory_percent = if memory_limit_mb > 0 {
            memory_used_mb as f64 / memory_limit_mb as f64 * 100.0
        } else {
            0.0
        };
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO metrics_samples (
                instance_id, cpu_percent, memory_used_mb, memory_limit_mb, memory_percent,
                connections, active_queries, cache_hit_ratio, uptime_seconds, collected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(instance_id)
        .bind(cpu_percent)
        .bind(memory_used_mb)
        .bind(memory_limit_mb)
        .bind(memory_percent)
        .bind(connections)
        .bind(active_queries)
        .bind(cache_hit_ratio)
        .bind(uptime_seconds)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        sqlx::query_as::<_, MetricsSample>("SELECT * FROM metrics_samples WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn latest_metrics(&self, instance_id: i64) -> PersistResult<Option<MetricsSample>> {
        sqlx::query_as::<_, MetricsSample>(
            "SELECT * FROM metrics_samples WHERE instance_id = ? ORDER BY collected_at DESC LIMIT 1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn metrics_history(&self, instance_id: i64, range: &MetricsRange) -> PersistResult<Vec<MetricsSample>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM metrics_samples WHERE instance_id = ",
        );
        qb.push_bind(instance_id);
        if let Some(since) = range.since {
            qb.push(" AND collected_at >= ").push_bind(since);
        }
        if let Some(until) = range.until {
            qb.push(" AND collected_at <= ").push_bind(until);
        }
        qb.push(" ORDER BY collected_at DESC");
        if let Some(limit) = range.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        qb.build_query_as::<MetricsSample>().fetch_all(&self.pool).await
    }

    pub async fn prune_metrics_older_than(&self, cutoff: DateTime<Utc>) -> PersistResult<u64> {
        let result = sqlx::query("DELETE FROM metrics_samples WHERE collected_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceFilter;

    async fn test_store() -> Store {
        let store = Store::connect(Path::new(":memory:")).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn sample_new_instance(name: &str) -> NewInstance {
        NewInstance {
            name: name.to_string(),
            engine: "postgresql".into(),
            sku: "D2".into(),
            database_name: "app".into(),
            username: "app_user".into(),
            password: "hunter2hunter2hunter2".into(),
            host: "127.0.0.1".into(),
            port: 54320,
            volume_path: "/data/volumes/1".into(),
            vnet_ip: None,
            memory_limit_mb: 4096,
            cpu_limit: 2.0,
            storage_limit_gb: 50,
            external_access: false,
            tls_enabled: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get_instance_round_trips() {
        let store = test_store().await;
        let created = store.insert_instance(sample_new_instance("db-one")).await.unwrap();
        assert_eq!(created.status, InstanceStatus::Pending);

        let fetched = store.get_instance(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "db-one");
    }

    #[tokio::test]
    async fn name_collision_is_detected_before_insert() {
        let store = test_store().await;
        store.insert_instance(sample_new_instance("dup")).await.unwrap();
        assert!(store.name_in_use("dup").await.unwrap());
        assert!(!store.name_in_use("dup-not-taken").await.unwrap());
    }

    #[tokio::test]
    async fn list_instances_filters_by_status() {
        let store = test_store().await;
        let a = store.insert_instance(sample_new_instance("a")).await.unwrap();
        store.insert_instance(sample_new_instance("b")).await.unwrap();
        store.update_status(a.id, InstanceStatus::Running, None).await.unwrap();

        let filter = InstanceFilter { status: Some(InstanceStatus::Running), ..Default::default() };
        let running = store.list_instances(&filter).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a.id);
    }

    #[tokio::test]
    async fn port_reservation_does_not_double_allocate() {
        let store = test_store().await;
        let inst = store.insert_instance(sample_new_instance("ports")).await.unwrap();
        let p1 = store.reserve_port(inst.id, 20000..=20001).await.unwrap();
        let p2 = store.reserve_port(inst.id, 20000..=20001).await.unwrap();
        assert_ne!(p1, p2);
        assert!(store.reserve_port(inst.id, 20000..=20001).await.is_err());

        store.release_port(p1).await.unwrap();
        let p3 = store.reserve_port(inst.id, 20000..=20001).await.unwrap();
        assert_eq!(p3, p1);
    }

    #[tokio::test]
    async fn metrics_retention_prunes_old_samples() {
        let store = test_store().await;
        let inst = store.insert_instance(sample_new_instance("metrics")).await.unwrap();
        store
            .insert_metrics_sample(inst.id, 1.0, 100, 1000, Some(1), None, None, None)
            .await
            .unwrap();

        let future_cutoff = Utc::now() + chrono::Duration::days(1);
        let pruned = store.prune_metrics_older_than(future_cutoff).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(store.latest_metrics(inst.id).await.unwrap().is_none());
    }
}
