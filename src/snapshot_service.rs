//! Snapshot Service (spec §4.4): engine-native backups, one file plus one row
//! per snapshot. File-first on delete, row-first on create, so a crash never
//! leaves an orphan file referenced by nothing — the reconciler only ever
//! has to clean up rows, never hunt for stray files.

use crate::context::AppContext;
use crate::error::{ApiError, ApiResult};
use crate::model::{Instance, InstanceStatus, Snapshot};
use rand::Rng;
use std::path::PathBuf;

pub struct SnapshotService {
    ctx: AppContext,
}

impl SnapshotService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Runs the adapter's snapshot command inside the running container,
    /// then records the observed file size (spec §4.4 "on success inserts a
    /// Snapshot row with the observed file size").
    pub async fn create(&self, instance_id: i64, notes: Option<&str>) -> ApiResult<Snapshot> {
        let instance = self.require_running(instance_id).await?;
        let adapter = crate::engine::lookup(&instance.engine)?;

        let dir = self.ctx.config.snapshots_dir().join(instance_id.to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(|e| ApiError::Internal(e.to_string()))?;

        let file_name = format!(
            "{}-{:06}.{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
            rand::thread_rng().gen_range(0..1_000_000),
            adapter.snapshot_extension(),
        );
        let dest_path = dir.join(file_name);
        let dest_path_str = dest_path.display().to_string();

        let container_id =
            instance.container_id.as_deref().ok_or_else(|| ApiError::Internal("missing container id".into()))?;
        let command = adapter.snapshot_command(&instance, &dest_path_str);
        let output = self.ctx.runtime.exec(container_id, &command).await?;
        if !output.success() {
            let _ = tokio::fs::remove_file(&dest_path).await;
            return Err(crate::engine::EngineError::Op { exit_code: output.exit_code, stderr: output.stderr }.into());
        }

        let size_bytes = match tokio::fs::metadata(&dest_path).await {
            Ok(meta) => meta.len() as i64,
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest_path).await;
                return Err(ApiError::Internal(format!("snapshot file missing after command success: {e}")));
            }
        };

        self.ctx.store.insert_snapshot(instance_id, &dest_path_str, size_bytes, notes).await.map_err(Into::into)
    }

    pub async fn list(&self, instance_id: i64) -> ApiResult<Vec<Snapshot>> {
        self.ctx.store.list_snapshots(instance_id).await.map_err(Into::into)
    }

    /// The instance must be `running`; the restore command itself must be
    /// idempotent because crash recovery may retry it (spec §4.4).
    pub async fn restore(&self, instance_id: i64, snapshot_id: i64) -> ApiResult<()> {
        let instance = self.require_running(instance_id).await?;
        let snapshot = self
            .ctx
            .store
            .get_snapshot(snapshot_id)
            .await?
            .filter(|s| s.instance_id == instance_id)
            .ok_or_else(|| ApiError::not_found("snapshot"))?;

        let adapter = crate::engine::lookup(&instance.engine)?;
        let container_id =
            instance.container_id.as_deref().ok_or_else(|| ApiError::Internal("missing container id".into()))?;
        let command = adapter.restore_command(&instance, &snapshot.path);
        let output = self.ctx.runtime.exec(container_id, &command).await?;
        if !output.success() {
            return Err(crate::engine::EngineError::Op { exit_code: output.exit_code, stderr: output.stderr }.into());
        }
        Ok(())
    }

    /// File-first: an orphan row after a failed file delete is preferable to
    /// an orphan file nothing points to (spec §4.4).
    pub async fn delete(&self, instance_id: i64, snapshot_id: i64) -> ApiResult<()> {
        let snapshot = self
            .ctx
            .store
            .get_snapshot(snapshot_id)
            .await?
            .filter(|s| s.instance_id == instance_id)
            .ok_or_else(|| ApiError::not_found("snapshot"))?;

        match tokio::fs::remove_file(&snapshot.path).await {
            Ok(()) | Err(_) if !PathBuf::from(&snapshot.path).exists() => {}
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        }
        self.ctx.store.delete_snapshot(snapshot_id).await?;
        Ok(())
    }

    /// Streams the same dump a Snapshot would produce but piped straight to
    /// the caller rather than stored (spec §4.8 `Export(id)`).
    pub async fn export(&self, instance_id: i64) -> ApiResult<Vec<u8>> {
        let instance = self.require_running(instance_id).await?;
        let adapter = crate::engine::lookup(&instance.engine)?;

        let dir = self.ctx.config.data_root.join("export-tmp");
        tokio::fs::create_dir_all(&dir).await.map_err(|e| ApiError::Internal(e.to_string()))?;
        let tmp_path = dir.join(format!("{instance_id}-{}.{}", uuid::Uuid::new_v4(), adapter.snapshot_extension()));
        let tmp_path_str = tmp_path.display().to_string();

        let container_id =
            instance.container_id.as_deref().ok_or_else(|| ApiError::Internal("missing container id".into()))?;
        let command = adapter.snapshot_command(&instance, &tmp_path_str);
        let output = self.ctx.runtime.exec(container_id, &command).await?;
        if !output.success() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(crate::engine::EngineError::Op { exit_code: output.exit_code, stderr: output.stderr }.into());
        }

        let bytes = tokio::fs::read(&tmp_path).await.map_err(|e| ApiError::Internal(e.to_string()))?;
        let _ = tokio::fs::remove_file(&tmp_path).await;
        Ok(bytes)
    }

    async fn require_running(&self, instance_id: i64) -> ApiResult<Instance> {
        let instance = self.ctx.store.get_instance(instance_id).await?.ok_or_else(|| ApiError::not_found("instance"))?;
        if instance.status != InstanceStatus::Running {
            return Err(ApiError::validation("instance must be running"));
        }
        Ok(instance)
    }
}
