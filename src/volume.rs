//! Volume Service (spec §2 component 6): allocates and releases per-instance
//! on-disk volume directories. Deliberately plain `tokio::fs` calls — no
//! dependency pulled in purely for directory bookkeeping, matching spec §1's
//! framing of this as a thin filesystem-layer concern.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume already exists for instance {0}")]
    AlreadyExists(i64),

    #[error("io error allocating volume: {0}")]
    Io(#[from] std::io::Error),
}

pub type VolumeResult<T> = Result<T, VolumeError>;

/// Owns `<data_root>/volumes/`; each instance gets its own subdirectory that
/// is never reused after destroy (spec §3 "`volume_path`, once set, is owned
/// exclusively by that instance and never reused after destroy").
#[derive(Debug, Clone)]
pub struct VolumeService {
    root: PathBuf,
}

impl VolumeService {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path_for(&self, instance_id: i64) -> PathBuf {
        self.root.join(instance_id.to_string())
    }

    /// Creates `<root>/<instance_id>/` with the expected layout. Storage
    /// quota enforcement (spec §5 "storage quota enforced at the filesystem
    /// layer by the Volume Service") is delegated to the orchestrator's
    /// container create step via a bind-mounted, size-capped volume; this
    /// method only prepares the host-side directory tree.
    pub async fn allocate(&self, instance_id: i64) -> VolumeResult<PathBuf> {
        let path = self.path_for(instance_id);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Err(VolumeError::AlreadyExists(instance_id));
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Removes the instance's volume directory and everything under it
    /// (spec §3 "destroying ... deletes the volume directory").
    pub async fn release(&self, instance_id: i64) -> VolumeResult<()> {
        let path = self.path_for(instance_id);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, instance_id: i64) -> bool {
        self.path_for(instance_id).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_then_release_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = VolumeService::new(tmp.path().join("volumes"));

        let path = svc.allocate(42).await.unwrap();
        assert!(path.exists());
        assert!(svc.exists(42));

        svc.release(42).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn allocate_twice_for_same_instance_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = VolumeService::new(tmp.path().join("volumes"));

        svc.allocate(1).await.unwrap();
        let err = svc.allocate(1).await.unwrap_err();
        assert!(matches!(err, VolumeError::AlreadyExists(1)));
    }

    #[tokio::test]
    async fn release_of_missing_volume_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = VolumeService::new(tmp.path().join("volumes"));
        svc.release(999).await.unwrap();
    }
}
