//! Local filesystem storage backend.
//!
//! Keys resolve beneath a configured root; writes go through a temp file in
//! the target directory and a rename so readers never observe torn content.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{StorageError, StorageProvider};
use crate::sanitize::validate_key;

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the backend rooted at `root`, creating the directory if needed.
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        tracing::info!(root = %root.display(), "initialized local storage provider");
        Ok(Self { root })
    }

    /// Resolve a key to an absolute path, guarding against traversal.
    fn safe_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let key = validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        Ok(self.root.join(key))
    }

    /// Unique sibling temp path for a rename-on-commit write.
    fn scratch_path(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_os_string();
        name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        PathBuf::from(name)
    }

    async fn ensure_parent(target: &Path) -> Result<(), StorageError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn read_to_temp(&self, key: &str) -> Result<PathBuf, StorageError> {
        let path = self.safe_path(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(path)
    }

    async fn write_from_path(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let target = self.safe_path(key)?;
        if target == local_path {
            return Ok(());
        }
        Self::ensure_parent(&target).await?;
        let scratch = Self::scratch_path(&target);
        tokio::fs::copy(local_path, &scratch).await?;
        tokio::fs::rename(&scratch, &target).await?;
        Ok(())
    }

    async fn write_from_bytes(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let target = self.safe_path(key)?;
        Self::ensure_parent(&target).await?;
        let scratch = Self::scratch_path(&target);
        tokio::fs::write(&scratch, data).await?;
        tokio::fs::rename(&scratch, &target).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.safe_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.safe_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn presigned_url(&self, _key: &str, _ttl: Duration) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn resolve_local_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        self.safe_path(key)
    }
}
