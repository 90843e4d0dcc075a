//! Key-addressed blob storage.
//!
//! All file I/O outside the download path goes through [`StorageProvider`]
//! so the backend can be swapped between local filesystem and an
//! S3-compatible object store. Keys are relative, slash-separated paths;
//! absolute keys and `..` components are rejected before any I/O.

mod local;
mod s3;
mod temp_cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, StorageBackend};
use crate::sanitize::InvalidKey;

pub use local::LocalStorage;
pub use s3::S3Storage;
pub use temp_cache::TempFileCache;

/// Storage failure taxonomy shared by all backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found in storage: {0}")]
    NotFound(String),
    #[error("invalid storage key {key:?}: {reason}")]
    InvalidKey {
        key: String,
        #[source]
        reason: InvalidKey,
    },
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("s3: {0}")]
    S3(String),
}

impl StorageError {
    pub fn invalid_key(key: &str, reason: InvalidKey) -> Self {
        StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        }
    }
}

/// Abstract storage capability set.
///
/// `read_to_temp` yields a path readable by downstream libraries that need
/// a real file descriptor: the local backend returns the resolved path, the
/// S3 backend materializes the object in the temp LRU cache first. Writes
/// are atomic at key granularity on every backend.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn read_to_temp(&self, key: &str) -> Result<PathBuf, StorageError>;

    async fn write_from_path(&self, key: &str, local_path: &Path) -> Result<(), StorageError>;

    async fn write_from_bytes(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Pre-signed download URL, or `None` for backends without presigning.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError>;

    /// Resolve a key to an absolute local path. Only the local backend
    /// supports this; others return [`StorageError::Unsupported`].
    fn resolve_local_path(&self, key: &str) -> Result<PathBuf, StorageError>;
}

/// Construct the provider selected by configuration. Built once at startup;
/// there is no lazy global.
pub async fn make_provider(config: &Config) -> anyhow::Result<Arc<dyn StorageProvider>> {
    match config.storage_backend {
        StorageBackend::Local => Ok(Arc::new(LocalStorage::new(&config.storage_root)?)),
        StorageBackend::S3 => {
            let cache = TempFileCache::new(&config.temp_cache_dir, config.temp_cache_max_bytes)?;
            Ok(Arc::new(S3Storage::connect(&config.s3, cache).await))
        }
    }
}
