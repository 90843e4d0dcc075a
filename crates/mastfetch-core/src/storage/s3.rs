//! S3-compatible storage backend.
//!
//! Works against AWS S3 and S3-compatible services (SeaweedFS, MinIO).
//! Objects are materialized through the temp LRU cache for readers that
//! need a real file on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;

use super::temp_cache::TempFileCache;
use super::{StorageError, StorageProvider};
use crate::config::S3Config;
use crate::sanitize::validate_key;

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint: Option<String>,
    public_endpoint: Option<String>,
    cache: Arc<TempFileCache>,
}

impl S3Storage {
    /// Build the backend from configuration. Uses static credentials when
    /// both keys are configured, anonymous requests otherwise (the public
    /// archive mirror bucket needs no signing).
    pub async fn connect(cfg: &S3Config, cache: TempFileCache) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()));
        loader = match (&cfg.access_key, &cfg.secret_key) {
            (Some(access), Some(secret)) => {
                loader.credentials_provider(Credentials::from_keys(access, secret, None))
            }
            _ => loader.no_credentials(),
        };
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(cfg.force_path_style)
            .build();

        tracing::info!(
            bucket = %cfg.bucket,
            endpoint = cfg.endpoint.as_deref().unwrap_or("default AWS"),
            "initialized S3 storage provider"
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: cfg.bucket.clone(),
            endpoint: cfg.endpoint.clone(),
            public_endpoint: cfg.public_endpoint.clone(),
            cache: Arc::new(cache),
        }
    }

    async fn download_to_cache(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                if svc.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3(svc.to_string())
                }
            })?;

        let mut body = resp.body;
        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn evict_in_background(&self) {
        let cache = Arc::clone(&self.cache);
        let result = tokio::task::spawn_blocking(move || cache.evict_if_needed()).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "temp cache eviction failed"),
            Err(e) => tracing::warn!(error = %e, "temp cache eviction task panicked"),
        }
    }
}

#[async_trait]
impl StorageProvider for S3Storage {
    async fn read_to_temp(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;

        // Concurrent readers may race to populate the same key; the second
        // write is idempotent. A hit can also lose to eviction between the
        // check and the open, in which case the caller sees a fresh
        // download instead.
        if let Some(cached) = self.cache.get(key)? {
            return Ok(cached);
        }

        let path = self.cache.reserve(key)?;
        if let Err(e) = self.download_to_cache(key, &path).await {
            // Remove any partial file so a later read does not see it.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        tracing::debug!(key, path = %path.display(), "downloaded object to temp cache");

        self.evict_in_background().await;
        Ok(path)
    }

    async fn write_from_path(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.into_service_error().to_string()))?;
        tracing::debug!(key, from = %local_path.display(), "uploaded object");
        Ok(())
    }

    async fn write_from_bytes(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::S3(e.into_service_error().to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let svc = e.into_service_error();
                if svc.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::S3(svc.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.into_service_error().to_string()))?;
        Ok(())
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError> {
        validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::S3(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::S3(e.into_service_error().to_string()))?;
        let url = rewrite_to_public(
            request.uri(),
            self.endpoint.as_deref(),
            self.public_endpoint.as_deref(),
        );
        Ok(Some(url))
    }

    fn resolve_local_path(&self, _key: &str) -> Result<PathBuf, StorageError> {
        Err(StorageError::Unsupported(
            "S3 storage has no local filesystem paths; use read_to_temp for a local copy",
        ))
    }
}

/// Substitute the internal endpoint for the public one in presigned URLs,
/// when both are configured. The signature covers the path, not the host,
/// so the rewritten URL stays valid for path-style buckets.
fn rewrite_to_public(url: &str, endpoint: Option<&str>, public_endpoint: Option<&str>) -> String {
    match (endpoint, public_endpoint) {
        (Some(internal), Some(public)) => url.replace(internal, public),
        _ => url.to_string(),
    }
}
