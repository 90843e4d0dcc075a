//! Per-file download from the public archive mirror bucket.
//!
//! Ranged multipart GETs with the configured part size, driven through the
//! same gates and accounting as the HTTP path. No resume: a leftover
//! `.part` is discarded and the object restarted. Ranged object GETs give
//! no confirmed-offset semantics worth journaling, and the archive bucket
//! is high-bandwidth.

use std::path::Path;

use aws_sdk_s3::error::SdkError;
use tokio::io::AsyncWriteExt;

use crate::retry::{run_with_retry, RetryPolicy, TransferError};

use super::control::DownloadControl;
use super::FileHooks;

/// Map an SDK failure into the transfer error taxonomy. Dispatch/timeout
/// failures and 5xx/429 service answers are retryable; NoSuchKey and other
/// 4xx answers are not.
pub(super) fn s3_error<E, R>(err: SdkError<E, R>) -> TransferError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let retryable = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(_) => false,
        _ => false,
    };
    TransferError::S3 {
        message: format!("{err}"),
        retryable,
    }
}

/// Object size via HeadObject, or `None` when it cannot be determined.
pub(super) async fn object_size(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Option<u64> {
    match client.head_object().bucket(bucket).key(key).send().await {
        Ok(resp) => resp.content_length().and_then(|len| u64::try_from(len).ok()),
        Err(e) => {
            tracing::warn!(bucket, key, error = %e, "S3 size probe failed");
            None
        }
    }
}

/// Download `key` to `local_path` in ranged parts.
pub(super) async fn download_file_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    local_path: &Path,
    part_path: &Path,
    part_size: u64,
    policy: &RetryPolicy,
    control: &DownloadControl,
    hooks: &FileHooks<'_>,
) -> Result<u64, TransferError> {
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // No resume on the S3 path: discard any partial and start over.
    if tokio::fs::try_exists(part_path).await.unwrap_or(false) {
        tracing::info!(key, "discarding stale partial file, S3 downloads restart");
        tokio::fs::remove_file(part_path).await?;
        hooks.set_downloaded(0);
    }

    let total_bytes = match hooks.total_bytes() {
        0 => {
            let size = object_size(client, bucket, key).await.ok_or_else(|| TransferError::S3 {
                message: format!("cannot determine size of s3://{bucket}/{key}"),
                retryable: false,
            })?;
            hooks.set_total(size);
            size
        }
        known => known,
    };

    if total_bytes == 0 {
        touch_empty(local_path).await?;
        return Ok(0);
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(part_path)
        .await?;

    let part_size = part_size.max(1);
    let mut offset: u64 = 0;
    while offset < total_bytes {
        control.checkpoint().await?;

        let end = (offset + part_size - 1).min(total_bytes.saturating_sub(1));
        let range = format!("bytes={offset}-{end}");
        let bytes = run_with_retry(policy, || {
            let range = range.clone();
            async move {
                let resp = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .range(range)
                    .send()
                    .await
                    .map_err(|e| {
                        let svc_is_missing = matches!(
                            &e,
                            SdkError::ServiceError(ctx) if ctx.err().is_no_such_key()
                        );
                        if svc_is_missing {
                            TransferError::S3 {
                                message: format!("object not found: s3://{bucket}/{key}"),
                                retryable: false,
                            }
                        } else {
                            s3_error(e)
                        }
                    })?;
                let data = resp.body.collect().await.map_err(|e| TransferError::S3 {
                    message: e.to_string(),
                    // Body read failures behave like a dropped connection.
                    retryable: true,
                })?;
                Ok(data.into_bytes())
            }
        })
        .await?;

        if bytes.is_empty() {
            return Err(TransferError::S3 {
                message: format!("empty ranged response at offset {offset} for {key}"),
                retryable: false,
            });
        }
        file.write_all(&bytes).await?;
        offset += bytes.len() as u64;
        hooks.add_bytes(bytes.len() as u64);
    }
    file.flush().await?;

    tokio::fs::rename(part_path, local_path).await?;
    Ok(offset)
}

/// Zero-byte objects never enter the ranged loop; create the file directly.
pub(super) async fn touch_empty(local_path: &Path) -> Result<(), TransferError> {
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::File::create(local_path).await?;
    Ok(())
}
