//! Per-file chunked HTTP transfer with Range resume.
//!
//! The `.part` file's byte length is the confirmed resume offset: the
//! response body is written in fixed-size chunks, every request asks for
//! `bytes=<offset>-`, every chunk is appended before the offset advances,
//! and the rename to the final name happens only once the full body is on
//! disk. A 416 answer to a resume request means the remote has nothing
//! past our offset, i.e. the file is done.

use std::path::Path;

use futures_util::TryStreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::retry::{classify, RetryDecision, RetryPolicy, TransferError};

use super::control::DownloadControl;
use super::probe::parse_content_range_total;
use super::FileHooks;

/// One attempt's outcome: the stream ended cleanly, or the server told us
/// the resume offset is already past the end.
enum Attempt {
    StreamEnded,
    RangeDone,
}

/// Download `url` to `local_path`, resuming from an existing `.part`.
/// Returns the total bytes on disk when complete. Cancellation surfaces as
/// `TransferError::Cancelled` with the `.part` retained.
pub(super) async fn download_file_http(
    client: &reqwest::Client,
    url: &str,
    local_path: &Path,
    part_path: &Path,
    chunk_size: u64,
    policy: &RetryPolicy,
    control: &DownloadControl,
    hooks: &FileHooks<'_>,
) -> Result<u64, TransferError> {
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Confirmed resume offset: exactly what the partial file holds.
    let mut downloaded: u64 = match tokio::fs::metadata(part_path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    if downloaded > 0 {
        tracing::info!(url, offset = downloaded, "resuming download from recorded offset");
        hooks.set_downloaded(downloaded);
    }

    let mut total_bytes = hooks.total_bytes();
    let mut retries = 0u32;

    while total_bytes == 0 || downloaded < total_bytes {
        control.checkpoint().await?;

        let offset_at_attempt = downloaded;
        let attempt = run_attempt(
            client,
            url,
            part_path,
            chunk_size.max(1),
            &mut downloaded,
            &mut total_bytes,
            control,
            hooks,
        )
        .await;

        match attempt {
            Ok(Attempt::RangeDone) => break,
            Ok(Attempt::StreamEnded) => {
                retries = 0;
                if total_bytes == 0 {
                    // No Content-Length and the stream is done: what we have
                    // is the whole file.
                    total_bytes = downloaded;
                    hooks.set_total(total_bytes);
                }
                if downloaded >= total_bytes {
                    break;
                }
                // Short body; the next loop turn re-requests from the new
                // offset without burning a retry.
                tracing::warn!(url, downloaded, total_bytes, "stream ended early, re-requesting");
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                if downloaded > offset_at_attempt {
                    // Progress was made before the failure; the retry
                    // budget starts over.
                    retries = 0;
                }
                retries += 1;
                match policy.decide(retries, classify(&e)) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            url,
                            retry = retries,
                            max = policy.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "download error, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::NoRetry => return Err(e),
                }
            }
        }
    }

    // All bytes confirmed on disk: commit by rename.
    if tokio::fs::try_exists(part_path).await.unwrap_or(false) {
        tokio::fs::rename(part_path, local_path).await?;
    }
    Ok(downloaded)
}

async fn run_attempt(
    client: &reqwest::Client,
    url: &str,
    part_path: &Path,
    chunk_size: u64,
    downloaded: &mut u64,
    total_bytes: &mut u64,
    control: &DownloadControl,
    hooks: &FileHooks<'_>,
) -> Result<Attempt, TransferError> {
    let start_offset = *downloaded;
    let mut request = client.get(url);
    if *downloaded > 0 {
        request = request.header(RANGE, format!("bytes={downloaded}-"));
    }
    let resp = request.send().await?;
    let status = resp.status();

    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        return Ok(Attempt::RangeDone);
    }
    if !(status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT) {
        return Err(TransferError::Status(status.as_u16()));
    }

    // A 200 to a ranged request means the server ignored the Range header
    // and is sending the whole body; our appended bytes would corrupt the
    // file, so start the partial over.
    if status == StatusCode::OK && *downloaded > 0 {
        tracing::warn!(url, "server ignored Range header, restarting file");
        let _ = tokio::fs::remove_file(part_path).await;
        hooks.set_downloaded(0);
        *downloaded = 0;
    }

    if *total_bytes == 0 {
        if let Some(total) = total_from_response(&resp, *downloaded) {
            *total_bytes = total;
            hooks.set_total(total);
        }
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(part_path)
        .await?;

    // Re-chunk the network stream so the partial grows in fixed-size
    // pieces: a full buffer is one chunk, the tail flushes at stream end.
    // The gate is observed before every write, so the counted offset and
    // the bytes on disk advance together.
    let mut stream = resp.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    while let Some(piece) = stream.try_next().await.map_err(TransferError::Http)? {
        buffer.extend_from_slice(&piece);
        while buffer.len() as u64 >= chunk_size {
            let rest = buffer.split_off(chunk_size as usize);
            write_chunk(control, &mut file, &buffer, downloaded, hooks).await?;
            buffer = rest;
        }
    }
    if !buffer.is_empty() {
        write_chunk(control, &mut file, &buffer, downloaded, hooks).await?;
    }
    file.flush().await?;

    if *total_bytes > 0 && *downloaded < *total_bytes && *downloaded <= start_offset {
        return Err(TransferError::PartialTransfer {
            expected: *total_bytes,
            received: *downloaded,
        });
    }
    Ok(Attempt::StreamEnded)
}

/// Append one chunk behind the gate and advance the confirmed offset.
async fn write_chunk(
    control: &DownloadControl,
    file: &mut tokio::fs::File,
    chunk: &[u8],
    downloaded: &mut u64,
    hooks: &FileHooks<'_>,
) -> Result<(), TransferError> {
    control.checkpoint().await?;
    file.write_all(chunk).await?;
    *downloaded += chunk.len() as u64;
    hooks.add_bytes(chunk.len() as u64);
    Ok(())
}

/// Total size from `Content-Range` (ranged responses) or `Content-Length`
/// plus the resume offset.
fn total_from_response(resp: &reqwest::Response, offset: u64) -> Option<u64> {
    if let Some(range) = resp.headers().get(reqwest::header::CONTENT_RANGE) {
        if let Some(total) = range.to_str().ok().and_then(parse_content_range_total) {
            return Some(total);
        }
    }
    resp.content_length().map(|remaining| offset + remaining)
}
