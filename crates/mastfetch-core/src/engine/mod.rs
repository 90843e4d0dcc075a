//! Download engine: move a declared set of remote objects into the
//! download root, concurrently, with progress, retries and resumability.
//!
//! One engine run drives one job. The registry owns the job state; the run
//! holds a shared reference for its duration and mutates it only in short
//! locked sections. A semaphore caps simultaneously in-flight files, and
//! every transfer observes the pause/cancel gates between chunks.

mod control;
mod http;
mod probe;
mod s3;
mod sink;
mod speed;

use std::path::Path;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::job::{FileEntry, FileSpec, FileStatus, JobState, JobStatus, RemoteLocator, SharedJob};
use crate::retry::{RetryPolicy, TransferError};
use crate::sanitize::{path_within_dir, sanitize_filename};

pub use control::DownloadControl;
pub use probe::probe_size;
pub use sink::ProgressSink;
pub use speed::SpeedTracker;

/// Accounting callbacks one file transfer uses to feed the shared job
/// state, the speed window and the progress sink.
pub(crate) struct FileHooks<'a> {
    job: &'a SharedJob,
    index: usize,
    speed: &'a SpeedTracker,
    sink: &'a ProgressSink,
}

impl FileHooks<'_> {
    fn add_bytes(&self, delta: u64) {
        {
            let mut job = self.job.lock().unwrap();
            job.files[self.index].downloaded_bytes += delta;
            job.downloaded_bytes += delta;
        }
        self.speed.record(delta);
        self.sink.emit_with(|| self.job.lock().unwrap().clone());
    }

    fn set_downloaded(&self, bytes: u64) {
        let mut job = self.job.lock().unwrap();
        job.files[self.index].downloaded_bytes = bytes;
        job.recompute_totals();
    }

    fn set_total(&self, total: u64) {
        let mut job = self.job.lock().unwrap();
        job.files[self.index].total_bytes = total;
        job.recompute_totals();
    }

    fn total_bytes(&self) -> u64 {
        self.job.lock().unwrap().files[self.index].total_bytes
    }
}

pub struct DownloadEngine {
    client: reqwest::Client,
    archive: aws_sdk_s3::Client,
    archive_bucket: String,
    chunk_size: u64,
    max_concurrent_files: usize,
    policy: RetryPolicy,
}

impl DownloadEngine {
    /// Build the engine from configuration: a pooled HTTP client with the
    /// configured connect/read timeouts, and an anonymous client for the
    /// public archive mirror bucket.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .pool_max_idle_per_host(config.max_concurrent_files.max(1))
            .build()?;

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.archive_region.clone()))
            .no_credentials()
            .load()
            .await;
        let archive = aws_sdk_s3::Client::new(&shared);

        Ok(Self {
            client,
            archive,
            archive_bucket: config.archive_bucket.clone(),
            chunk_size: config.chunk_size_bytes,
            max_concurrent_files: config.max_concurrent_files.max(1),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay(),
                max_delay: std::time::Duration::from_secs(60),
            },
        })
    }

    /// Run the transfer set for one job and return its final state.
    ///
    /// Manifest entries with unsafe filenames are skipped (logged), the
    /// rest download concurrently under the file semaphore. The run ends
    /// with the job complete, failed, or paused; cancellation leaves
    /// in-flight files paused and the caller decides the job-level status.
    pub async fn download(
        &self,
        manifest: &[FileSpec],
        target_dir: &Path,
        job: SharedJob,
        control: Arc<DownloadControl>,
        speed: Arc<SpeedTracker>,
        sink: Arc<ProgressSink>,
    ) -> JobState {
        self.init_files(manifest, target_dir, &job);
        self.probe_unknown_sizes(&job).await;
        sink.emit_now(&job.lock().unwrap().clone());

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_files));
        let mut tasks = JoinSet::new();

        let pending: Vec<usize> = {
            let job = job.lock().unwrap();
            job.files
                .iter()
                .enumerate()
                .filter(|(_, f)| f.status.needs_download())
                .map(|(i, _)| i)
                .collect()
        };

        for index in pending {
            let semaphore = Arc::clone(&semaphore);
            let job = Arc::clone(&job);
            let control = Arc::clone(&control);
            let speed = Arc::clone(&speed);
            let sink = Arc::clone(&sink);
            let client = self.client.clone();
            let archive = self.archive.clone();
            let bucket = self.archive_bucket.clone();
            let chunk_size = self.chunk_size;
            let policy = self.policy;

            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");

                let (locator, local_path, part_path, filename) = {
                    let mut job = job.lock().unwrap();
                    let file = &mut job.files[index];
                    if !file.status.needs_download() {
                        return;
                    }
                    file.status = FileStatus::Downloading;
                    file.started_at.get_or_insert_with(Utc::now);
                    (
                        file.locator.clone(),
                        file.local_path.clone(),
                        file.part_path(),
                        file.filename.clone(),
                    )
                };

                let hooks = FileHooks {
                    job: &job,
                    index,
                    speed: &speed,
                    sink: &sink,
                };

                let result = match &locator {
                    RemoteLocator::Http(url) => {
                        http::download_file_http(
                            &client, url, &local_path, &part_path, chunk_size, &policy, &control,
                            &hooks,
                        )
                        .await
                    }
                    RemoteLocator::S3(key) => {
                        s3::download_file_s3(
                            &archive, &bucket, key, &local_path, &part_path, chunk_size, &policy,
                            &control, &hooks,
                        )
                        .await
                    }
                };

                let mut job = job.lock().unwrap();
                let file = &mut job.files[index];
                match result {
                    Ok(bytes_on_disk) => {
                        file.downloaded_bytes = bytes_on_disk;
                        if file.total_bytes == 0 || file.total_bytes < bytes_on_disk {
                            file.total_bytes = bytes_on_disk;
                        }
                        file.status = FileStatus::Complete;
                        file.completed_at = Some(Utc::now());
                        file.error = None;
                        tracing::info!(filename, bytes = bytes_on_disk, "downloaded file");
                    }
                    Err(TransferError::Cancelled) => {
                        file.status = FileStatus::Paused;
                        tracing::info!(filename, "download interrupted, partial retained");
                    }
                    Err(e) => {
                        file.status = FileStatus::Failed;
                        file.error = Some(e.to_string());
                        tracing::error!(filename, error = %e, "download failed");
                    }
                }
                job.recompute_totals();
            });
        }

        while tasks.join_next().await.is_some() {}

        let final_state = {
            let mut job = job.lock().unwrap();
            job.aggregate_file_outcomes(Utc::now());
            job.clone()
        };
        sink.emit_now(&final_state);
        final_state
    }

    /// Materialize manifest entries as file records under the job, skipping
    /// entries whose filename cannot be made safe and entries already
    /// tracked (the resume path).
    fn init_files(&self, manifest: &[FileSpec], target_dir: &Path, job: &SharedJob) {
        let mut job = job.lock().unwrap();
        job.status = JobStatus::Downloading;
        job.started_at.get_or_insert_with(Utc::now);
        job.target_dir = target_dir.to_path_buf();

        let mut skipped = 0usize;
        for spec in manifest {
            let Some(filename) = sanitize_filename(&spec.filename) else {
                tracing::warn!(raw = %truncate(&spec.filename, 100), "blocked unsafe filename");
                skipped += 1;
                continue;
            };
            let local_path = target_dir.join(&filename);
            if !path_within_dir(&local_path, target_dir) {
                tracing::warn!(path = %local_path.display(), "blocked path outside target dir");
                skipped += 1;
                continue;
            }
            if job.files.iter().any(|f| f.filename == filename) {
                continue;
            }
            job.files.push(FileEntry::new(
                filename,
                spec.locator.clone(),
                local_path,
                spec.expected_size,
            ));
        }
        if skipped > 0 {
            tracing::warn!(skipped, "skipped manifest entries with invalid filenames");
        }
        job.recompute_totals();
    }

    /// Fill in sizes for pending files the manifest did not size, so the
    /// job total and ETA are meaningful from the first progress event.
    async fn probe_unknown_sizes(&self, job: &SharedJob) {
        let unknown: Vec<(usize, RemoteLocator)> = {
            let job = job.lock().unwrap();
            job.files
                .iter()
                .enumerate()
                .filter(|(_, f)| f.total_bytes == 0 && f.status == FileStatus::Pending)
                .map(|(i, f)| (i, f.locator.clone()))
                .collect()
        };
        if unknown.is_empty() {
            return;
        }

        let probes = unknown.into_iter().map(|(index, locator)| async move {
            let size = match &locator {
                RemoteLocator::Http(url) => probe::probe_size(&self.client, url).await,
                RemoteLocator::S3(key) => {
                    s3::object_size(&self.archive, &self.archive_bucket, key).await
                }
            };
            (index, size)
        });
        let results = futures_util::future::join_all(probes).await;

        let mut job = job.lock().unwrap();
        for (index, size) in results {
            if let Some(size) = size {
                job.files[index].total_bytes = size;
            }
        }
        job.recompute_totals();
    }
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
