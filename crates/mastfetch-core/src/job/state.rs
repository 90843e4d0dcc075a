//! Job and file-entry records, plus the manifest entry type.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{FileStatus, JobStatus};

/// Where a file's bytes live on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "locator", rename_all = "lowercase")]
pub enum RemoteLocator {
    /// Plain HTTPS URL served by the archive portal.
    Http(String),
    /// Object key in the public archive mirror bucket.
    S3(String),
}

impl RemoteLocator {
    pub fn as_str(&self) -> &str {
        match self {
            RemoteLocator::Http(url) => url,
            RemoteLocator::S3(key) => key,
        }
    }
}

/// One manifest entry: a remote blob and the filename it should land under.
/// The filename is raw at this point; the engine sanitizes it before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    pub locator: RemoteLocator,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
}

/// Transfer state for a single file within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub locator: RemoteLocator,
    pub local_path: PathBuf,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub downloaded_bytes: u64,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    pub fn new(filename: String, locator: RemoteLocator, local_path: PathBuf, size: Option<u64>) -> Self {
        Self {
            filename,
            locator,
            local_path,
            total_bytes: size.unwrap_or(0),
            downloaded_bytes: 0,
            status: FileStatus::Pending,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Path of the partial download; its byte length is the confirmed
    /// resume offset while the file is in flight.
    pub fn part_path(&self) -> PathBuf {
        let mut name = self.local_path.as_os_str().to_os_string();
        name.push(".part");
        PathBuf::from(name)
    }
}

/// State of an entire download job. The registry owns the live instance;
/// the journal stores a JSON projection of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub source_id: String,
    pub target_dir: PathBuf,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub downloaded_bytes: u64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(job_id: String, source_id: String, target_dir: PathBuf) -> Self {
        Self {
            job_id,
            source_id,
            target_dir,
            files: Vec::new(),
            total_bytes: 0,
            downloaded_bytes: 0,
            status: JobStatus::Pending,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Re-establish the cross-entity invariants: job totals are the sums of
    /// the per-file counters. Call after any batch of file mutations.
    pub fn recompute_totals(&mut self) {
        self.total_bytes = self.files.iter().map(|f| f.total_bytes).sum();
        self.downloaded_bytes = self.files.iter().map(|f| f.downloaded_bytes).sum();
    }

    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn completed_files(&self) -> usize {
        self.files.iter().filter(|f| f.status == FileStatus::Complete).count()
    }

    /// Whether this job can continue from recorded per-file offsets.
    /// Paused and failed jobs are always offered for resume; a job still
    /// marked downloading (crash evidence) is resumable while any file
    /// has transfer work left. Cancelled jobs are not resumable.
    pub fn is_resumable(&self) -> bool {
        match self.status {
            JobStatus::Paused | JobStatus::Failed => true,
            JobStatus::Downloading => self.files.iter().any(|f| f.status != FileStatus::Complete),
            _ => false,
        }
    }

    pub fn file_by_name(&self, filename: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.filename == filename)
    }

    /// Aggregate per-file outcomes into the job status after an engine run.
    /// Any failed file fails the job; otherwise any paused file leaves it
    /// paused; a fully complete file set completes it.
    pub fn aggregate_file_outcomes(&mut self, now: DateTime<Utc>) {
        self.recompute_totals();
        let failed = self.files.iter().filter(|f| f.status == FileStatus::Failed).count();
        let paused = self
            .files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Paused | FileStatus::Pending | FileStatus::Downloading))
            .count();
        if failed > 0 {
            self.status = JobStatus::Failed;
            self.error = Some(format!("{failed} file(s) failed to download"));
        } else if paused > 0 {
            self.status = JobStatus::Paused;
        } else {
            self.status = JobStatus::Complete;
            self.completed_at = Some(now);
        }
    }

    /// Resolve a sanitized filename inside this job's target directory.
    pub fn local_path_for(&self, filename: &str) -> PathBuf {
        self.target_dir.join(filename)
    }
}

/// Target directory for a source id under the download root.
pub fn target_dir_for(download_root: &Path, source_id: &str) -> PathBuf {
    download_root.join(source_id)
}
