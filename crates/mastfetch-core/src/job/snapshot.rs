//! Client-facing job snapshot: the record every progress publication carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobState;
use super::status::JobStatus;

/// Per-file progress view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub filename: String,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub status: String,
}

/// Self-consistent snapshot of one job, as returned by the progress query
/// and handed to progress sinks. All fields are computed from a single
/// locked view of the job; speed and ETA come from the job's speed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub source_id: String,
    pub status: String,
    pub message: String,
    pub total_files: usize,
    pub completed_files: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub percent: f64,
    pub speed_bytes_per_sec: f64,
    pub eta_seconds: Option<f64>,
    pub files: Vec<FileSnapshot>,
    pub is_resumable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// Build a snapshot from job state plus instantaneous throughput.
    pub fn from_state(job: &JobState, speed_bytes_per_sec: f64, eta_seconds: Option<f64>) -> Self {
        let completed = job.completed_files();
        Self {
            job_id: job.job_id.clone(),
            source_id: job.source_id.clone(),
            status: job.status.as_str().to_string(),
            message: describe(job, completed),
            total_files: job.files.len(),
            completed_files: completed,
            total_bytes: job.total_bytes,
            downloaded_bytes: job.downloaded_bytes,
            percent: job.percent(),
            speed_bytes_per_sec,
            eta_seconds,
            files: job
                .files
                .iter()
                .map(|f| FileSnapshot {
                    filename: f.filename.clone(),
                    total_bytes: f.total_bytes,
                    downloaded_bytes: f.downloaded_bytes,
                    status: f.status.as_str().to_string(),
                })
                .collect(),
            is_resumable: job.is_resumable(),
            error: job.error.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

fn describe(job: &JobState, completed: usize) -> String {
    match job.status {
        JobStatus::Pending => "Queued for download".to_string(),
        JobStatus::FetchingManifest => format!("Fetching product list for {}", job.source_id),
        JobStatus::Downloading => {
            format!("Downloading file {}/{}", completed.min(job.files.len().saturating_sub(1)) + 1, job.files.len())
        }
        JobStatus::Paused => "Paused".to_string(),
        JobStatus::Cancelled => "Cancelled".to_string(),
        JobStatus::Complete => format!("Downloaded {} files", job.files.len()),
        JobStatus::Failed => job
            .error
            .clone()
            .map(|e| format!("Failed: {e}"))
            .unwrap_or_else(|| "Failed".to_string()),
    }
}
