//! Job and file status enums and the legal-transition table.

use serde::{Deserialize, Serialize};

/// High-level job state, journaled as a lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    FetchingManifest,
    Downloading,
    Paused,
    Cancelled,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::FetchingManifest => "fetching_manifest",
            JobStatus::Downloading => "downloading",
            JobStatus::Paused => "paused",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states: no further transitions are legal.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Cancelled)
    }

    /// Pseudo-terminal states a job can be restarted from.
    pub fn is_resumable(self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::Failed)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// `pending -> downloading` skips the manifest fetch; that is the resume
    /// path, where the manifest is already recorded in the journal.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, FetchingManifest)
                | (Pending, Downloading)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (FetchingManifest, Downloading)
                | (FetchingManifest, Cancelled)
                | (FetchingManifest, Failed)
                | (Downloading, Complete)
                | (Downloading, Paused)
                | (Downloading, Cancelled)
                | (Downloading, Failed)
                | (Paused, Downloading)
                | (Paused, Cancelled)
                | (Failed, Downloading)
                | (Failed, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Downloading,
    Complete,
    Failed,
    Paused,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Downloading => "downloading",
            FileStatus::Complete => "complete",
            FileStatus::Failed => "failed",
            FileStatus::Paused => "paused",
        }
    }

    /// Files in these states still need transfer work.
    pub fn needs_download(self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Downloading | FileStatus::Paused)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
