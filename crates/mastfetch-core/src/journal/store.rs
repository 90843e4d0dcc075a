//! Journal storage: save, load, delete, and the resumable-job listing.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobState, JobStatus};

use super::reconcile::reconcile_with_disk;
use super::STATE_DIR_NAME;

/// Journal record: job state plus the wall-clock time it was saved, used by
/// retention cleanup.
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    job: JobState,
}

/// Summary returned by the resumable-jobs listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumableJobSummary {
    pub job_id: String,
    pub source_id: String,
    pub status: String,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub percent: f64,
    pub total_files: usize,
    pub completed_files: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Persistent store for download job state, one file per job id.
pub struct StateJournal {
    state_dir: PathBuf,
    download_root: PathBuf,
}

impl StateJournal {
    /// Open (or create) the journal under the download root.
    pub fn open(download_root: &Path) -> Result<Self> {
        let state_dir = download_root.join(STATE_DIR_NAME);
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("create state dir: {}", state_dir.display()))?;
        Ok(Self {
            state_dir,
            download_root: download_root.to_path_buf(),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub(super) fn download_root(&self) -> &Path {
        &self.download_root
    }

    fn entry_path(&self, job_id: &str) -> PathBuf {
        self.state_dir.join(format!("{job_id}.json"))
    }

    /// Persist a job state. Write-to-temp then rename, so a concurrent
    /// reader sees either the old or the new record, never a torn one.
    pub fn save(&self, job: &JobState) -> Result<()> {
        let record = JournalRecord {
            saved_at: Utc::now(),
            job: job.clone(),
        };
        let json = serde_json::to_vec_pretty(&record).context("serialize job state")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.state_dir)
            .context("create journal temp file")?;
        tmp.write_all(&json).context("write journal temp file")?;
        tmp.persist(self.entry_path(&job.job_id))
            .with_context(|| format!("persist journal entry for {}", job.job_id))?;
        tracing::debug!(job_id = %job.job_id, status = %job.status, "journaled job state");
        Ok(())
    }

    /// Load a job state, reconciled against on-disk download evidence.
    /// Returns `None` when no entry exists or the entry cannot be parsed.
    pub fn load(&self, job_id: &str) -> Option<JobState> {
        let path = self.entry_path(job_id);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!(job_id, error = %e, "failed to read journal entry");
                return None;
            }
        };
        let record: JournalRecord = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(job_id, error = %e, "failed to parse journal entry");
                return None;
            }
        };

        let mut job = record.job;
        reconcile_with_disk(&mut job);
        tracing::info!(
            job_id,
            downloaded = job.downloaded_bytes,
            total = job.total_bytes,
            "loaded journaled job state"
        );
        Some(job)
    }

    /// Remove a job's journal entry. Absent entries are not an error.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        match std::fs::remove_file(self.entry_path(job_id)) {
            Ok(()) => {
                tracing::debug!(job_id, "deleted journal entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete journal entry for {job_id}")),
        }
    }

    pub fn exists(&self, job_id: &str) -> bool {
        self.entry_path(job_id).is_file()
    }

    /// All job ids with a journal entry.
    pub fn job_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.state_dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect()
    }

    /// Jobs that can be resumed: status in {paused, failed, downloading}
    /// with at least one file still needing transfer work. Duplicates per
    /// source id are collapsed to the entry with the most progress; the
    /// losers' journal files are removed.
    pub fn list_resumable(&self) -> Vec<ResumableJobSummary> {
        let mut candidates = Vec::new();
        for job_id in self.job_ids() {
            let Some(job) = self.load(&job_id) else {
                continue;
            };
            if !matches!(
                job.status,
                JobStatus::Paused | JobStatus::Failed | JobStatus::Downloading
            ) {
                continue;
            }
            if !job.files.iter().any(|f| f.status.needs_download()) {
                continue;
            }
            candidates.push(ResumableJobSummary {
                job_id: job.job_id.clone(),
                source_id: job.source_id.clone(),
                status: job.status.as_str().to_string(),
                total_bytes: job.total_bytes,
                downloaded_bytes: job.downloaded_bytes,
                percent: job.percent(),
                total_files: job.files.len(),
                completed_files: job.completed_files(),
                started_at: job.started_at,
            });
        }

        let mut best_by_source: HashMap<String, ResumableJobSummary> = HashMap::new();
        let mut stale = Vec::new();
        for candidate in candidates {
            match best_by_source.get(&candidate.source_id) {
                Some(existing) if candidate.downloaded_bytes <= existing.downloaded_bytes => {
                    stale.push(candidate.job_id);
                }
                Some(existing) => {
                    stale.push(existing.job_id.clone());
                    best_by_source.insert(candidate.source_id.clone(), candidate);
                }
                None => {
                    best_by_source.insert(candidate.source_id.clone(), candidate);
                }
            }
        }
        for job_id in stale {
            if let Err(e) = self.delete(&job_id) {
                tracing::warn!(job_id, error = %e, "failed to remove duplicate journal entry");
            } else {
                tracing::info!(job_id, "removed duplicate journal entry");
            }
        }

        let mut out: Vec<_> = best_by_source.into_values().collect();
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        out
    }

    /// Raw status + saved_at for housekeeping, without reconciliation.
    pub(super) fn peek(&self, job_id: &str) -> Option<(JobStatus, DateTime<Utc>)> {
        let bytes = std::fs::read(self.entry_path(job_id)).ok()?;
        let record: JournalRecord = serde_json::from_slice(&bytes).ok()?;
        Some((record.job.status, record.saved_at))
    }
}
