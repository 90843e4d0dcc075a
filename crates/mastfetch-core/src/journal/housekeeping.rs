//! Journal housekeeping: retention cleanup and orphaned-part removal.
//!
//! Runs at startup and after each job completes.

use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::job::JobStatus;

use super::store::StateJournal;
use super::STATE_DIR_NAME;

impl StateJournal {
    /// Remove journal entries in a terminal-ish state older than the
    /// retention window. Returns the number removed.
    pub fn cleanup_completed(&self, retention: Duration) -> usize {
        let cutoff =
        Utc::now() - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        let mut removed = 0usize;

        for job_id in self.job_ids() {
            let Some((status, saved_at)) = self.peek(&job_id) else {
                continue;
            };
            let expired = matches!(
                status,
                JobStatus::Complete | JobStatus::Cancelled | JobStatus::Failed
            ) && saved_at < cutoff;
            if expired {
                match self.delete(&job_id) {
                    Ok(()) => {
                        removed += 1;
                        tracing::debug!(job_id, status = %status, "cleaned up old journal entry");
                    }
                    Err(e) => tracing::warn!(job_id, error = %e, "journal cleanup failed"),
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "cleaned up old journal entries");
        }
        removed
    }

    /// Remove `.part` files under the download root older than the
    /// retention window. Returns the number removed.
    pub fn cleanup_orphaned_parts(&self, retention: Duration) -> usize {
        let cutoff = SystemTime::now() - retention;
        let mut removed = 0usize;

        let Ok(entries) = std::fs::read_dir(self.download_root()) else {
            return 0;
        };
        for entry in entries.flatten() {
            if entry.file_name() == STATE_DIR_NAME {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                removed += remove_stale_parts(&path, cutoff);
            }
        }

        if removed > 0 {
            tracing::info!(removed, "removed orphaned partial files");
        }
        removed
    }
}

fn remove_stale_parts(dir: &Path, cutoff: SystemTime) -> usize {
    let mut removed = 0usize;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("part") {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime < cutoff)
            .unwrap_or(false);
        if stale {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(path = %path.display(), "removed orphaned partial file");
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file"),
            }
        }
    }
    removed
}
