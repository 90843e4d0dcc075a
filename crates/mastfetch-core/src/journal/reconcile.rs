//! Reconcile journaled file entries against on-disk evidence.
//!
//! The journal can lag the filesystem (crash between chunk write and save),
//! so the disk is authoritative: a final file means complete, a `.part`
//! means paused at exactly its byte length, nothing means start over.

use crate::job::{FileStatus, JobState};

/// Rewrite each non-terminal file entry from disk evidence and recompute
/// the job totals.
pub fn reconcile_with_disk(job: &mut JobState) {
    for file in &mut job.files {
        if matches!(file.status, FileStatus::Complete | FileStatus::Failed) {
            continue;
        }

        if let Ok(meta) = std::fs::metadata(&file.local_path) {
            file.downloaded_bytes = meta.len();
            file.total_bytes = meta.len();
            file.status = FileStatus::Complete;
            continue;
        }

        if let Ok(meta) = std::fs::metadata(file.part_path()) {
            file.downloaded_bytes = meta.len();
            file.status = FileStatus::Paused;
            continue;
        }

        file.downloaded_bytes = 0;
        file.status = FileStatus::Pending;
    }
    job.recompute_totals();
}
