//! Live job tracking and journaled status transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::engine::{DownloadControl, SpeedTracker};
use crate::job::{FileStatus, JobSnapshot, JobState, JobStatus, SharedJob};
use crate::journal::{ResumableJobSummary, StateJournal};

/// Registry failure taxonomy; the control plane maps these onto statuses.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
    #[error("job {0} cannot be resumed from its current state")]
    NotResumable(String),
    #[error("job {0} is already being resumed")]
    ResumeConflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything the process holds for one live job: the shared state, the
/// pause/cancel gates of its current run, and its speed window.
struct LiveJob {
    job: SharedJob,
    control: Arc<DownloadControl>,
    speed: Arc<SpeedTracker>,
}

pub struct JobRegistry {
    jobs: Mutex<HashMap<String, LiveJob>>,
    journal: Arc<StateJournal>,
    in_memory_retention: Duration,
}

impl JobRegistry {
    pub fn new(journal: Arc<StateJournal>, in_memory_retention: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            journal,
            in_memory_retention,
        }
    }

    pub fn journal(&self) -> &Arc<StateJournal> {
        &self.journal
    }

    /// Create a new pending job and return its id. Completed jobs older
    /// than the in-memory window are pruned on the way.
    pub fn create(&self, source_id: &str, target_dir: std::path::PathBuf) -> (String, SharedJob) {
        let job_id = new_job_id();
        let job = Arc::new(Mutex::new(JobState::new(
            job_id.clone(),
            source_id.to_string(),
            target_dir,
        )));
        let live = LiveJob {
            job: Arc::clone(&job),
            control: Arc::new(DownloadControl::new()),
            speed: Arc::new(SpeedTracker::default()),
        };
        {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.insert(job_id.clone(), live);
        }
        tracing::info!(job_id, source_id, "created download job");
        self.prune_completed();
        (job_id, job)
    }

    /// Re-admit a journaled job for a resume run, with fresh gates and a
    /// fresh speed window.
    pub fn insert_resumed(&self, state: JobState) -> SharedJob {
        let job_id = state.job_id.clone();
        let job = Arc::new(Mutex::new(state));
        let live = LiveJob {
            job: Arc::clone(&job),
            control: Arc::new(DownloadControl::new()),
            speed: Arc::new(SpeedTracker::default()),
        };
        self.jobs.lock().unwrap().insert(job_id, live);
        job
    }

    pub fn get(&self, job_id: &str) -> Option<SharedJob> {
        self.jobs.lock().unwrap().get(job_id).map(|l| Arc::clone(&l.job))
    }

    pub fn control(&self, job_id: &str) -> Option<Arc<DownloadControl>> {
        self.jobs.lock().unwrap().get(job_id).map(|l| Arc::clone(&l.control))
    }

    pub fn speed(&self, job_id: &str) -> Option<Arc<SpeedTracker>> {
        self.jobs.lock().unwrap().get(job_id).map(|l| Arc::clone(&l.speed))
    }

    /// Drop a job from memory. Its journal entry, if any, stays.
    pub fn evict(&self, job_id: &str) {
        self.jobs.lock().unwrap().remove(job_id);
    }

    /// Atomically apply a status transition, rejecting illegal ones, and
    /// journal the result. `patch` runs under the job lock after the
    /// status change.
    pub fn transition(
        &self,
        job_id: &str,
        next: JobStatus,
        patch: impl FnOnce(&mut JobState),
    ) -> Result<(), RegistryError> {
        let shared = self
            .get(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;
        let snapshot = {
            let mut job = shared.lock().unwrap();
            if !job.status.can_transition_to(next) {
                return Err(RegistryError::IllegalTransition {
                    from: job.status,
                    to: next,
                });
            }
            tracing::info!(job_id, from = %job.status, to = %next, "job transition");
            job.status = next;
            patch(&mut job);
            job.recompute_totals();
            job.clone()
        };
        self.journal
            .save(&snapshot)
            .map_err(RegistryError::Other)?;
        Ok(())
    }

    /// Live snapshot with throughput, or a read-only snapshot
    /// rematerialized from the journal when the job is not resident.
    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        if let Some(live) = self.live_view(job_id) {
            let (job, speed) = live;
            let state = job.lock().unwrap().clone();
            let rate = speed.speed_bytes_per_sec();
            let remaining = state.total_bytes.saturating_sub(state.downloaded_bytes);
            let eta = if state.status == JobStatus::Downloading {
                speed.eta_seconds(remaining)
            } else {
                None
            };
            return Some(JobSnapshot::from_state(&state, rate, eta));
        }
        let state = self.journal.load(job_id)?;
        Some(JobSnapshot::from_state(&state, 0.0, None))
    }

    /// Resumable jobs from the journal, deduplicated by source id.
    pub fn list_resumable(&self) -> Vec<ResumableJobSummary> {
        self.journal.list_resumable()
    }

    /// Remove a job's journal entry and optionally its completed files.
    /// Returns the number of files deleted. Files still in flight keep
    /// their partials; only `complete` entries are deletion candidates.
    pub fn dismiss(&self, job_id: &str, delete_files: bool) -> Result<usize, RegistryError> {
        let journaled = self.journal.load(job_id);
        let live = self.get(job_id);
        if journaled.is_none() && live.is_none() {
            return Err(RegistryError::NotFound(job_id.to_string()));
        }

        let mut deleted = 0usize;
        if delete_files {
            if let Some(state) = journaled.as_ref() {
                for file in &state.files {
                    if file.status != FileStatus::Complete {
                        continue;
                    }
                    if std::fs::remove_file(&file.local_path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }

        self.journal.delete(job_id).map_err(RegistryError::Other)?;
        self.evict(job_id);
        tracing::info!(job_id, deleted, "dismissed job");
        Ok(deleted)
    }

    /// Drop in-memory entries for jobs that reached a terminal state longer
    /// than the retention window ago.
    pub fn prune_completed(&self) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.in_memory_retention)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let mut jobs = self.jobs.lock().unwrap();
        jobs.retain(|job_id, live| {
            let job = live.job.lock().unwrap();
            let expired = job.status.is_terminal()
                && job.completed_at.map(|t| t < cutoff).unwrap_or(false);
            if expired {
                tracing::debug!(job_id, "pruned completed job from memory");
            }
            !expired
        });
    }

    fn live_view(&self, job_id: &str) -> Option<(SharedJob, Arc<SpeedTracker>)> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_id)
            .map(|l| (Arc::clone(&l.job), Arc::clone(&l.speed)))
    }
}

/// Short opaque job identifier: 12 hex chars of a v4 uuid.
fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
