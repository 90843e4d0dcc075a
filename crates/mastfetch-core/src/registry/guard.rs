//! Guard against concurrent resumes of the same job.
//!
//! A process-wide set of job ids currently being resumed, consulted under
//! one mutex. The ticket releases its slot on drop, so the engine run's
//! exit path cannot forget to release it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct ResumeGuard {
    resuming: Mutex<HashSet<String>>,
}

impl ResumeGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the resume slot for a job. Returns `None` when another resume
    /// for the same job is already in flight.
    pub fn acquire(self: &Arc<Self>, job_id: &str) -> Option<ResumeTicket> {
        let mut resuming = self.resuming.lock().unwrap();
        if !resuming.insert(job_id.to_string()) {
            return None;
        }
        Some(ResumeTicket {
            guard: Arc::clone(self),
            job_id: job_id.to_string(),
        })
    }

    pub fn is_resuming(&self, job_id: &str) -> bool {
        self.resuming.lock().unwrap().contains(job_id)
    }

    fn release(&self, job_id: &str) {
        self.resuming.lock().unwrap().remove(job_id);
    }
}

/// RAII slot held for the duration of one resume/download run.
pub struct ResumeTicket {
    guard: Arc<ResumeGuard>,
    job_id: String,
}

impl Drop for ResumeTicket {
    fn drop(&mut self) {
        self.guard.release(&self.job_id);
    }
}
