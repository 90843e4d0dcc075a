//! Throttled progress publication.
//!
//! All call sites share one policy: at most one emission per interval,
//! except terminal/entry updates which always go through. The callback is
//! responsible for journal persistence and client-facing publication.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::job::JobState;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

type ProgressFn = dyn Fn(&JobState) + Send + Sync;

pub struct ProgressSink {
    callback: Box<ProgressFn>,
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressSink {
    pub fn new(callback: impl Fn(&JobState) + Send + Sync + 'static) -> Self {
        Self::with_interval(callback, DEFAULT_INTERVAL)
    }

    pub fn with_interval(
        callback: impl Fn(&JobState) + Send + Sync + 'static,
        min_interval: Duration,
    ) -> Self {
        Self {
            callback: Box::new(callback),
            min_interval,
            last_emit: Mutex::new(None),
        }
    }

    /// A sink that drops everything; for engine runs nobody observes.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Publish a snapshot unless one was published within the interval.
    /// `snapshot` is only invoked when the emission will happen, so hot
    /// paths do not pay for a clone that would be thrown away.
    pub fn emit_with(&self, snapshot: impl FnOnce() -> JobState) {
        {
            let mut last = self.last_emit.lock().unwrap();
            let now = Instant::now();
            if let Some(t) = *last {
                if now.duration_since(t) < self.min_interval {
                    return;
                }
            }
            *last = Some(now);
        }
        (self.callback)(&snapshot());
    }

    /// Publish unconditionally. Used on run entry and for terminal states.
    pub fn emit_now(&self, job: &JobState) {
        *self.last_emit.lock().unwrap() = Some(Instant::now());
        (self.callback)(job);
    }
}
