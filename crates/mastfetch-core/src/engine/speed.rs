//! Download speed tracking over a sliding time window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Sliding window of byte-delta samples. Per-job and transient; never
/// journaled. Thread-safe so concurrent file transfers can feed it.
pub struct SpeedTracker {
    window: Duration,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SpeedTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a freshly transferred byte delta.
    pub fn record(&self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Current throughput in bytes per second, from the samples inside the
    /// window. Needs at least two samples to report a rate.
    pub fn speed_bytes_per_sec(&self) -> f64 {
        self.speed_at(Instant::now())
    }

    /// Estimated seconds remaining, or `None` while the rate is unknown.
    pub fn eta_seconds(&self, remaining_bytes: u64) -> Option<f64> {
        if remaining_bytes == 0 {
            return Some(0.0);
        }
        let speed = self.speed_bytes_per_sec();
        if speed <= 0.0 {
            return None;
        }
        Some(remaining_bytes as f64 / speed)
    }

    fn record_at(&self, now: Instant, bytes: u64) {
        let mut samples = self.samples.lock().unwrap();
        samples.push_back((now, bytes));
        Self::drop_expired(&mut samples, now, self.window);
    }

    fn speed_at(&self, now: Instant) -> f64 {
        let mut samples = self.samples.lock().unwrap();
        Self::drop_expired(&mut samples, now, self.window);
        if samples.len() < 2 {
            return 0.0;
        }
        let total: u64 = samples.iter().map(|(_, b)| b).sum();
        let span = samples
            .back()
            .unwrap()
            .0
            .duration_since(samples.front().unwrap().0)
            .as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        total as f64 / span
    }

    fn drop_expired(samples: &mut VecDeque<(Instant, u64)>, now: Instant, window: Duration) {
        while let Some((t, _)) = samples.front() {
            if now.duration_since(*t) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}
