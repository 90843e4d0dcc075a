//! LRU + TTL + byte-budget cache for reprojected channel planes.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Config;

use super::key::CacheKey;
use super::plane::ChannelPlane;

type Clock = dyn Fn() -> Instant + Send + Sync;

struct Entry {
    channels: Arc<Vec<ChannelPlane>>,
    inserted_at: Instant,
    bytes: u64,
}

/// Thread-safe result cache. One lock covers the whole store; `get` and
/// `put` each hold it briefly and never across plane construction.
///
/// Eviction order on `put`: expired entries first, then LRU until the byte
/// budget fits, then LRU until the entry-count cap fits.
pub struct ReprojCache {
    ttl: Duration,
    max_entries: usize,
    max_bytes: u64,
    clock: Box<Clock>,
    // Front is least recently used.
    store: Mutex<Vec<(CacheKey, Entry)>>,
}

impl ReprojCache {
    pub fn new(ttl: Duration, max_entries: usize, max_bytes: u64) -> Self {
        Self::with_clock(ttl, max_entries, max_bytes, Instant::now)
    }

    /// Deterministic-clock constructor for tests.
    pub fn with_clock(
        ttl: Duration,
        max_entries: usize,
        max_bytes: u64,
        clock: impl Fn() -> Instant + Send + Sync + 'static,
    ) -> Self {
        Self {
            ttl,
            max_entries,
            max_bytes,
            clock: Box::new(clock),
            store: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.reproj_cache_ttl_s),
            config.reproj_cache_max_entries,
            config.reproj_cache_max_bytes,
        )
    }

    /// Cached planes for a key, or `None` on miss/expiry. Expired entries
    /// are evicted lazily here; a hit becomes the most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<ChannelPlane>>> {
        let now = (self.clock)();
        let mut store = self.store.lock().unwrap();
        let index = store.iter().position(|(k, _)| k == key)?;

        if now.duration_since(store[index].1.inserted_at) > self.ttl {
            store.remove(index);
            tracing::debug!(key = %key.short(), "reprojection cache entry expired");
            return None;
        }

        // Move to the back: most recently used.
        let entry = store.remove(index);
        store.push(entry);
        Some(Arc::clone(&store.last().unwrap().1.channels))
    }

    /// Insert a result. Entries larger than the whole budget are rejected;
    /// otherwise eviction makes room and the insert always succeeds.
    /// Returns whether the entry was stored.
    pub fn put(&self, key: CacheKey, channels: Vec<ChannelPlane>) -> bool {
        let entry_bytes: u64 = channels.iter().map(|p| p.byte_len()).sum();
        if entry_bytes > self.max_bytes {
            tracing::info!(
                entry_mb = entry_bytes / (1024 * 1024),
                limit_mb = self.max_bytes / (1024 * 1024),
                "reprojection cache skip, entry exceeds whole budget"
            );
            return false;
        }

        let now = (self.clock)();
        let mut store = self.store.lock().unwrap();

        // Re-inserting an existing key replaces it.
        if let Some(index) = store.iter().position(|(k, _)| k == &key) {
            store.remove(index);
        }

        store.retain(|(k, e)| {
            let keep = now.duration_since(e.inserted_at) <= self.ttl;
            if !keep {
                tracing::debug!(key = %k.short(), "reprojection cache entry expired");
            }
            keep
        });

        let mut total: u64 = store.iter().map(|(_, e)| e.bytes).sum();
        while !store.is_empty() && total + entry_bytes > self.max_bytes {
            let (evicted, entry) = store.remove(0);
            total -= entry.bytes;
            tracing::debug!(key = %evicted.short(), "reprojection cache evicted (bytes)");
        }
        while !store.is_empty() && store.len() >= self.max_entries {
            let (evicted, _) = store.remove(0);
            tracing::debug!(key = %evicted.short(), "reprojection cache evicted (count)");
        }

        store.push((
            key,
            Entry {
                channels: Arc::new(channels),
                inserted_at: now,
                bytes: entry_bytes,
            },
        ));
        true
    }

    /// Current byte total; test and diagnostics hook.
    pub fn total_bytes(&self) -> u64 {
        self.store.lock().unwrap().iter().map(|(_, e)| e.bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
