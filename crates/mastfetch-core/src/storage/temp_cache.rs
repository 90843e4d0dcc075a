//! LRU temp file cache for S3 reads.
//!
//! When the service runs against object storage, FITS files must be
//! materialized on local disk before downstream readers can open them. The
//! cache keeps them in a bounded directory, preserving the key structure,
//! and evicts least-recently-used files once the byte budget is exceeded.
//!
//! Access time is tracked through the file modified timestamp, bumped on
//! every hit; eviction may race with a concurrent read, which the S3
//! backend tolerates by re-downloading.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::sanitize::validate_key;

use super::StorageError;

pub struct TempFileCache {
    cache_dir: PathBuf,
    max_bytes: u64,
    // Guards the eviction scan; file I/O on individual entries happens
    // outside this lock.
    evict_lock: Mutex<()>,
}

impl TempFileCache {
    pub fn new(cache_dir: &Path, max_bytes: u64) -> anyhow::Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            max_bytes,
            evict_lock: Mutex::new(()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cached file path for a key if present, bumping its access time.
    pub fn get(&self, key: &str) -> Result<Option<PathBuf>, StorageError> {
        let path = self.key_to_path(key)?;
        match std::fs::File::open(&path) {
            Ok(file) => {
                // Bump the LRU clock; losing the race to eviction here just
                // means the caller re-downloads.
                let _ = file.set_modified(SystemTime::now());
                Ok(Some(path))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reserve a slot for a key and return the local path to write to.
    /// The caller writes the content and then calls `evict_if_needed`.
    pub fn reserve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Remove oldest-access files until the cache is within budget.
    /// Returns the number of files evicted.
    pub fn evict_if_needed(&self) -> Result<usize, StorageError> {
        let _guard = self.evict_lock.lock().unwrap();

        let mut files = Vec::new();
        collect_files(&self.cache_dir, &mut files)?;
        let mut total: u64 = files.iter().map(|(_, size, _)| size).sum();
        if total <= self.max_bytes {
            return Ok(0);
        }

        // Oldest access first.
        files.sort_by_key(|(_, _, mtime)| *mtime);

        let mut evicted = 0usize;
        for (path, size, _) in files {
            if total <= self.max_bytes {
                break;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    total = total.saturating_sub(size);
                    evicted += 1;
                    tracing::debug!(path = %path.display(), size, "evicted cached file");
                }
                // Already gone: another thread deleted it.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "temp cache eviction failed");
                }
            }
        }

        if evicted > 0 {
            tracing::info!(
                evicted,
                remaining_bytes = total,
                budget = self.max_bytes,
                "temp cache eviction complete"
            );
            self.prune_empty_dirs(&self.cache_dir);
        }
        Ok(evicted)
    }

    /// Total bytes currently held. Used by tests and diagnostics.
    pub fn total_bytes(&self) -> Result<u64, StorageError> {
        let mut files = Vec::new();
        collect_files(&self.cache_dir, &mut files)?;
        Ok(files.iter().map(|(_, size, _)| size).sum())
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let key = validate_key(key).map_err(|reason| StorageError::invalid_key(key, reason))?;
        Ok(self.cache_dir.join(key))
    }

    /// Remove empty directories left behind by eviction; never removes the
    /// cache root itself.
    fn prune_empty_dirs(&self, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.prune_empty_dirs(&path);
                // rmdir only succeeds when empty.
                let _ = std::fs::remove_dir(&path);
            }
        }
    }
}

fn collect_files(
    dir: &Path,
    out: &mut Vec<(PathBuf, u64, SystemTime)>,
) -> Result<(), StorageError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if let Ok(meta) = entry.metadata() {
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            out.push((path, meta.len(), mtime));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache(max_bytes: u64) -> (tempfile::TempDir, TempFileCache) {
        let dir = tempfile::tempdir().unwrap();
        let c = TempFileCache::new(dir.path(), max_bytes).unwrap();
        (dir, c)
    }

    fn fill(cache: &TempFileCache, key: &str, bytes: &[u8]) -> PathBuf {
        let path = cache.reserve(key).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn get_misses_then_hits() {
        let (_dir, c) = cache(1024);
        assert!(c.get("obs/a.fits").unwrap().is_none());
        fill(&c, "obs/a.fits", b"0123456789");
        let hit = c.get("obs/a.fits").unwrap().unwrap();
        assert!(hit.ends_with("obs/a.fits"));
    }

    #[test]
    fn keys_preserve_structure_on_disk() {
        let (dir, c) = cache(1024);
        fill(&c, "jwst/public/02733/a.fits", b"x");
        assert!(dir.path().join("jwst/public/02733/a.fits").is_file());
    }

    #[test]
    fn eviction_removes_oldest_until_within_budget() {
        let (_dir, c) = cache(25);
        let p1 = fill(&c, "a/one.bin", &[1u8; 10]);
        let p2 = fill(&c, "b/two.bin", &[2u8; 10]);
        let p3 = fill(&c, "c/three.bin", &[3u8; 10]);
        // Order access times explicitly so the test does not depend on
        // filesystem timestamp resolution.
        let base = SystemTime::now() - Duration::from_secs(100);
        for (i, p) in [&p1, &p2, &p3].iter().enumerate() {
            std::fs::File::open(p)
                .unwrap()
                .set_modified(base + Duration::from_secs(i as u64))
                .unwrap();
        }

        let evicted = c.evict_if_needed().unwrap();
        assert_eq!(evicted, 1);
        assert!(!p1.exists(), "oldest entry must be evicted first");
        assert!(p2.exists());
        assert!(p3.exists());
        assert!(c.total_bytes().unwrap() <= 25);
    }

    #[test]
    fn eviction_prunes_empty_dirs() {
        let (dir, c) = cache(5);
        fill(&c, "deep/nested/file.bin", &[0u8; 10]);
        c.evict_if_needed().unwrap();
        assert!(!dir.path().join("deep").exists());
        assert!(dir.path().exists(), "cache root is kept");
    }

    #[test]
    fn within_budget_is_noop() {
        let (_dir, c) = cache(1024);
        fill(&c, "a.bin", &[0u8; 10]);
        assert_eq!(c.evict_if_needed().unwrap(), 0);
    }

    #[test]
    fn racing_writers_converge_on_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let c = std::sync::Arc::new(TempFileCache::new(dir.path(), 1 << 20).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = std::sync::Arc::clone(&c);
            handles.push(std::thread::spawn(move || {
                let path = c.reserve("obs/shared.fits").unwrap();
                std::fs::write(path, b"same bytes").unwrap();
                c.evict_if_needed().unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let hit = c.get("obs/shared.fits").unwrap().unwrap();
        assert_eq!(std::fs::read(hit).unwrap(), b"same bytes");
        assert_eq!(c.total_bytes().unwrap(), 10);
    }

    #[test]
    fn invalid_keys_rejected() {
        let (_dir, c) = cache(10);
        assert!(c.get("../escape").is_err());
        assert!(c.reserve("/abs").is_err());
    }
}
