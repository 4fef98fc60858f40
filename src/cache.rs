// src/cache.rs

//! TTL-gated byte cache for remote feeds
//!
//! Each entry is one file `<dir>/<key>.json`. An entry is fresh while its
//! modification time is within the TTL of the injected clock's "now". There
//! is no eviction: stale files are simply ignored and overwritten by the next
//! successful fetch.
//!
//! Writes are best-effort. A failed write is logged and swallowed so that a
//! read-only or full cache directory never fails an aggregation cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Source of "now" for freshness checks
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Persistent cache keyed by source identifier
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    /// Armed by `invalidate`, consumed by `begin_cycle`
    invalidate_next: AtomicBool,
    /// Reads miss unconditionally for the current cycle
    bypass: AtomicBool,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .field("bypass", &self.bypass.load(Ordering::Relaxed))
            .finish()
    }
}

impl CacheStore {
    /// Create a cache over `dir` using the wall clock
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_clock(dir, ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock
    pub fn with_clock(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            clock,
            invalidate_next: AtomicBool::new(false),
            bypass: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Force the next cycle to bypass reads regardless of freshness
    pub fn invalidate(&self) {
        self.invalidate_next.store(true, Ordering::SeqCst);
    }

    /// Start a new aggregation cycle
    ///
    /// Consumes a pending invalidation; returns whether this cycle bypasses
    /// reads.
    pub fn begin_cycle(&self) -> bool {
        let bypass = self.invalidate_next.swap(false, Ordering::SeqCst);
        self.bypass.store(bypass, Ordering::SeqCst);
        if bypass {
            debug!("Cache bypassed for this cycle");
        }
        bypass
    }

    /// Read a fresh entry
    ///
    /// Returns `None` if the entry is absent, older than the TTL, unreadable,
    /// or the current cycle bypasses the cache.
    pub async fn read(&self, key: &str) -> Option<Vec<u8>> {
        if self.bypass.load(Ordering::SeqCst) {
            return None;
        }

        let path = self.entry_path(key);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let modified = metadata.modified().ok()?;

        // A future mtime counts as fresh
        let age = self
            .clock
            .now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            debug!("Cache entry {} is stale ({}s old)", key, age.as_secs());
            return None;
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Cache hit for {} ({} bytes)", key, bytes.len());
                Some(bytes)
            }
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist an entry; failures are logged, never returned
    pub async fn write(&self, key: &str, bytes: &[u8]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Failed to create cache directory {}: {}", self.dir.display(), e);
            return;
        }

        let path = self.entry_path(key);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!("Failed to write cache entry {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Clock that reports the wall clock shifted by a settable offset
    struct OffsetClock(Mutex<Duration>);

    impl OffsetClock {
        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for OffsetClock {
        fn now(&self) -> SystemTime {
            SystemTime::now() + *self.0.lock().unwrap()
        }
    }

    const TTL: Duration = Duration::from_secs(6 * 3600);

    #[tokio::test]
    async fn test_read_after_write() {
        let temp = TempDir::new().unwrap();
        let cache = CacheStore::new(temp.path(), TTL);

        cache.write("formula", b"[1,2,3]").await;
        assert_eq!(cache.read("formula").await.as_deref(), Some(&b"[1,2,3]"[..]));
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let temp = TempDir::new().unwrap();
        let cache = CacheStore::new(temp.path(), TTL);
        assert!(cache.read("cask").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_after_ttl() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(OffsetClock(Mutex::new(Duration::ZERO)));
        let cache = CacheStore::with_clock(temp.path(), TTL, clock.clone());

        cache.write("formula", b"{}").await;
        assert!(cache.read("formula").await.is_some());

        clock.advance(TTL + Duration::from_secs(60));
        assert!(cache.read("formula").await.is_none());
        assert!(temp.path().join("formula.json").exists());
    }

    #[tokio::test]
    async fn test_invalidation_lasts_one_cycle() {
        let temp = TempDir::new().unwrap();
        let cache = CacheStore::new(temp.path(), TTL);
        cache.write("formula", b"{}").await;

        cache.invalidate();
        assert!(cache.begin_cycle());
        assert!(cache.read("formula").await.is_none());

        assert!(!cache.begin_cycle());
        assert!(cache.read("formula").await.is_some());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let cache = CacheStore::new(&blocker, TTL);
        cache.write("formula", b"{}").await;
        assert!(cache.read("formula").await.is_none());
    }
}
