//! Retrieval cache: TTL freshness plus LRU capacity eviction
//!
//! The cache never talks to the index; callers populate it after a
//! successful search. Expiry is checked lazily on access, there is no
//! background sweeper.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::key::CacheKey;
use crate::types::RetrievedItem;

/// Default time-to-live for cached retrievals (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of cached retrievals
pub const DEFAULT_CAPACITY: usize = 50;

/// Retrieval results exactly as they were computed
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Vec<RetrievedItem>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheStats {
    /// Hit ratio in [0, 1], zero before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    // None when capacity is zero: the cache stores nothing
    entries: Option<LruCache<CacheKey, CacheEntry>>,
    stats: CacheStats,
}

/// Thread-safe retrieval cache shared by concurrent `answer` calls
pub struct RetrievalCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RetrievalCache {
    /// Create a cache on the system clock
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock
    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                stats: CacheStats {
                    capacity,
                    ttl_secs: ttl.as_secs(),
                    ..Default::default()
                },
            }),
            ttl,
            clock,
        }
    }

    /// Look up a fresh entry. A hit refreshes the key's recency.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some(entries) = inner.entries.as_mut() else {
            inner.stats.misses += 1;
            return None;
        };

        let fresh = entries.get(key).map(|entry| entry.is_fresh(now));
        match fresh {
            Some(true) => {
                inner.stats.hits += 1;
                debug!(key = %key, "retrieval cache hit");
                entries.get(key).cloned()
            }
            Some(false) => {
                entries.pop(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                inner.stats.size = entries.len();
                debug!(key = %key, "retrieval cache entry expired");
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite with the default TTL
    pub fn put(&self, key: CacheKey, items: Vec<RetrievedItem>) {
        self.put_with_ttl(key, items, self.ttl);
    }

    /// Insert or overwrite with an explicit TTL.
    ///
    /// At capacity, expired entries are purged first; if the cache is still
    /// full the least-recently-used key is evicted.
    pub fn put_with_ttl(&self, key: CacheKey, items: Vec<RetrievedItem>, ttl: Duration) {
        let now = self.clock.now();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(entries) = inner.entries.as_mut() else {
            return;
        };

        if entries.len() >= entries.cap().get() && !entries.contains(&key) {
            let expired: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, entry)| !entry.is_fresh(now))
                .map(|(k, _)| k.clone())
                .collect();
            for stale in expired {
                entries.pop(&stale);
                inner.stats.expirations += 1;
            }
        }

        let entry = CacheEntry {
            items,
            created_at: now,
            expires_at: now + ttl,
        };

        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
                debug!(evicted = %evicted, "retrieval cache evicted least-recently-used entry");
            }
        }
        inner.stats.size = entries.len();
    }

    /// Drop a single key
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let removed = inner
            .entries
            .as_mut()
            .and_then(|entries| entries.pop(key))
            .is_some();
        inner.stats.size = inner.entries.as_ref().map_or(0, |e| e.len());
        removed
    }

    /// Drop every entry, keeping counters
    pub fn clear(&self) {
        let mut inner = self.lock();
        if let Some(entries) = inner.entries.as_mut() {
            entries.clear();
        }
        inner.stats.size = 0;
    }

    /// Number of stored entries, fresh or not yet lazily expired
    pub fn len(&self) -> usize {
        self.lock().entries.as_ref().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    /// Default TTL applied by `put`
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lock the cache, recovering from a holder that panicked mid-update.
    ///
    /// Entries left behind by the panicking holder are discarded, so a
    /// poisoned cache reads as a miss and then refills. Counters survive.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("retrieval cache lock poisoned, discarding cached entries");
                let mut guard = poisoned.into_inner();
                if let Some(entries) = guard.entries.as_mut() {
                    entries.clear();
                }
                guard.stats.size = 0;
                self.inner.clear_poison();
                guard
            }
        }
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
