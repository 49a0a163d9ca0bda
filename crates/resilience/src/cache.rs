//! In-memory TTL cache for provider responses.
//!
//! Entries are ordered by insertion time: reads use `peek` so they never
//! promote an entry, and overwriting a key moves it to the newest slot. When
//! the cache is full the oldest insertion is the one evicted.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::lock;

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub capacity: usize,
    /// Maximum age of an entry served by [`ResponseCache::get`], in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Outcome of [`ResponseCache::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Present and within TTL.
    Fresh(V),
    /// Present but older than TTL. The entry has been removed from the cache.
    Stale(V),
    Missing,
}

impl<V> Lookup<V> {
    /// The value only if it is still fresh.
    pub fn fresh(self) -> Option<V> {
        match self {
            Lookup::Fresh(value) => Some(value),
            Lookup::Stale(_) | Lookup::Missing => None,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Time-bounded, capacity-bounded response cache keyed by string.
#[derive(Debug)]
pub struct ResponseCache<V> {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    /// A capacity of zero is treated as one.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl: config.ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        lock(&self.entries).cap().get()
    }

    /// Fresh value for `key`, if any. Expired entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lookup(key).fresh()
    }

    /// Like [`get`](Self::get), but an expired value is handed back as
    /// [`Lookup::Stale`] instead of being discarded silently.
    pub fn lookup(&self, key: &str) -> Lookup<V> {
        let mut entries = lock(&self.entries);

        let expired = match entries.peek(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Lookup::Missing;
            }
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
        };

        if expired {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            match entries.pop(key) {
                Some(entry) => Lookup::Stale(entry.value),
                None => Lookup::Missing,
            }
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            match entries.peek(key) {
                Some(entry) => Lookup::Fresh(entry.value.clone()),
                None => Lookup::Missing,
            }
        }
    }

    /// Insert or overwrite `key`, stamping it with the current time.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };

        let mut entries = lock(&self.entries);
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            // `push` also returns the old value when overwriting the same key.
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %evicted, "evicted oldest cache entry");
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        lock(&self.entries).pop(key).map(|entry| entry.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = lock(&self.entries);
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
