//! Generic bounded cache with optional per-entry TTL, an eviction callback,
//! and atomic hit/miss/eviction counters.
//!
//! Grounded on the teacher's `lru::LruCache` + `parking_lot::RwLock`
//! combination (`embeddings/e5.rs`'s query cache), generalized here into a
//! reusable type so the search-result cache and the embedding cache can
//! both be thin specializations over the same eviction/metrics machinery.

mod embedding;
mod search;

pub use embedding::EmbeddingCache;
pub use search::SearchResultCache;

use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A callback invoked (outside the critical section) whenever an entry
/// leaves the cache, whether by LRU eviction, TTL expiry, or explicit
/// removal. Boxed so `BoundedCache` doesn't need to be generic over a
/// closure type.
pub type EvictionCallback<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

pub struct BoundedCache<K: Hash + Eq + Clone, V: Clone> {
    inner: Mutex<lru::LruCache<K, Entry<V>>>,
    ttl: Option<Duration>,
    on_evict: Option<EvictionCallback<K, V>>,
    metrics: CacheMetrics,
}

impl<K: Hash + Eq + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, None)
    }

    pub fn with_ttl(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(lru::LruCache::new(capacity)),
            ttl,
            on_evict: None,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn with_eviction_callback(mut self, callback: EvictionCallback<K, V>) -> Self {
        self.on_evict = Some(callback);
        self
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the cached value for `key`, or `None` on a miss or expiry.
    /// An expired entry is removed and counted as both a miss and an
    /// expiration, and fires the eviction callback.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let Some(entry) = guard.get(key) else {
            drop(guard);
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if let Some(ttl) = self.ttl {
            if entry.inserted_at.elapsed() > ttl {
                let removed = guard.pop(key);
                drop(guard);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.expirations.fetch_add(1, Ordering::Relaxed);
                if let (Some(cb), Some(removed)) = (&self.on_evict, removed) {
                    cb(key, &removed.value);
                }
                return None;
            }
        }

        let value = entry.value.clone();
        drop(guard);
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Inserts `value` under `key`, evicting the least-recently-used entry
    /// first if the cache is at capacity. Returns the evicted entry's key
    /// and value, if any (also passed to the eviction callback).
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
        };
        let mut guard = self.inner.lock();
        let evicted = guard.push(key, entry);
        drop(guard);

        evicted.map(|(k, e)| {
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = &self.on_evict {
                cb(&k, &e.value);
            }
            (k, e.value)
        })
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.inner.lock().pop(key);
        removed.map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Removes every entry whose key matches `predicate` (§4.4
    /// `invalidate_matching`: used by ingestion to drop stale
    /// search-result cache entries scoped to a source path without
    /// flushing the whole cache). Each removal fires the eviction
    /// callback, same as an LRU-driven eviction.
    pub fn invalidate_matching(&self, predicate: impl Fn(&K) -> bool) {
        let mut guard = self.inner.lock();
        let stale: Vec<K> = guard
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        let removed: Vec<(K, V)> = stale
            .into_iter()
            .filter_map(|k| guard.pop(&k).map(|e| (k, e.value)))
            .collect();
        drop(guard);
        if let Some(cb) = &self.on_evict {
            for (k, v) in &removed {
                cb(k, v);
            }
        }
    }
}
