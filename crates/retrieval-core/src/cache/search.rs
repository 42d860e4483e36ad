//! Search result cache: keyed on `(service, normalized query, filters)`,
//! 1000 entries, 5 minute TTL (§4.4). A cache hit skips the entire
//! candidate-gather/fuse/hydrate pipeline for a repeated query.

use super::{BoundedCache, CacheMetricsSnapshot};
use std::time::Duration;

/// Cache key for a search. `filters_digest` is a caller-supplied stable
/// summary of the active `MetadataFilter` (e.g. its escaped predicate
/// string) so that the same query text under different filters misses
/// correctly instead of colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchCacheKey {
    pub service: &'static str,
    pub normalized_query: String,
    pub filters_digest: String,
    pub top_n: usize,
}

pub struct SearchResultCache<R: Clone> {
    inner: BoundedCache<SearchCacheKey, R>,
}

impl<R: Clone> SearchResultCache<R> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: BoundedCache::with_ttl(capacity, Some(ttl)),
        }
    }

    /// Construct the cache at the spec's default sizing: 1000 entries,
    /// 5 minute TTL.
    pub fn with_defaults() -> Self {
        Self::new(1_000, Duration::from_secs(300))
    }

    pub fn get(&self, key: &SearchCacheKey) -> Option<R> {
        self.inner.get(key)
    }

    pub fn put(&self, key: SearchCacheKey, results: R) {
        self.inner.put(key, results);
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.inner.metrics()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Drops every cached entry for `service`, regardless of query or
    /// filters (§4.4 `invalidate_matching`: ingestion calls this after a
    /// batch completes so stale results for a changed source don't
    /// survive the TTL).
    pub fn invalidate_service(&self, service: &'static str) {
        self.inner.invalidate_matching(|k| k.service == service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_by_full_key() {
        let cache: SearchResultCache<Vec<u32>> = SearchResultCache::with_defaults();
        let key = SearchCacheKey {
            service: "broad_chunks",
            normalized_query: "distributed systems".into(),
            filters_digest: "".into(),
            top_n: 10,
        };
        cache.put(key.clone(), vec![1, 2, 3]);
        assert_eq!(cache.get(&key), Some(vec![1, 2, 3]));
    }

    #[test]
    fn distinct_filters_digest_misses() {
        let cache: SearchResultCache<Vec<u32>> = SearchResultCache::with_defaults();
        let mut key = SearchCacheKey {
            service: "broad_chunks",
            normalized_query: "distributed systems".into(),
            filters_digest: "category_id = 1".into(),
            top_n: 10,
        };
        cache.put(key.clone(), vec![1]);
        key.filters_digest = "category_id = 2".into();
        assert_eq!(cache.get(&key), None);
    }
}
