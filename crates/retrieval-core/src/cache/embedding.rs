//! Embedding cache: keyed on `(model_id, sha256(text))`, 10000 entries, no
//! TTL (§4.4) — embeddings are deterministic for a fixed model/text pair,
//! so there is no staleness to guard against, only memory pressure. Keying
//! on the model id too means swapping providers never serves a vector
//! computed by a different model under the same cached text.

use super::{BoundedCache, CacheMetricsSnapshot};
use crate::identity::content_hash;

pub struct EmbeddingCache {
    inner: BoundedCache<(String, String), Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedCache::new(capacity),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(10_000)
    }

    fn key(model_id: &str, text: &str) -> (String, String) {
        (model_id.to_string(), content_hash(text.as_bytes()))
    }

    pub fn get(&self, model_id: &str, text: &str) -> Option<Vec<f32>> {
        self.inner.get(&Self::key(model_id, text))
    }

    pub fn put(&self, model_id: &str, text: &str, vector: Vec<f32>) {
        self.inner.put(Self::key(model_id, text), vector);
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.inner.metrics()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Rough resident-memory estimate (§4.4: `dim * 4 bytes * entry
    /// count`), ignoring key overhead. `dimension` is the embedding
    /// provider's vector width, not read back from the cached entries
    /// themselves so an empty cache still reports a meaningful 0.
    pub fn estimated_bytes(&self, dimension: usize) -> usize {
        self.inner.len() * dimension * std::mem::size_of::<f32>()
    }
}
