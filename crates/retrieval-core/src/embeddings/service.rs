//! Cache-backed facade over an `EmbeddingProvider`. Every embed call first
//! checks the embedding cache (§4.4: 10000 entries, no TTL) and only calls
//! through to the provider on a miss.

use std::sync::Arc;

use super::EmbeddingProvider;
use crate::cache::EmbeddingCache;
use crate::error::Result;

pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache_capacity: usize) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(cache_capacity),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let model_id = self.provider.model_id();
        if let Some(v) = self.cache.get(model_id, text) {
            return Ok(v);
        }
        let v = self.provider.embed_query(text).await?;
        self.cache.put(model_id, text, v.clone());
        Ok(v)
    }

    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        let model_id = self.provider.model_id();
        if let Some(v) = self.cache.get(model_id, text) {
            return Ok(v);
        }
        let v = self.provider.embed_document(text).await?;
        self.cache.put(model_id, text, v.clone());
        Ok(v)
    }

    pub async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_document(text).await?);
        }
        Ok(out)
    }

    pub fn cache_metrics(&self) -> crate::cache::CacheMetricsSnapshot {
        self.cache.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalHashEmbedder;

    #[tokio::test]
    async fn repeated_query_hits_cache() {
        let service = EmbeddingService::new(Arc::new(LocalHashEmbedder::new()), 100);
        let first = service.embed_query("hello").await.unwrap();
        let second = service.embed_query("hello").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.cache_metrics().hits, 1);
        assert_eq!(service.cache_metrics().misses, 1);
    }
}
