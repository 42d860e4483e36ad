//! Embedding provider contract and the in-core deterministic default
//! implementation, plus a cache-backed service wrapping any provider.
//!
//! `EmbeddingProvider` keeps the teacher's `EmbeddingModel` trait shape
//! (query/document asymmetry, batch default, `dimension()`) under the
//! name the wider spec uses for external collaborators. A production
//! deployment plugs in a real model (e.g. the teacher's ONNX E5 path);
//! this crate ships only `LocalHashEmbedder`, a deterministic fallback
//! that needs no network or model file, so the engine is self-contained
//! out of the box.

mod local_hash;
mod service;

pub use local_hash::LocalHashEmbedder;
pub use service::EmbeddingService;

use crate::error::Result;

/// An embedding backend, local or remote. Query and document embedding
/// are separate methods because some models (E5-family included) prefix
/// text differently depending on which side of retrieval it sits on.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed_document(t).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;

    /// Stable identifier for the concrete model backing this provider
    /// (§4.4: the embedding cache key is `(model_id, sha256(text))`, so
    /// swapping providers never serves a stale vector from a different
    /// model under the same text).
    fn model_id(&self) -> &str;
}
