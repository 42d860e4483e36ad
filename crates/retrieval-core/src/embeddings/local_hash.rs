//! Deterministic, model-free embedding provider.
//!
//! Projects each token into a 384-dim vector via a signed hashing trick
//! (the same family of technique `sklearn`'s `HashingVectorizer` and
//! Vowpal Wabbit use for streaming feature hashing), sums and L2-normalizes
//! across a document's tokens. It is not semantically competitive with a
//! trained model, but it is exact, offline, and satisfies the data model's
//! fixed 384-dimension invariant without pulling in an inference runtime —
//! a real deployment is expected to swap in a hosted or ONNX provider that
//! implements the same `EmbeddingProvider` trait.

use super::EmbeddingProvider;
use crate::error::Result;

const DIMENSION: usize = 384;

pub struct LocalHashEmbedder {
    dimension: usize,
}

impl LocalHashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: DIMENSION,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let mut token_count = 0usize;

        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            if token.is_empty() {
                continue;
            }
            token_count += 1;
            let (index, sign) = hash_token(&token, self.dimension);
            vector[index] += sign;
        }

        if token_count == 0 {
            return vector;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashes `token` to a `(bucket index, sign)` pair. Using two independent
/// bits of the same hash for index and sign keeps unrelated tokens from
/// systematically cancelling each other out (the standard feature-hashing
/// fix for hash collisions).
fn hash_token(token: &str, dimension: usize) -> (usize, f32) {
    let hash = crate::identity::hash_id(token);
    let index = (hash as usize) % dimension;
    let sign = if (hash >> 31) & 1 == 0 { 1.0 } else { -1.0 };
    (index, sign)
}

#[async_trait::async_trait]
impl EmbeddingProvider for LocalHashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "local-hash-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_correct_dimension() {
        let embedder = LocalHashEmbedder::new();
        let v = embedder.embed_query("hello world").await.unwrap();
        assert_eq!(v.len(), DIMENSION);
    }

    #[tokio::test]
    async fn is_deterministic() {
        let embedder = LocalHashEmbedder::new();
        let a = embedder.embed_document("distributed systems consensus").await.unwrap();
        let b = embedder.embed_document("distributed systems consensus").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_text_yields_distinct_vectors() {
        let embedder = LocalHashEmbedder::new();
        let a = embedder.embed_document("raft consensus protocol").await.unwrap();
        let b = embedder.embed_document("grocery shopping list").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let embedder = LocalHashEmbedder::new();
        let v = embedder.embed_query("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn non_empty_vectors_are_unit_normalized() {
        let embedder = LocalHashEmbedder::new();
        let v = embedder.embed_document("paxos raft zab consensus quorum leader election").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
