//! Engine configuration: data location, embedding dimension, chunking, the
//! five scorer weights, cache sizing, and the resilience profile. Follows
//! the teacher's `RAGConfig` shape — a single serde-deserializable struct
//! with a `validate()` pass and a `from_file` loader — extended with the
//! fields this engine's wider scope needs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub scoring: ScoringProfile,
    pub cache: CacheConfig,
    pub resilience: ResilienceProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub dimension: usize,
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in words (spec: 100-500 words per chunk).
    pub chunk_size_words: usize,
    pub chunk_overlap_words: usize,
    pub min_chunk_size_words: usize,
}

/// The five hybrid-scorer signal weights (§4.6), overridable per search
/// service. Defaults are the balance the spec fixes for broad/chunk-in-
/// source search; catalog search overrides `title`/`lexical` per the
/// spec's stronger-filename-signal note.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub vector: f32,
    pub bm25: f32,
    pub title: f32,
    pub concept: f32,
    pub lexical: f32,
}

impl ScoreWeights {
    pub const DEFAULT: ScoreWeights = ScoreWeights {
        vector: 0.25,
        bm25: 0.25,
        title: 0.20,
        concept: 0.20,
        lexical: 0.10,
    };

    /// Catalog (document-level) search overrides: title carries more
    /// weight from filenames, lexical expansion noise matters less.
    pub const CATALOG: ScoreWeights = ScoreWeights {
        vector: 0.25,
        bm25: 0.25,
        title: 0.30,
        concept: 0.15,
        lexical: 0.05,
    };

    pub fn sum(&self) -> f32 {
        self.vector + self.bm25 + self.title + self.concept + self.lexical
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub broad: ScoreWeights,
    pub catalog: ScoreWeights,
    /// Candidate pool size (K) retrieved per signal before fusion.
    pub candidate_k: usize,
    /// Top-N results returned after fusion.
    pub default_top_n: usize,
    /// Query-expansion corpus/lexical split (spec: 0.7 corpus, 0.3 lexical).
    pub expansion_corpus_weight: f32,
    pub expansion_lexical_weight: f32,
    /// Minimum relevance an expansion term must clear to survive the
    /// technical-context filter (§9 Open Question — resolved in
    /// DESIGN.md as a string-distance + category-affinity gate).
    pub expansion_relevance_threshold: f32,
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self {
            broad: ScoreWeights::DEFAULT,
            catalog: ScoreWeights::CATALOG,
            candidate_k: 50,
            default_top_n: 10,
            expansion_corpus_weight: 0.7,
            expansion_lexical_weight: 0.3,
            expansion_relevance_threshold: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub search_cache_max_size: usize,
    pub search_cache_ttl_secs: u64,
    pub embedding_cache_max_size: usize,
    pub lexical_cache_max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_cache_max_size: 1_000,
            search_cache_ttl_secs: 300,
            embedding_cache_max_size: 10_000,
            lexical_cache_max_size: 5_000,
        }
    }
}

/// Resilience envelope tuning (§4.9), one profile shared by all external
/// LLM calls made during ingestion. Durations are stored as millis so the
/// struct round-trips cleanly through JSON/env without a custom serde
/// `Duration` shim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceProfile {
    pub bulkhead_max_concurrent: usize,
    pub bulkhead_queue_capacity: usize,
    pub circuit_failure_threshold: u32,
    pub circuit_success_threshold: u32,
    pub circuit_cooldown_ms: u64,
    pub timeout_llm_ms: u64,
    pub timeout_embedding_ms: u64,
    pub timeout_db_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl ResilienceProfile {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_llm_ms)
    }
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_embedding_ms)
    }
    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_db_ms)
    }
}

impl Default for ResilienceProfile {
    fn default() -> Self {
        Self {
            bulkhead_max_concurrent: 5,
            bulkhead_queue_capacity: 10,
            circuit_failure_threshold: 5,
            circuit_success_threshold: 2,
            circuit_cooldown_ms: 60_000,
            timeout_llm_ms: 30_000,
            timeout_embedding_ms: 10_000,
            timeout_db_ms: 3_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let cfg_err = |msg: &str| EngineError::Configuration(msg.to_string());

        if self.embedding.dimension == 0 {
            return Err(cfg_err("embedding.dimension must be > 0"));
        }
        if self.embedding.dimension != 384 {
            // §3 invariant 6: vector dimension is exactly 384 on every row.
            return Err(cfg_err("embedding.dimension must be 384 per the data model"));
        }
        if self.chunking.chunk_size_words < 50 {
            return Err(cfg_err("chunking.chunk_size_words must be >= 50"));
        }
        if self.chunking.chunk_overlap_words >= self.chunking.chunk_size_words {
            return Err(cfg_err("chunking.chunk_overlap_words must be < chunk_size_words"));
        }
        if self.scoring.candidate_k == 0 {
            return Err(cfg_err("scoring.candidate_k must be > 0"));
        }
        if self.scoring.default_top_n == 0 {
            return Err(cfg_err("scoring.default_top_n must be > 0"));
        }
        if (self.scoring.broad.sum() - 1.0).abs() > 0.01 {
            return Err(cfg_err("scoring.broad weights must sum to ~1.0"));
        }
        if (self.scoring.catalog.sum() - 1.0).abs() > 0.01 {
            return Err(cfg_err("scoring.catalog weights must sum to ~1.0"));
        }
        if self.resilience.bulkhead_max_concurrent == 0 {
            return Err(cfg_err("resilience.bulkhead_max_concurrent must be > 0"));
        }
        if self.resilience.circuit_failure_threshold == 0 {
            return Err(cfg_err("resilience.circuit_failure_threshold must be > 0"));
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Configuration(format!("failed to read config file: {e}")))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| EngineError::Configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Layer environment overrides (provider selection, resilience tuning)
    /// on top of an already-loaded config. Only documented variables are
    /// consulted; unknown variables are ignored rather than rejected.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RETRIEVAL_BULKHEAD_MAX_CONCURRENT") {
            if let Ok(n) = v.parse() {
                self.resilience.bulkhead_max_concurrent = n;
            }
        }
        if let Ok(v) = std::env::var("RETRIEVAL_CIRCUIT_COOLDOWN_MS") {
            if let Ok(n) = v.parse() {
                self.resilience.circuit_cooldown_ms = n;
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.model_id = v;
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("concept-rag");

        Self {
            data_dir,
            embedding: EmbeddingConfig {
                dimension: 384,
                model_id: "local-hash-v1".to_string(),
            },
            chunking: ChunkingConfig {
                chunk_size_words: 350,
                chunk_overlap_words: 50,
                min_chunk_size_words: 100,
            },
            scoring: ScoringProfile::default(),
            cache: CacheConfig::default(),
            resilience: ResilienceProfile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        EngineConfig::default().validate().expect("default config must be valid");
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut cfg = EngineConfig::default();
        cfg.embedding.dimension = 768;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut cfg = EngineConfig::default();
        cfg.chunking.chunk_overlap_words = cfg.chunking.chunk_size_words;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut cfg = EngineConfig::default();
        cfg.scoring.broad.vector = 10.0;
        assert!(cfg.validate().is_err());
    }
}
