//! Ingestion orchestrator (§4.10): directory discovery, per-document
//! content hashing and stage-cache checkpointing, chunking, resilient LLM
//! concept extraction, atomic per-document persistence, and batch-level
//! concept-index / category-count rebuild.

pub mod chunker;
pub mod orchestrator;
pub mod stage_cache;

pub use chunker::{ChunkSpan, Chunker};
pub use orchestrator::{DocumentOutcome, IngestionOrchestrator, IngestionReport};
pub use stage_cache::{unix_now_secs, StageCache, StagedChunk, StagedDocument};
