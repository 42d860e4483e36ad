//! The ingestion orchestrator (§4.10): directory discovery, per-document
//! content hashing and `StageCache` checkpointing, chunking, resilient LLM
//! concept extraction, atomic per-document persistence across the four
//! repositories, and a batch-level concept-index / category-count
//! rebuild once every document in the run has been processed.
//!
//! Grounded in `indexing.rs::preview_folder` for directory discovery and
//! `rag_engine.rs`'s fold-over-documents ingestion shape, generalized from
//! a single-table write into the four-table model's delete-then-insert.
//! The state machine per document is: discovered -> hash -> completeness
//! check (catalog row? summary? chunk rows?) -> (skip | replay from stage
//! cache | re-chunk+extract reusing the existing summary | load, chunk,
//! extract, summarize from scratch) -> persisted. A single document's
//! failure is caught and logged; it never aborts the batch (§7).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::concepts::index::ConceptIndex;
use crate::config::{EngineConfig, ResilienceProfile};
use crate::embeddings::EmbeddingService;
use crate::error::Result;
use crate::external::{ExtractedConcepts, LLMExtractor, LoaderFactory};
use crate::identity::{canonicalize_name, hash_id};
use crate::resilience::ResilienceEnvelope;
use crate::search::text_index::TextIndex;
use crate::storage::lance::{LanceCatalogRepository, LanceCategoryRepository, LanceChunkRepository, LanceConceptRepository};
use crate::storage::repo::{CatalogRepository, CategoryRepository, CategorySort, ChunkRepository, ConceptRepository};
use crate::types::{CatalogRow, CategoryRow, ChunkLocation, ChunkRow, ConceptRow};

use super::chunker::{ChunkSpan, Chunker};
use super::stage_cache::{unix_now_secs, StageCache, StagedChunk, StagedDocument};

/// Outcome of processing a single discovered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Catalog row, summary, and chunk rows all already matched this
    /// content hash; nothing to do.
    Skipped,
    /// Loaded, chunked, extracted, summarized, and persisted fresh (no
    /// usable prior catalog row for this source).
    Processed { chunk_count: usize },
    /// Reused a staged chunk/concept set without re-running the LLM
    /// extractor — only embedding and store writes happened.
    ReplayedFromCache { chunk_count: usize },
    /// §4.10 step 3 completeness check: the catalog row and its summary
    /// already matched this content hash, but the document had no
    /// persisted chunk rows (e.g. a crash between `persist_document`'s
    /// catalog write and its chunk write). Chunks were rebuilt and
    /// concepts re-extracted, reusing the existing summary rather than
    /// re-summarizing.
    ConceptsOnly { chunk_count: usize },
    /// Too short to produce any chunk after the minimum-size floor.
    TooShortToChunk,
    Failed { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub discovered: usize,
    pub outcomes: Vec<(PathBuf, DocumentOutcome)>,
}

impl IngestionReport {
    pub fn processed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| {
                matches!(
                    o,
                    DocumentOutcome::Processed { .. }
                        | DocumentOutcome::ReplayedFromCache { .. }
                        | DocumentOutcome::ConceptsOnly { .. }
                )
            })
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, DocumentOutcome::Skipped)).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, DocumentOutcome::Failed { .. })).count()
    }
}

pub struct IngestionOrchestrator {
    loaders: LoaderFactory,
    chunker: Chunker,
    stage_cache: StageCache,
    extractor: Arc<dyn LLMExtractor>,
    extract_envelope: ResilienceEnvelope,
    summarize_envelope: ResilienceEnvelope,
    embeddings: Arc<EmbeddingService>,
    catalog: Arc<LanceCatalogRepository>,
    chunks: Arc<LanceChunkRepository>,
    concepts: Arc<LanceConceptRepository>,
    categories: Arc<LanceCategoryRepository>,
    chunk_text: Arc<TextIndex>,
    catalog_text: Arc<TextIndex>,
    /// Concept/category names learned during this run's extraction, kept
    /// so the batch rebuild doesn't need to re-derive a name for an id it
    /// just minted (ids are one-way hashes; there's no going back from an
    /// id to a name without having seen the name).
    concept_names: Mutex<HashMap<u32, String>>,
    category_names: Mutex<HashMap<u32, String>>,
}

impl IngestionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &EngineConfig,
        loaders: LoaderFactory,
        extractor: Arc<dyn LLMExtractor>,
        embeddings: Arc<EmbeddingService>,
        catalog: Arc<LanceCatalogRepository>,
        chunks: Arc<LanceChunkRepository>,
        concepts: Arc<LanceConceptRepository>,
        categories: Arc<LanceCategoryRepository>,
        catalog_text: Arc<TextIndex>,
        chunk_text: Arc<TextIndex>,
        stage_cache: StageCache,
    ) -> Self {
        let profile: &ResilienceProfile = &config.resilience;
        let extract_envelope = ResilienceEnvelope::new(
            "llm_extract_concepts",
            profile.bulkhead_max_concurrent,
            profile.bulkhead_queue_capacity,
            profile.circuit_failure_threshold,
            profile.circuit_success_threshold,
            profile.cooldown(),
            profile.retry_max_attempts,
            Duration::from_millis(profile.retry_base_delay_ms),
            profile.llm_timeout(),
        );
        let summarize_envelope = ResilienceEnvelope::new(
            "llm_summarize",
            profile.bulkhead_max_concurrent,
            profile.bulkhead_queue_capacity,
            profile.circuit_failure_threshold,
            profile.circuit_success_threshold,
            profile.cooldown(),
            profile.retry_max_attempts,
            Duration::from_millis(profile.retry_base_delay_ms),
            profile.llm_timeout(),
        );
        let chunker = Chunker::new(
            config.chunking.chunk_size_words,
            config.chunking.chunk_overlap_words,
            config.chunking.min_chunk_size_words,
        );

        Self {
            loaders,
            chunker,
            stage_cache,
            extractor,
            extract_envelope,
            summarize_envelope,
            embeddings,
            catalog,
            chunks,
            concepts,
            categories,
            catalog_text,
            chunk_text,
            concept_names: Mutex::new(HashMap::new()),
            category_names: Mutex::new(HashMap::new()),
        }
    }

    /// Extensions the orchestrator will pick up during discovery.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.loaders.supported_extensions()
    }

    /// Deletes every staged entry (the CLI's `--clear-cache`).
    pub fn clear_stage_cache(&self) -> Result<()> {
        self.stage_cache.clear()
    }

    /// Runs the configured `LLMExtractor` through the same resilience
    /// envelope ingestion uses, for on-demand extraction outside the
    /// ingestion pipeline (the `extract_concepts` tool re-derives a
    /// document's concepts live rather than reading the persisted,
    /// possibly stale, chunk-level `concept_ids`).
    pub async fn extract_concepts_resilient(&self, chunk_text: &str) -> Result<ExtractedConcepts> {
        let text = chunk_text.to_string();
        self.extract_envelope
            .run(|_attempt| {
                let extractor = Arc::clone(&self.extractor);
                let text = text.clone();
                async move { extractor.extract_concepts(&text).await }
            })
            .await
    }

    /// Loads `source_path` fresh off disk and runs resilient extraction
    /// over its full text, without touching the stage cache or any
    /// persisted store state — the `extract_concepts` tool is a live
    /// re-derivation, distinct from `source_concepts` reading back the
    /// `concept_ids` a prior ingestion run already attached to the
    /// document's stored chunks.
    pub async fn extract_concepts_for_source(&self, source_path: &Path) -> Result<ExtractedConcepts> {
        let loaded = self.loaders.load(source_path)?;
        self.extract_concepts_resilient(&loaded.text).await
    }

    /// Walks `dir` recursively, ingests every file whose extension a
    /// registered loader claims, then rebuilds the concept index and
    /// category counts once for the whole batch. Equivalent to
    /// [`Self::ingest_directory_with_cache`] with the stage cache enabled
    /// and no cache-only enforcement (the CLI's default `--use-cache`).
    pub async fn ingest_directory(&self, dir: &Path, overwrite: bool) -> Result<IngestionReport> {
        self.ingest_directory_with_cache(dir, overwrite, true, false).await
    }

    /// Same batch as [`Self::ingest_directory`], with the stage cache's
    /// participation controlled explicitly: `use_cache=false` bypasses
    /// both reading and writing staged results (every document is freshly
    /// extracted); `cache_only=true` fails a document outright instead of
    /// calling the LLM extractor when no staged entry covers it (the CLI's
    /// `--cache-only`).
    pub async fn ingest_directory_with_cache(
        &self,
        dir: &Path,
        overwrite: bool,
        use_cache: bool,
        cache_only: bool,
    ) -> Result<IngestionReport> {
        let paths = self.discover(dir);
        let mut report = IngestionReport {
            discovered: paths.len(),
            outcomes: Vec::new(),
        };

        for path in &paths {
            let outcome = match self.ingest_one(path, overwrite, use_cache, cache_only).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "document ingestion failed");
                    DocumentOutcome::Failed { reason: e.to_string() }
                }
            };
            report.outcomes.push((path.clone(), outcome));
        }

        self.catalog_text.commit()?;
        self.chunk_text.commit()?;
        self.rebuild_concept_index().await?;
        self.rebuild_category_counts().await?;

        info!(
            discovered = report.discovered,
            processed = report.processed_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "ingestion batch complete"
        );
        Ok(report)
    }

    fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let extensions = self.supported_extensions();
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| extensions.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect()
    }

    /// §4.10 step 3: a matching catalog row alone is not a complete
    /// document. `persist_document` writes the catalog row before its
    /// chunks (see its doc comment), so a crash — or a prior run
    /// interrupted mid-document — can leave a catalog row with a current
    /// content hash and summary but zero chunk rows. Runs the four-case
    /// completeness check (catalog row present? summary non-empty? chunk
    /// rows present?) and dispatches accordingly: skip only when every
    /// piece is already there.
    async fn ingest_one(&self, path: &Path, overwrite: bool, use_cache: bool, cache_only: bool) -> Result<DocumentOutcome> {
        let source_path = path.to_string_lossy().into_owned();
        let loaded = self.loaders.load(path)?;
        let hash = content_hash(&loaded.text);
        let catalog_id = hash_id(&source_path);

        let existing_catalog = self.catalog.get_opt(catalog_id).await?;
        let catalog_complete = existing_catalog
            .as_ref()
            .map(|row| row.content_hash == hash && !row.summary.is_empty())
            .unwrap_or(false);

        if catalog_complete && !overwrite {
            let chunks_present = !self.chunks.find_by_source(&source_path, Some(1)).await?.is_empty();
            if chunks_present {
                return Ok(DocumentOutcome::Skipped);
            }
        }

        let staged_entry = if use_cache { self.stage_cache.get(&hash)? } else { None };
        if let Some(staged) = &staged_entry {
            if staged.source_path == source_path && !overwrite {
                let chunk_count = staged.chunks.len();
                self.persist_document(catalog_id, &source_path, &hash, &staged.summary, &staged.chunks)
                    .await?;
                return Ok(DocumentOutcome::ReplayedFromCache { chunk_count });
            }
        }

        if cache_only {
            return Ok(DocumentOutcome::Failed {
                reason: format!("cache-only: no staged extraction available for {source_path}"),
            });
        }

        let spans = self.chunker.chunk(&loaded.text);
        if spans.is_empty() {
            return Ok(DocumentOutcome::TooShortToChunk);
        }

        let staged_chunks = self.extract_chunk_concepts(&spans, &source_path).await;

        // The catalog row (and its summary) already matched this content
        // hash; only the chunk/concept side was missing, so the existing
        // summary is reused instead of re-derived ("concepts-only" case).
        let concepts_only = catalog_complete && !overwrite;
        let summary = if concepts_only {
            existing_catalog.map(|row| row.summary).unwrap_or_default()
        } else {
            self.summarize_document(&loaded.text).await
        };

        let staged = StagedDocument {
            content_hash: hash.clone(),
            source_path: source_path.clone(),
            summary: summary.clone(),
            chunks: staged_chunks.clone(),
            staged_at_unix_secs: unix_now_secs(),
        };
        if use_cache {
            self.stage_cache.put(&staged)?;
        }

        let chunk_count = staged_chunks.len();
        self.persist_document(catalog_id, &source_path, &hash, &summary, &staged_chunks).await?;
        if concepts_only {
            Ok(DocumentOutcome::ConceptsOnly { chunk_count })
        } else {
            Ok(DocumentOutcome::Processed { chunk_count })
        }
    }

    /// Resilient concept extraction over every chunk span, degrading to an
    /// empty concept set per chunk rather than failing the whole document
    /// if the extractor's resilience envelope gives up (§7).
    async fn extract_chunk_concepts(&self, spans: &[ChunkSpan], source_path: &str) -> Vec<StagedChunk> {
        let mut staged_chunks = Vec::with_capacity(spans.len());
        for span in spans {
            let text = span.text.clone();
            let extracted = self
                .extract_envelope
                .run(|_attempt| {
                    let extractor = Arc::clone(&self.extractor);
                    let text = text.clone();
                    async move { extractor.extract_concepts(&text).await }
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(chunk = span.index, source = %source_path, error = %e, "concept extraction degraded to empty set");
                    ExtractedConcepts::default()
                });
            staged_chunks.push(StagedChunk {
                index: span.index,
                text: span.text.clone(),
                byte_start: span.byte_start,
                byte_end: span.byte_end,
                concepts: extracted,
            });
        }
        staged_chunks
    }

    async fn summarize_document(&self, text: &str) -> String {
        let fallback_summary: String = text.chars().take(280).collect();
        self.summarize_envelope
            .run(|_attempt| {
                let extractor = Arc::clone(&self.extractor);
                let text = text.to_string();
                async move { extractor.summarize(&text).await }
            })
            .await
            .unwrap_or(fallback_summary)
    }

    /// Atomic (per document) delete-then-insert across the catalog row,
    /// its chunks, and the corresponding Tantivy entries. Concept and
    /// category rows themselves are written once per batch by
    /// [`Self::rebuild_concept_index`]/[`Self::rebuild_category_counts`],
    /// not here — a single document's concept ids may be shared by
    /// others already in the store, so recomputing weights/counts
    /// per-document would mean redoing the same work N times.
    async fn persist_document(
        &self,
        catalog_id: u32,
        source_path: &str,
        content_hash: &str,
        summary: &str,
        chunks: &[StagedChunk],
    ) -> Result<()> {
        let mut category_names: HashSet<String> = HashSet::new();
        for staged in chunks {
            for name in &staged.concepts.categories {
                let canon = canonicalize_name(name);
                if !canon.is_empty() {
                    category_names.insert(canon);
                }
            }
        }
        let category_ids: Vec<u32> = category_names
            .iter()
            .map(|name| {
                let id = hash_id(name);
                self.category_names.lock().insert(id, name.clone());
                id
            })
            .collect();

        let now = unix_now_secs() as i64;
        let created_at = self
            .catalog
            .get_opt(catalog_id)
            .await?
            .map(|row| row.created_at)
            .unwrap_or(now);
        let doc_vector = self.embeddings.embed_document(summary).await?;

        self.chunks.delete_by_catalog_id(catalog_id).await?;
        self.chunk_text.delete_by_source(source_path)?;

        let mut chunk_rows = Vec::with_capacity(chunks.len());
        for staged in chunks {
            let concept_ids: Vec<u32> = staged
                .concepts
                .all_concept_names()
                .into_iter()
                .map(|name| {
                    let id = hash_id(&name);
                    self.concept_names.lock().insert(id, name);
                    id
                })
                .collect();
            let vector = self.embeddings.embed_document(&staged.text).await?;
            let id = hash_id(&format!("{source_path}#{}", staged.index));
            let row = ChunkRow {
                id,
                catalog_id,
                chunk_index: staged.index as u32,
                text: staged.text.clone(),
                content_hash: content_hash.to_string(),
                location: ChunkLocation {
                    page: None,
                    byte_start: staged.byte_start as u64,
                    byte_end: staged.byte_end as u64,
                },
                concept_ids,
                category_ids: category_ids.clone(),
                vector,
                created_at: now,
            };
            self.chunk_text.index_row(row.id, &row.text, &basename(source_path), source_path)?;
            chunk_rows.push(row);
        }

        let catalog_row = CatalogRow {
            id: catalog_id,
            source_path: source_path.to_string(),
            summary: summary.to_string(),
            content_hash: content_hash.to_string(),
            category_ids,
            vector: doc_vector,
            created_at,
            updated_at: now,
        };
        self.catalog_text.delete_by_source(source_path)?;
        self.catalog_text
            .index_row(catalog_row.id, &catalog_row.summary, &basename(source_path), source_path)?;

        self.catalog.upsert(catalog_row).await?;
        let source_paths = vec![source_path.to_string(); chunk_rows.len()];
        self.chunks.upsert_many_with_source(chunk_rows, source_paths).await?;
        Ok(())
    }

    /// Full-corpus concept index rebuild (§4.10, §3 invariant "concept
    /// catalog_ids reconciliation at rebuild"): recomputed from every
    /// chunk currently in the store, not just this batch's documents, so
    /// a concept's weight and related-concept list stay exact even when
    /// only one of several documents sharing it changed.
    async fn rebuild_concept_index(&self) -> Result<()> {
        let all_chunks = self.chunks.list_all(None).await?;
        let index = ConceptIndex::rebuild(&all_chunks);
        let ids = index.all_concept_ids();
        if ids.is_empty() {
            return Ok(());
        }

        let existing: HashMap<u32, ConceptRow> =
            self.concepts.get_all().await?.into_iter().map(|row| (row.id, row)).collect();
        let learned_names = self.concept_names.lock().clone();

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            let occurrence = index.occurrence(id);
            let name = learned_names
                .get(&id)
                .cloned()
                .or_else(|| existing.get(&id).map(|row| row.name.clone()))
                .unwrap_or_else(|| format!("concept-{id:08x}"));
            let vector = self.embeddings.embed_document(&name).await?;
            rows.push(ConceptRow {
                id,
                name,
                summary: existing.get(&id).map(|row| row.summary.clone()).unwrap_or_default(),
                catalog_ids: occurrence.map(|o| o.catalog_ids.iter().copied().collect()).unwrap_or_default(),
                related_concept_ids: index.related_concepts(id, 2, 10),
                synonyms: existing.get(&id).map(|row| row.synonyms.clone()).unwrap_or_default(),
                broader_terms: existing.get(&id).map(|row| row.broader_terms.clone()).unwrap_or_default(),
                narrower_terms: existing.get(&id).map(|row| row.narrower_terms.clone()).unwrap_or_default(),
                weight: index.weight(id),
                vector,
            });
        }
        self.concepts.upsert_many(rows).await?;
        Ok(())
    }

    /// Recomputes every category's `document_count`/`chunk_count`/
    /// `concept_count` from the current store contents, preserving any
    /// previously-set `description`/`aliases`/`related_categories` for
    /// categories that already existed (§3: category metadata survives
    /// re-ingestion; only the derived counts change).
    async fn rebuild_category_counts(&self) -> Result<()> {
        let catalog_rows = self.catalog.list_all().await?;
        let chunk_rows = self.chunks.list_all(None).await?;

        let mut document_counts: HashMap<u32, u32> = HashMap::new();
        for row in &catalog_rows {
            for &cid in &row.category_ids {
                *document_counts.entry(cid).or_insert(0) += 1;
            }
        }

        let mut chunk_counts: HashMap<u32, u32> = HashMap::new();
        let mut concept_sets: HashMap<u32, HashSet<u32>> = HashMap::new();
        for row in &chunk_rows {
            for &cid in &row.category_ids {
                *chunk_counts.entry(cid).or_insert(0) += 1;
                concept_sets.entry(cid).or_default().extend(row.concept_ids.iter().copied());
            }
        }

        let mut all_ids: HashSet<u32> = HashSet::new();
        all_ids.extend(document_counts.keys().copied());
        all_ids.extend(chunk_counts.keys().copied());
        if all_ids.is_empty() {
            return Ok(());
        }

        let existing: HashMap<u32, CategoryRow> =
            self.categories.list(CategorySort::NameAscending, all_ids.len().max(1) * 4).await?
                .into_iter()
                .map(|row| (row.id, row))
                .collect();
        let learned_names = self.category_names.lock().clone();

        let mut rows = Vec::with_capacity(all_ids.len());
        for id in all_ids {
            let name = learned_names
                .get(&id)
                .cloned()
                .or_else(|| existing.get(&id).map(|row| row.name.clone()))
                .unwrap_or_else(|| format!("category-{id:08x}"));
            let vector = self.embeddings.embed_document(&name).await?;
            rows.push(CategoryRow {
                id,
                name,
                description: existing.get(&id).map(|row| row.description.clone()).unwrap_or_default(),
                parent_category_id: existing.get(&id).and_then(|row| row.parent_category_id),
                aliases: existing.get(&id).map(|row| row.aliases.clone()).unwrap_or_default(),
                related_categories: existing.get(&id).map(|row| row.related_categories.clone()).unwrap_or_default(),
                document_count: document_counts.get(&id).copied().unwrap_or(0),
                chunk_count: chunk_counts.get(&id).copied().unwrap_or(0),
                concept_count: concept_sets.get(&id).map(|s| s.len() as u32).unwrap_or(0),
                vector,
            });
        }
        self.categories.upsert_many(rows).await?;
        Ok(())
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::external::HeuristicExtractor;
    use crate::embeddings::{EmbeddingService, LocalHashEmbedder};

    async fn orchestrator(data_dir: &Path) -> IngestionOrchestrator {
        let dimension = 384;
        let catalog = Arc::new(LanceCatalogRepository::open(&data_dir.join("catalog.lance"), dimension).await.unwrap());
        let chunks =
            Arc::new(LanceChunkRepository::open(&data_dir.join("chunks.lance"), dimension, catalog.clone()).await.unwrap());
        let concepts = Arc::new(LanceConceptRepository::open(&data_dir.join("concepts.lance"), dimension).await.unwrap());
        let categories = Arc::new(LanceCategoryRepository::open(&data_dir.join("categories.lance"), dimension).await.unwrap());
        let catalog_text = Arc::new(TextIndex::open(&data_dir.join("tantivy_catalog")).unwrap());
        let chunk_text = Arc::new(TextIndex::open(&data_dir.join("tantivy_chunks")).unwrap());
        let stage_cache = StageCache::with_default_ttl(&data_dir.join("stage_cache")).unwrap();
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(LocalHashEmbedder::new()), 256));
        let config = EngineConfig::default();

        IngestionOrchestrator::new(
            &config,
            LoaderFactory::new(),
            Arc::new(HeuristicExtractor::new()),
            embeddings,
            catalog,
            chunks,
            concepts,
            categories,
            catalog_text,
            chunk_text,
            stage_cache,
        )
    }

    #[tokio::test]
    async fn ingests_a_plain_text_directory_and_persists_rows() {
        let dir = tempfile::tempdir().unwrap();
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        let words: Vec<String> = (0..200).map(|i| format!("distributed consensus term{i}")).collect();
        std::fs::write(docs_dir.join("paper.txt"), words.join(" ")).unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        let report = orchestrator.ingest_directory(&docs_dir, false).await.unwrap();

        assert_eq!(report.discovered, 1);
        assert_eq!(report.processed_count(), 1);
        assert!(orchestrator.catalog.count().await.unwrap() >= 1);
        assert!(orchestrator.chunks.count().await.unwrap() >= 1);
    }

    #[tokio::test]
    async fn re_ingesting_unchanged_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        let words: Vec<String> = (0..200).map(|i| format!("graph theory node{i}")).collect();
        std::fs::write(docs_dir.join("notes.txt"), words.join(" ")).unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.ingest_directory(&docs_dir, false).await.unwrap();
        let second = orchestrator.ingest_directory(&docs_dir, false).await.unwrap();

        assert_eq!(second.skipped_count(), 1);
    }

    /// §4.10 step 3 / scenario S4: a catalog row whose content hash already
    /// matches, but with no chunk rows behind it (the crash-window partial
    /// state `persist_document`'s catalog-before-chunks write order can
    /// leave), must have its chunks rebuilt on the next run without calling
    /// the LLM extractor at all — the stage cache already holds the chunks
    /// from the first run.
    #[tokio::test]
    async fn catalog_only_document_recovers_chunks_without_llm_calls() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingExtractor {
            inner: HeuristicExtractor,
            calls: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl LLMExtractor for CountingExtractor {
            async fn extract_concepts(&self, chunk_text: &str) -> Result<ExtractedConcepts> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.inner.extract_concepts(chunk_text).await
            }
            async fn summarize(&self, document_text: &str) -> Result<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.inner.summarize(document_text).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        let words: Vec<String> = (0..200).map(|i| format!("catalog recovery term{i}")).collect();
        let source_path = docs_dir.join("recoverable.txt");
        std::fs::write(&source_path, words.join(" ")).unwrap();

        let dimension = 384;
        let catalog = Arc::new(LanceCatalogRepository::open(&dir.path().join("catalog.lance"), dimension).await.unwrap());
        let chunks =
            Arc::new(LanceChunkRepository::open(&dir.path().join("chunks.lance"), dimension, catalog.clone()).await.unwrap());
        let concepts = Arc::new(LanceConceptRepository::open(&dir.path().join("concepts.lance"), dimension).await.unwrap());
        let categories = Arc::new(LanceCategoryRepository::open(&dir.path().join("categories.lance"), dimension).await.unwrap());
        let catalog_text = Arc::new(TextIndex::open(&dir.path().join("tantivy_catalog")).unwrap());
        let chunk_text = Arc::new(TextIndex::open(&dir.path().join("tantivy_chunks")).unwrap());
        let stage_cache = StageCache::with_default_ttl(&dir.path().join("stage_cache")).unwrap();
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(LocalHashEmbedder::new()), 256));
        let config = EngineConfig::default();
        let extractor = Arc::new(CountingExtractor { inner: HeuristicExtractor::new(), calls: AtomicUsize::new(0) });

        let orchestrator = IngestionOrchestrator::new(
            &config,
            LoaderFactory::new(),
            extractor.clone(),
            embeddings,
            catalog.clone(),
            chunks.clone(),
            concepts,
            categories,
            catalog_text,
            chunk_text,
            stage_cache,
        );

        let first = orchestrator.ingest_directory(&docs_dir, false).await.unwrap();
        assert_eq!(first.processed_count(), 1);
        let calls_after_first = extractor.calls.load(Ordering::SeqCst);
        assert!(calls_after_first > 0);

        let catalog_id = hash_id(&source_path.to_string_lossy());
        let deleted = orchestrator.chunks.delete_by_catalog_id(catalog_id).await.unwrap();
        assert!(deleted > 0);
        assert!(orchestrator.chunks.find_by_source(&source_path.to_string_lossy(), Some(1)).await.unwrap().is_empty());

        let second = orchestrator.ingest_directory(&docs_dir, false).await.unwrap();
        assert_eq!(second.processed_count(), 1);
        assert_eq!(second.skipped_count(), 0);
        assert!(matches!(
            second.outcomes[0].1,
            DocumentOutcome::ReplayedFromCache { .. } | DocumentOutcome::ConceptsOnly { .. }
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), calls_after_first, "no new LLM calls on recovery");
        assert!(!orchestrator.chunks.find_by_source(&source_path.to_string_lossy(), Some(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_file_extensions_are_not_discovered() {
        let dir = tempfile::tempdir().unwrap();
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("image.png"), b"\x89PNG").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        let report = orchestrator.ingest_directory(&docs_dir, false).await.unwrap();
        assert_eq!(report.discovered, 0);
    }
}
