//! Composition root: wires `EngineConfig` to the four LanceDB repositories,
//! the Tantivy text indexes, the embedding service, the static lexical
//! network, the hybrid search services, the category service, and the
//! ingestion orchestrator. `Engine` is the one object a binary (the CLI,
//! the tool surface) needs to hold.
//!
//! Grounded in the teacher's `RAGEngine::new` (`rag_engine.rs`), which
//! performs the same job for the single-table predecessor: open the
//! store, build the embedder, wire the search/indexing layers, return one
//! struct. This generalizes that wiring to the four-table model plus the
//! resilience-wrapped ingestion path `RAGEngine` didn't have.

use std::path::PathBuf;
use std::sync::Arc;

use crate::category::CategoryService;
use crate::concepts::lexical::{LexicalNetwork, StaticLexicalNetwork};
use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingService, LocalHashEmbedder};
use crate::error::Result;
use crate::external::{HeuristicExtractor, LLMExtractor, LoaderFactory};
use crate::ingestion::{IngestionOrchestrator, IngestionReport, StageCache};
use crate::search::services::SearchServices;
use crate::storage::lance::{
    connect_all, LanceCatalogRepository, LanceCategoryRepository, LanceChunkRepository, LanceConceptRepository,
};
use crate::storage::repo::{CatalogRepository, CategoryRepository, ChunkRepository, ConceptRepository};

/// The fully-wired engine. Holds both the concrete repository handles
/// (which the ingestion orchestrator needs for bulk/denormalized writes)
/// and the trait-object views the search/category services consume.
pub struct Engine {
    pub config: EngineConfig,
    pub catalog: Arc<LanceCatalogRepository>,
    pub chunks: Arc<LanceChunkRepository>,
    pub concepts: Arc<LanceConceptRepository>,
    pub categories: Arc<LanceCategoryRepository>,
    pub embeddings: Arc<EmbeddingService>,
    pub search: SearchServices,
    pub category_service: CategoryService,
    pub ingestion: IngestionOrchestrator,
}

impl Engine {
    /// Opens (or creates) every store under `config.data_dir` and wires
    /// the full engine with the in-core default collaborators
    /// (`LocalHashEmbedder`, `StaticLexicalNetwork`, `HeuristicExtractor`,
    /// `PlainTextLoader`). Swap in a real embedding/LLM provider by
    /// constructing the pieces manually instead of calling this.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with_stage_cache_dir(config, None).await
    }

    /// Same wiring as [`Self::open`], with the stage cache directory
    /// overridable (the CLI's `--cache-dir`) instead of always living at
    /// `<data_dir>/stage_cache`.
    pub async fn open_with_stage_cache_dir(config: EngineConfig, stage_cache_dir: Option<PathBuf>) -> Result<Self> {
        config.validate()?;
        let repos = connect_all(&config.data_dir, config.embedding.dimension).await?;

        let catalog = repos.catalog;
        let chunks = Arc::new(repos.chunks);
        let concepts = Arc::new(repos.concepts);
        let categories = Arc::new(repos.categories);

        let provider = Arc::new(LocalHashEmbedder::new());
        let embeddings = Arc::new(EmbeddingService::new(provider, config.cache.embedding_cache_max_size));
        let lexical: Arc<dyn LexicalNetwork> =
            Arc::new(StaticLexicalNetwork::with_cache_capacity(config.cache.lexical_cache_max_size));

        // One Tantivy directory per table, shared between the query-side
        // search services and the ingestion orchestrator's writer so a
        // freshly-ingested document is immediately searchable.
        let catalog_text = Arc::new(crate::search::text_index::TextIndex::open(&config.data_dir.join("tantivy_catalog"))?);
        let chunk_text = Arc::new(crate::search::text_index::TextIndex::open(&config.data_dir.join("tantivy_chunks"))?);

        let search = SearchServices::new(
            catalog.clone() as Arc<dyn CatalogRepository>,
            chunks.clone() as Arc<dyn ChunkRepository>,
            concepts.clone() as Arc<dyn ConceptRepository>,
            embeddings.clone(),
            lexical,
            catalog_text.clone(),
            chunk_text.clone(),
            config.scoring.clone(),
            config.cache.search_cache_max_size,
            std::time::Duration::from_secs(config.cache.search_cache_ttl_secs),
        )?;

        let category_service = CategoryService::new(
            catalog.clone() as Arc<dyn CatalogRepository>,
            chunks.clone() as Arc<dyn ChunkRepository>,
            categories.clone() as Arc<dyn CategoryRepository>,
        );

        let extractor: Arc<dyn LLMExtractor> = Arc::new(HeuristicExtractor::new());
        let stage_dir = stage_cache_dir.unwrap_or_else(|| default_stage_cache_dir(&config.data_dir));
        let stage_cache = StageCache::with_default_ttl(&stage_dir)?;
        let ingestion = IngestionOrchestrator::new(
            &config,
            LoaderFactory::new(),
            extractor,
            embeddings.clone(),
            catalog.clone(),
            chunks.clone(),
            concepts.clone(),
            categories.clone(),
            catalog_text,
            chunk_text,
            stage_cache,
        );

        Ok(Self {
            config,
            catalog,
            chunks,
            concepts,
            categories,
            embeddings,
            search,
            category_service,
            ingestion,
        })
    }

    pub async fn ingest_directory(&self, dir: &std::path::Path, overwrite: bool) -> Result<IngestionReport> {
        self.ingestion.ingest_directory(dir, overwrite).await
    }

    pub async fn ingest_directory_with_cache(
        &self,
        dir: &std::path::Path,
        overwrite: bool,
        use_cache: bool,
        cache_only: bool,
    ) -> Result<IngestionReport> {
        self.ingestion
            .ingest_directory_with_cache(dir, overwrite, use_cache, cache_only)
            .await
    }

    pub fn clear_stage_cache(&self) -> Result<()> {
        self.ingestion.clear_stage_cache()
    }
}

fn default_stage_cache_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("stage_cache")
}
