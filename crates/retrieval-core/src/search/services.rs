//! Search services (§4.7): thin compositions over the query expander, the
//! per-table repositories, the Tantivy-backed BM25 text indexes, and the
//! hybrid scorer. Grounded in `rag_engine.rs::search_comprehensive`'s
//! shape (candidate gather -> fuse -> hydrate -> return), generalized
//! from the teacher's RRF-only fusion to the five-signal hybrid scorer.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::cache::{CacheMetricsSnapshot, SearchCacheKey, SearchResultCache};
use crate::concepts::expander::QueryExpander;
use crate::concepts::lexical::LexicalNetwork;
use crate::config::ScoringProfile;
use crate::embeddings::EmbeddingService;
use crate::error::{EngineError, Result};
use crate::scoring::hybrid::{CandidateInput, HybridScorer};
use crate::storage::{CatalogRepository, ChunkRepository, ConceptRepository};
use crate::types::{CatalogSearchResult, ChunkSearchResult, ConceptSearchResult};

use super::text_index::TextIndex;

pub struct SearchServices {
    catalog: Arc<dyn CatalogRepository>,
    chunks: Arc<dyn ChunkRepository>,
    concepts: Arc<dyn ConceptRepository>,
    embeddings: Arc<EmbeddingService>,
    lexical: Arc<dyn LexicalNetwork>,
    catalog_text: Arc<TextIndex>,
    chunk_text: Arc<TextIndex>,
    catalog_cache: SearchResultCache<Vec<CatalogSearchResult>>,
    chunk_cache: SearchResultCache<Vec<ChunkSearchResult>>,
    concept_cache: SearchResultCache<Option<ConceptSearchResult>>,
    scoring: ScoringProfile,
}

impl SearchServices {
    /// `catalog_text`/`chunk_text` are shared with the ingestion
    /// orchestrator (same Tantivy directories) so documents written
    /// during ingestion are visible to query-side BM25 search without a
    /// second writer contending for the same index files.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        chunks: Arc<dyn ChunkRepository>,
        concepts: Arc<dyn ConceptRepository>,
        embeddings: Arc<EmbeddingService>,
        lexical: Arc<dyn LexicalNetwork>,
        catalog_text: Arc<TextIndex>,
        chunk_text: Arc<TextIndex>,
        scoring: ScoringProfile,
        search_cache_capacity: usize,
        search_cache_ttl: std::time::Duration,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            chunks,
            concepts,
            embeddings,
            lexical,
            catalog_text,
            chunk_text,
            catalog_cache: SearchResultCache::new(search_cache_capacity, search_cache_ttl),
            chunk_cache: SearchResultCache::new(search_cache_capacity, search_cache_ttl),
            concept_cache: SearchResultCache::new(search_cache_capacity, search_cache_ttl),
            scoring,
        })
    }

    /// Index for BM25 over document summaries; called by the ingestion
    /// orchestrator, not by query-side code.
    pub fn catalog_text_index(&self) -> &TextIndex {
        &self.catalog_text
    }

    pub fn chunk_text_index(&self) -> &TextIndex {
        &self.chunk_text
    }

    pub fn cache_metrics(&self) -> (CacheMetricsSnapshot, CacheMetricsSnapshot, CacheMetricsSnapshot) {
        (
            self.catalog_cache.metrics(),
            self.chunk_cache.metrics(),
            self.concept_cache.metrics(),
        )
    }

    fn expander(&self) -> QueryExpander<'_> {
        QueryExpander::new(
            self.concepts.as_ref(),
            self.lexical.as_ref(),
            self.scoring.expansion_relevance_threshold,
        )
    }

    /// Documents-by-summary search (§4.7 "catalog search"). Title carries
    /// extra weight (`ScoreWeights::CATALOG`) since filenames are a
    /// stronger signal at the document level than inside a chunk.
    pub async fn catalog_search(
        &self,
        query: &str,
        top_n: usize,
        debug: bool,
    ) -> Result<Vec<CatalogSearchResult>> {
        let key = SearchCacheKey {
            service: "catalog_search",
            normalized_query: query.trim().to_lowercase(),
            filters_digest: String::new(),
            top_n,
        };
        if !debug {
            if let Some(hit) = self.catalog_cache.get(&key) {
                return Ok(hit);
            }
        }

        let expanded = self.expander().expand(query).await;
        let query_vector = self.embeddings.embed_query(query).await?;
        let k = self.scoring.candidate_k;

        let vector_hits = self.catalog.search_by_vector(&query_vector, k).await?;
        let bm25_hits = self.catalog_text.search(&expanded.bm25_query_string(), k, None)?;

        let mut vector_score: std::collections::HashMap<u32, f32> = std::collections::HashMap::new();
        let mut rows: std::collections::HashMap<u32, crate::types::CatalogRow> = std::collections::HashMap::new();
        for (row, score) in vector_hits {
            vector_score.insert(row.id, score);
            rows.insert(row.id, row);
        }
        let mut bm25_by_id: std::collections::HashMap<u32, f32> = std::collections::HashMap::new();
        for (id, score) in bm25_hits {
            bm25_by_id.insert(id, score);
            if !rows.contains_key(&id) {
                if let Some(row) = self.catalog.get_opt(id).await? {
                    rows.insert(id, row);
                }
            }
        }

        let candidates: Vec<CandidateInput> = rows
            .values()
            .map(|row| CandidateInput {
                id: row.id,
                vector_score: vector_score.get(&row.id).copied(),
                bm25_raw: bm25_by_id.get(&row.id).copied(),
                title: basename(&row.source_path),
                text: row.summary.clone(),
                concept_ids: Vec::new(),
            })
            .collect();

        let scored = HybridScorer::top_n(
            candidates,
            &expanded.original_tokens,
            &expanded.concept_ids,
            &expanded.lexical_terms,
            self.scoring.catalog,
            top_n,
        );

        let mut results = Vec::with_capacity(scored.len());
        for s in scored {
            let Some(row) = rows.get(&s.id) else { continue };
            results.push(CatalogSearchResult {
                catalog_id: row.id,
                source_path: row.source_path.clone(),
                summary: row.summary.clone(),
                scores: s.scores,
            });
        }

        if !debug {
            self.catalog_cache.put(key, results.clone());
        }
        Ok(results)
    }

    /// Corpus-wide passage retrieval (§4.7 "broad chunk search").
    pub async fn broad_chunk_search(
        &self,
        query: &str,
        top_n: usize,
        debug: bool,
    ) -> Result<Vec<ChunkSearchResult>> {
        self.chunk_search_inner(query, None, top_n, debug, "broad_chunks_search")
            .await
    }

    /// Same as broad chunk search but pre-filtered to one document's
    /// chunks (§4.7 "chunk-in-source search").
    pub async fn chunk_in_source_search(
        &self,
        query: &str,
        source_path: &str,
        top_n: usize,
        debug: bool,
    ) -> Result<Vec<ChunkSearchResult>> {
        self.chunk_search_inner(query, Some(source_path), top_n, debug, "chunks_search")
            .await
    }

    async fn chunk_search_inner(
        &self,
        query: &str,
        source_filter: Option<&str>,
        top_n: usize,
        debug: bool,
        service: &'static str,
    ) -> Result<Vec<ChunkSearchResult>> {
        let key = SearchCacheKey {
            service,
            normalized_query: query.trim().to_lowercase(),
            filters_digest: source_filter.unwrap_or_default().to_string(),
            top_n,
        };
        if !debug {
            if let Some(hit) = self.chunk_cache.get(&key) {
                return Ok(hit);
            }
        }

        let expanded = self.expander().expand(query).await;
        let query_vector = self.embeddings.embed_query(query).await?;
        let k = self.scoring.candidate_k;

        let vector_predicate = source_filter.map(|s| crate::storage::filter::eq_string("source_path", s));
        let vector_hits = self
            .chunks
            .search_by_vector(&query_vector, k, vector_predicate.as_deref())
            .await?;
        let bm25_hits = self
            .chunk_text
            .search(&expanded.bm25_query_string(), k, source_filter)?;

        let mut vector_score: std::collections::HashMap<u32, f32> = std::collections::HashMap::new();
        let mut rows: std::collections::HashMap<u32, crate::types::ChunkRow> = std::collections::HashMap::new();
        for (row, score) in vector_hits {
            vector_score.insert(row.id, score);
            rows.insert(row.id, row);
        }
        let mut bm25_score: std::collections::HashMap<u32, f32> = std::collections::HashMap::new();
        for (id, score) in bm25_hits {
            bm25_score.insert(id, score);
            if !rows.contains_key(&id) {
                if let Some(row) = self.chunks.get_opt(id).await? {
                    rows.insert(id, row);
                }
            }
        }

        let mut source_paths: std::collections::HashMap<u32, String> = std::collections::HashMap::new();
        for (id, row) in &rows {
            let path = match source_filter {
                Some(path) => path.to_string(),
                None => self.source_path_for(row.catalog_id).await?,
            };
            source_paths.insert(*id, path);
        }

        let candidates: Vec<CandidateInput> = rows
            .values()
            .map(|row| CandidateInput {
                id: row.id,
                vector_score: vector_score.get(&row.id).copied(),
                bm25_raw: bm25_score.get(&row.id).copied(),
                title: basename(source_paths.get(&row.id).map(String::as_str).unwrap_or("")),
                text: row.text.clone(),
                concept_ids: row.concept_ids.clone(),
            })
            .collect();

        let scored = HybridScorer::top_n(
            candidates,
            &expanded.original_tokens,
            &expanded.concept_ids,
            &expanded.lexical_terms,
            self.scoring.broad,
            top_n,
        );

        let results: Vec<ChunkSearchResult> = scored
            .into_iter()
            .filter_map(|s| {
                let row = rows.get(&s.id)?;
                Some(ChunkSearchResult {
                    chunk_id: row.id,
                    catalog_id: row.catalog_id,
                    source_path: source_paths.get(&row.id).cloned().unwrap_or_default(),
                    text: row.text.clone(),
                    scores: s.scores,
                })
            })
            .collect();

        if !debug {
            self.chunk_cache.put(key, results.clone());
        }
        Ok(results)
    }

    async fn source_path_for(&self, catalog_id: u32) -> Result<String> {
        Ok(self
            .catalog
            .get_opt(catalog_id)
            .await?
            .map(|row| row.source_path)
            .unwrap_or_default())
    }

    /// Concept-anchored passage retrieval (§4.7 "concept search"): finds
    /// the single best-matching concept by name, falling back to vector
    /// similarity, then ranks its member chunks without lexical
    /// expansion (the concept id set itself carries that signal).
    pub async fn concept_search(
        &self,
        query: &str,
        top_n: usize,
        debug: bool,
    ) -> Result<Option<ConceptSearchResult>> {
        let key = SearchCacheKey {
            service: "concept_search",
            normalized_query: query.trim().to_lowercase(),
            filters_digest: String::new(),
            top_n,
        };
        if !debug {
            if let Some(hit) = self.concept_cache.get(&key) {
                return Ok(hit);
            }
        }

        let query_vector = self.embeddings.embed_query(query).await?;
        let concept = self.resolve_concept(query, &query_vector).await?;
        let Some(concept) = concept else {
            if !debug {
                self.concept_cache.put(key, None);
            }
            return Ok(None);
        };

        let k = self.scoring.candidate_k;
        let member_chunks = self.chunks.find_by_concept(concept.id, k).await?;
        let bm25_hits = self.chunk_text.search(query, k, None).unwrap_or_default();
        let bm25_by_id: std::collections::HashMap<u32, f32> = bm25_hits.into_iter().collect();

        let mut source_paths = std::collections::HashMap::new();
        for row in &member_chunks {
            source_paths.insert(row.id, self.source_path_for(row.catalog_id).await?);
        }

        let expanded_concept_ids: HashSet<u32> = [concept.id].into_iter().collect();
        let tokens = QueryExpander::tokenize(query);

        let candidates: Vec<CandidateInput> = member_chunks
            .iter()
            .map(|row| CandidateInput {
                id: row.id,
                vector_score: Some(cosine(&query_vector, &row.vector)),
                bm25_raw: bm25_by_id.get(&row.id).copied(),
                title: basename(source_paths.get(&row.id).map(String::as_str).unwrap_or("")),
                text: row.text.clone(),
                concept_ids: row.concept_ids.clone(),
            })
            .collect();

        // No lexical expansion for concept search (§4.7): pass an empty
        // lexical term set so that signal always contributes 0.
        let scored = HybridScorer::top_n(candidates, &tokens, &expanded_concept_ids, &[], self.scoring.broad, top_n);

        let chunks: Vec<ChunkSearchResult> = scored
            .into_iter()
            .filter_map(|s| {
                let row = member_chunks.iter().find(|r| r.id == s.id)?;
                Some(ChunkSearchResult {
                    chunk_id: row.id,
                    catalog_id: row.catalog_id,
                    source_path: source_paths.get(&row.id).cloned().unwrap_or_default(),
                    text: row.text.clone(),
                    scores: s.scores,
                })
            })
            .collect();

        let mut related_concept_names = Vec::new();
        for id in &concept.related_concept_ids {
            if let Some(related) = self.concepts.find_by_id_opt(*id).await? {
                related_concept_names.push(related.name);
            }
        }

        let result = ConceptSearchResult {
            concept_id: concept.id,
            concept_name: concept.name,
            related_concept_names,
            chunks,
        };

        if !debug {
            self.concept_cache.put(key, Some(result.clone()));
        }
        Ok(Some(result))
    }

    async fn resolve_concept(&self, query: &str, query_vector: &[f32]) -> Result<Option<crate::types::ConceptRow>> {
        let canonical_query = crate::identity::canonicalize_name(query);
        if let Some(concept) = self.concepts.find_by_name(&canonical_query).await? {
            return Ok(Some(concept));
        }
        for token in QueryExpander::tokenize(query) {
            if let Some(concept) = self.concepts.find_by_name(&token).await? {
                return Ok(Some(concept));
            }
        }
        let similar = self.concepts.search_similar(query_vector, 1).await?;
        Ok(similar.into_iter().map(|(row, _)| row).next())
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| path.to_lowercase())
}

/// Cosine similarity for the concept-search vector signal, computed
/// directly since `find_by_concept` doesn't go through the kNN path.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        0.0
    } else {
        (dot / (na * nb)).clamp(-1.0, 1.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::lexical::StaticLexicalNetwork;
    use crate::embeddings::LocalHashEmbedder;
    use crate::types::{CatalogRow, ChunkLocation, ChunkRow, ConceptRow};
    use async_trait::async_trait;

    struct FakeCatalogRepo(std::sync::Mutex<Vec<CatalogRow>>);

    #[async_trait]
    impl CatalogRepository for FakeCatalogRepo {
        async fn get(&self, id: u32) -> Result<CatalogRow> {
            self.get_opt(id).await?.ok_or_else(|| EngineError::RecordNotFound { entity: "catalog", id: id.to_string() })
        }
        async fn get_opt(&self, id: u32) -> Result<Option<CatalogRow>> {
            Ok(self.0.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn find_by_source(&self, source_path: &str) -> Result<Option<CatalogRow>> {
            Ok(self.0.lock().unwrap().iter().find(|r| r.source_path == source_path).cloned())
        }
        async fn search_by_vector(&self, _v: &[f32], _k: usize) -> Result<Vec<(CatalogRow, f32)>> {
            Ok(self.0.lock().unwrap().iter().map(|r| (r.clone(), 0.5)).collect())
        }
        async fn find_by_category(&self, _cat: u32) -> Result<Vec<CatalogRow>> {
            Ok(vec![])
        }
        async fn upsert(&self, row: CatalogRow) -> Result<()> {
            self.0.lock().unwrap().push(row);
            Ok(())
        }
        async fn delete_by_source(&self, _source_path: &str) -> Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.lock().unwrap().len())
        }
        async fn list_all(&self) -> Result<Vec<CatalogRow>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    struct FakeChunkRepo(Vec<ChunkRow>);

    #[async_trait]
    impl ChunkRepository for FakeChunkRepo {
        async fn get(&self, id: u32) -> Result<ChunkRow> {
            self.get_opt(id).await?.ok_or_else(|| EngineError::RecordNotFound { entity: "chunk", id: id.to_string() })
        }
        async fn get_opt(&self, id: u32) -> Result<Option<ChunkRow>> {
            Ok(self.0.iter().find(|r| r.id == id).cloned())
        }
        async fn search_by_vector(&self, _v: &[f32], _k: usize, _f: Option<&str>) -> Result<Vec<(ChunkRow, f32)>> {
            Ok(self.0.iter().map(|r| (r.clone(), 0.5)).collect())
        }
        async fn find_by_source(&self, _source_path: &str, _limit: Option<usize>) -> Result<Vec<ChunkRow>> {
            Ok(self.0.clone())
        }
        async fn find_by_concept(&self, concept_id: u32, _k: usize) -> Result<Vec<ChunkRow>> {
            Ok(self.0.iter().filter(|r| r.concept_ids.contains(&concept_id)).cloned().collect())
        }
        async fn find_by_concept_set(&self, _ids: &[u32], _k: usize) -> Result<Vec<ChunkRow>> {
            Ok(vec![])
        }
        async fn find_by_ids(&self, ids: &[u32]) -> Result<Vec<ChunkRow>> {
            Ok(self.0.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
        }
        async fn list_all(&self, _limit: Option<usize>) -> Result<Vec<ChunkRow>> {
            Ok(self.0.clone())
        }
        async fn upsert_many(&self, _rows: Vec<ChunkRow>) -> Result<()> {
            Ok(())
        }
        async fn delete_by_catalog_id(&self, _catalog_id: u32) -> Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
    }

    struct FakeConceptRepo(Vec<ConceptRow>);

    #[async_trait]
    impl ConceptRepository for FakeConceptRepo {
        async fn find_by_id(&self, id: u32) -> Result<ConceptRow> {
            self.find_by_id_opt(id).await?.ok_or_else(|| EngineError::RecordNotFound { entity: "concept", id: id.to_string() })
        }
        async fn find_by_id_opt(&self, id: u32) -> Result<Option<ConceptRow>> {
            Ok(self.0.iter().find(|c| c.id == id).cloned())
        }
        async fn find_by_name(&self, name: &str) -> Result<Option<ConceptRow>> {
            Ok(self.0.iter().find(|c| c.name == name).cloned())
        }
        async fn search_similar(&self, _v: &[f32], _k: usize) -> Result<Vec<(ConceptRow, f32)>> {
            Ok(vec![])
        }
        async fn get_all(&self) -> Result<Vec<ConceptRow>> {
            Ok(self.0.clone())
        }
        async fn upsert_many(&self, _rows: Vec<ConceptRow>) -> Result<()> {
            Ok(())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
    }

    fn chunk(id: u32, catalog_id: u32, text: &str, concept_ids: Vec<u32>) -> ChunkRow {
        ChunkRow {
            id,
            catalog_id,
            chunk_index: 0,
            text: text.to_string(),
            content_hash: String::new(),
            location: ChunkLocation { page: None, byte_start: 0, byte_end: 0 },
            concept_ids,
            category_ids: vec![],
            vector: vec![0.1; 384],
            created_at: 0,
        }
    }

    async fn build_services(tmp: &Path, chunks: Vec<ChunkRow>, concepts: Vec<ConceptRow>) -> SearchServices {
        let catalog = Arc::new(FakeCatalogRepo(std::sync::Mutex::new(vec![CatalogRow {
            id: 1,
            source_path: "/docs/distributed-systems.md".into(),
            summary: "A book about distributed systems".into(),
            content_hash: String::new(),
            category_ids: vec![],
            vector: vec![0.1; 384],
            created_at: 0,
            updated_at: 0,
        }])));
        let chunk_repo = Arc::new(FakeChunkRepo(chunks));
        let concept_repo = Arc::new(FakeConceptRepo(concepts));
        let embeddings = Arc::new(EmbeddingService::new(Arc::new(LocalHashEmbedder::new()), 100));
        let lexical = Arc::new(StaticLexicalNetwork::new());
        let catalog_text = Arc::new(TextIndex::open(&tmp.join("tantivy_catalog")).unwrap());
        let chunk_text = Arc::new(TextIndex::open(&tmp.join("tantivy_chunks")).unwrap());
        SearchServices::new(
            catalog,
            chunk_repo,
            concept_repo,
            embeddings,
            lexical,
            catalog_text,
            chunk_text,
            ScoringProfile::default(),
            100,
            std::time::Duration::from_secs(300),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn broad_chunk_search_returns_ranked_results() {
        let tmp = tempfile::tempdir().unwrap();
        let chunks = vec![
            chunk(10, 1, "distributed consensus algorithms", vec![]),
            chunk(11, 1, "unrelated cooking recipes", vec![]),
        ];
        let services = build_services(tmp.path(), chunks, vec![]).await;
        let results = services.broad_chunk_search("distributed consensus", 5, true).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn concept_search_returns_none_for_unknown_concept() {
        let tmp = tempfile::tempdir().unwrap();
        let services = build_services(tmp.path(), vec![], vec![]).await;
        let result = services.concept_search("nonexistent concept", 5, true).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn concept_search_finds_chunks_by_concept_id() {
        let tmp = tempfile::tempdir().unwrap();
        let concept = ConceptRow {
            id: 42,
            name: "consensus".into(),
            summary: String::new(),
            catalog_ids: vec![],
            related_concept_ids: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 1.0,
            vector: vec![0.1; 384],
        };
        let chunks = vec![chunk(20, 1, "consensus protocols", vec![42])];
        let services = build_services(tmp.path(), chunks, vec![concept]).await;
        let result = services.concept_search("consensus", 5, true).await.unwrap().unwrap();
        assert_eq!(result.concept_id, 42);
        assert_eq!(result.chunks.len(), 1);
    }

    #[tokio::test]
    async fn catalog_search_scores_title_hit_highly() {
        let tmp = tempfile::tempdir().unwrap();
        let services = build_services(tmp.path(), vec![], vec![]).await;
        let results = services.catalog_search("distributed systems", 5, true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].scores.title > 0.0);
    }
}
