//! Category service (§4.8): document-in-category lookup, category
//! browsing, and concept aggregation over a category's member chunks.
//! Thin compositions over the repositories, grounded in the same
//! gather-then-hydrate shape as [`crate::search::services::SearchServices`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{BoundedCache, CacheMetricsSnapshot};
use crate::error::Result;
use crate::storage::{CategoryRepository, CategorySort, ChunkRepository};
use crate::types::{CatalogRow, CategoryRow};

pub struct CategoryService {
    catalog: Arc<dyn crate::storage::CatalogRepository>,
    chunks: Arc<dyn ChunkRepository>,
    categories: Arc<dyn CategoryRepository>,
    /// Concept aggregation is cacheable (§4.7): a category's membership
    /// only changes on ingestion, so a short TTL is enough to absorb
    /// repeated `list_concepts_in_category` tool calls.
    concept_aggregate_cache: BoundedCache<u32, Vec<u32>>,
}

impl CategoryService {
    pub fn new(
        catalog: Arc<dyn crate::storage::CatalogRepository>,
        chunks: Arc<dyn ChunkRepository>,
        categories: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self {
            catalog,
            chunks,
            categories,
            concept_aggregate_cache: BoundedCache::with_ttl(256, Some(Duration::from_secs(300))),
        }
    }

    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.concept_aggregate_cache.metrics()
    }

    /// Native array-contains filter over the Catalog table.
    pub async fn find_documents_in_category(&self, category_id: u32) -> Result<Vec<CatalogRow>> {
        self.catalog.find_by_category(category_id).await
    }

    /// Browse categories, optionally restricted to those whose name
    /// starts with `prefix`.
    pub async fn list_categories(
        &self,
        sort: CategorySort,
        limit: usize,
        prefix: Option<&str>,
    ) -> Result<Vec<CategoryRow>> {
        let rows = self.categories.list(sort, limit.max(1) * if prefix.is_some() { 8 } else { 1 }).await?;
        let filtered = match prefix {
            Some(p) => {
                let p = p.to_lowercase();
                rows.into_iter().filter(|r| r.name.to_lowercase().starts_with(&p)).collect()
            }
            None => rows,
        };
        Ok(filtered.into_iter().take(limit).collect())
    }

    /// Aggregates `concept_ids` over every chunk belonging to a document
    /// in this category (documents -> their chunks -> union of
    /// `concept_ids`), cached since the result only changes on ingest.
    pub async fn concepts_in_category(&self, category_id: u32) -> Result<Vec<u32>> {
        if let Some(cached) = self.concept_aggregate_cache.get(&category_id) {
            return Ok(cached);
        }

        let documents = self.find_documents_in_category(category_id).await?;
        let mut concept_ids: HashSet<u32> = HashSet::new();
        for doc in &documents {
            let doc_chunks = self.chunks.find_by_source(&doc.source_path, None).await?;
            for chunk in doc_chunks {
                concept_ids.extend(chunk.concept_ids);
            }
        }

        let mut result: Vec<u32> = concept_ids.into_iter().collect();
        result.sort_unstable();
        self.concept_aggregate_cache.put(category_id, result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::types::{ChunkLocation, ChunkRow};
    use async_trait::async_trait;

    struct FakeCatalogRepo(Vec<CatalogRow>);

    #[async_trait]
    impl crate::storage::CatalogRepository for FakeCatalogRepo {
        async fn get(&self, id: u32) -> Result<CatalogRow> {
            self.get_opt(id).await?.ok_or_else(|| EngineError::RecordNotFound { entity: "catalog", id: id.to_string() })
        }
        async fn get_opt(&self, id: u32) -> Result<Option<CatalogRow>> {
            Ok(self.0.iter().find(|r| r.id == id).cloned())
        }
        async fn find_by_source(&self, source_path: &str) -> Result<Option<CatalogRow>> {
            Ok(self.0.iter().find(|r| r.source_path == source_path).cloned())
        }
        async fn search_by_vector(&self, _v: &[f32], _k: usize) -> Result<Vec<(CatalogRow, f32)>> {
            Ok(vec![])
        }
        async fn find_by_category(&self, category_id: u32) -> Result<Vec<CatalogRow>> {
            Ok(self.0.iter().filter(|r| r.category_ids.contains(&category_id)).cloned().collect())
        }
        async fn upsert(&self, _row: CatalogRow) -> Result<()> {
            Ok(())
        }
        async fn delete_by_source(&self, _source_path: &str) -> Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
        async fn list_all(&self) -> Result<Vec<CatalogRow>> {
            Ok(self.0.clone())
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
            Ok(vec![])
        }
        async fn find_by_source(&self, _source_path: &str, _limit: Option<usize>) -> Result<Vec<ChunkRow>> {
            // Single-document fakes in this test module never need real
            // source-path resolution; return every chunk.
            Ok(self.0.clone())
        }
        async fn find_by_concept(&self, _concept_id: u32, _k: usize) -> Result<Vec<ChunkRow>> {
            Ok(vec![])
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

    struct FakeCategoryRepo(Vec<CategoryRow>);

    #[async_trait]
    impl CategoryRepository for FakeCategoryRepo {
        async fn find_by_id(&self, id: u32) -> Result<CategoryRow> {
            self.find_by_id_opt(id).await?.ok_or_else(|| EngineError::RecordNotFound { entity: "category", id: id.to_string() })
        }
        async fn find_by_id_opt(&self, id: u32) -> Result<Option<CategoryRow>> {
            Ok(self.0.iter().find(|c| c.id == id).cloned())
        }
        async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRow>> {
            Ok(self.0.iter().find(|c| c.name == name).cloned())
        }
        async fn list(&self, sort: CategorySort, limit: usize) -> Result<Vec<CategoryRow>> {
            let mut rows = self.0.clone();
            match sort {
                CategorySort::NameAscending => rows.sort_by(|a, b| a.name.cmp(&b.name)),
                CategorySort::DocumentCountDescending => rows.sort_by(|a, b| b.document_count.cmp(&a.document_count)),
            }
            rows.truncate(limit);
            Ok(rows)
        }
        async fn upsert_many(&self, _rows: Vec<CategoryRow>) -> Result<()> {
            Ok(())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
    }

    fn category(id: u32, name: &str, doc_count: u32) -> CategoryRow {
        CategoryRow {
            id,
            name: name.to_string(),
            description: String::new(),
            parent_category_id: None,
            aliases: vec![],
            related_categories: vec![],
            document_count: doc_count,
            chunk_count: 0,
            concept_count: 0,
            vector: vec![],
        }
    }

    #[tokio::test]
    async fn list_categories_filters_by_prefix() {
        let categories = Arc::new(FakeCategoryRepo(vec![
            category(1, "distributed-systems", 3),
            category(2, "databases", 5),
        ]));
        let service = CategoryService::new(
            Arc::new(FakeCatalogRepo(vec![])),
            Arc::new(FakeChunkRepo(vec![])),
            categories,
        );
        let results = service.list_categories(CategorySort::NameAscending, 10, Some("dist")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "distributed-systems");
    }

    #[tokio::test]
    async fn concepts_in_category_aggregates_and_dedupes() {
        let catalog_row = CatalogRow {
            id: 1,
            source_path: "/docs/a.md".into(),
            summary: String::new(),
            content_hash: String::new(),
            category_ids: vec![7],
            vector: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let chunks = vec![
            ChunkRow {
                id: 100,
                catalog_id: 1,
                chunk_index: 0,
                text: String::new(),
                content_hash: String::new(),
                location: ChunkLocation { page: None, byte_start: 0, byte_end: 0 },
                concept_ids: vec![5, 6],
                category_ids: vec![7],
                vector: vec![],
                created_at: 0,
            },
            ChunkRow {
                id: 101,
                catalog_id: 1,
                chunk_index: 1,
                text: String::new(),
                content_hash: String::new(),
                location: ChunkLocation { page: None, byte_start: 0, byte_end: 0 },
                concept_ids: vec![6, 7],
                category_ids: vec![7],
                vector: vec![],
                created_at: 0,
            },
        ];
        let service = CategoryService::new(
            Arc::new(FakeCatalogRepo(vec![catalog_row])),
            Arc::new(FakeChunkRepo(chunks)),
            Arc::new(FakeCategoryRepo(vec![])),
        );
        let result = service.concepts_in_category(7).await.unwrap();
        assert_eq!(result, vec![5, 6, 7]);
    }
}
