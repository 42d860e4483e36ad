//! Repository contracts (§4.2): one trait per table, returning domain rows
//! only — no store-native Arrow/Lance types cross this boundary. Every
//! single-row getter has a `get`/`get_opt` pair so callers can't
//! accidentally treat "not found" as a null dereference.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CatalogRow, CategoryRow, ChunkRow, ConceptRow};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fetch by id, failing with `RecordNotFound` if absent.
    async fn get(&self, id: u32) -> Result<CatalogRow>;
    /// Fetch by id, returning `None` instead of an error if absent.
    async fn get_opt(&self, id: u32) -> Result<Option<CatalogRow>>;
    async fn find_by_source(&self, source_path: &str) -> Result<Option<CatalogRow>>;
    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<(CatalogRow, f32)>>;
    async fn find_by_category(&self, category_id: u32) -> Result<Vec<CatalogRow>>;
    /// Insert or replace a catalog row. Fails with `IdCollision` if an
    /// existing row with the same id has a different source path.
    async fn upsert(&self, row: CatalogRow) -> Result<()>;
    async fn delete_by_source(&self, source_path: &str) -> Result<usize>;
    async fn count(&self) -> Result<usize>;
    async fn list_all(&self) -> Result<Vec<CatalogRow>>;
}

#[async_trait]
pub trait ChunkRepository: Send + Sync {
    async fn get(&self, id: u32) -> Result<ChunkRow>;
    async fn get_opt(&self, id: u32) -> Result<Option<ChunkRow>>;
    async fn search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<(ChunkRow, f32)>>;
    async fn find_by_source(&self, source_path: &str, limit: Option<usize>) -> Result<Vec<ChunkRow>>;
    async fn find_by_concept(&self, concept_id: u32, k: usize) -> Result<Vec<ChunkRow>>;
    async fn find_by_concept_set(&self, concept_ids: &[u32], k: usize) -> Result<Vec<ChunkRow>>;
    async fn find_by_ids(&self, ids: &[u32]) -> Result<Vec<ChunkRow>>;
    /// Text-matching candidates used by lexical/title scoring; a thin
    /// pass-through over the store's own substring/IN filtering, kept
    /// here so callers never hand-write a predicate themselves.
    async fn list_all(&self, limit: Option<usize>) -> Result<Vec<ChunkRow>>;
    async fn upsert_many(&self, rows: Vec<ChunkRow>) -> Result<()>;
    async fn delete_by_catalog_id(&self, catalog_id: u32) -> Result<usize>;
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
pub trait ConceptRepository: Send + Sync {
    async fn find_by_id(&self, id: u32) -> Result<ConceptRow>;
    async fn find_by_id_opt(&self, id: u32) -> Result<Option<ConceptRow>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<ConceptRow>>;
    async fn search_similar(&self, vector: &[f32], k: usize) -> Result<Vec<(ConceptRow, f32)>>;
    async fn get_all(&self) -> Result<Vec<ConceptRow>>;
    async fn upsert_many(&self, rows: Vec<ConceptRow>) -> Result<()>;
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_by_id(&self, id: u32) -> Result<CategoryRow>;
    async fn find_by_id_opt(&self, id: u32) -> Result<Option<CategoryRow>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRow>>;
    async fn list(&self, sort: CategorySort, limit: usize) -> Result<Vec<CategoryRow>>;
    async fn upsert_many(&self, rows: Vec<CategoryRow>) -> Result<()>;
    async fn count(&self) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySort {
    NameAscending,
    DocumentCountDescending,
}
