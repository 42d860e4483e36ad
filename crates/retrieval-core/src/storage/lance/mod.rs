//! LanceDB-backed repository implementations, one module per table,
//! sharing a single `lancedb::Connection` opened at `<data_dir>/*.lance`
//! (§6 persisted-state layout). Generalizes the teacher's single-table
//! `LanceStore` (`storage/lance_store.rs`) to the four-table data model.

mod arrow_util;
pub mod catalog;
pub mod categories;
pub mod chunks;
pub mod concepts;

pub use catalog::LanceCatalogRepository;
pub use categories::LanceCategoryRepository;
pub use chunks::LanceChunkRepository;
pub use concepts::LanceConceptRepository;

use std::path::Path;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Opens (or creates) the four `.lance` directories under `data_dir` and
/// hands back one connection handle each repository module opens its own
/// table from. LanceDB multiplexes table access over a single on-disk
/// connection per directory, so each table gets its own `lancedb::connect`.
/// The catalog repository is opened first and handed to the chunk
/// repository so chunks can resolve a row's `source_path` by `catalog_id`
/// (chunks.rs's denormalized `source_path` column) instead of requiring
/// every caller to supply it.
pub async fn connect_all(data_dir: &Path, dimension: usize) -> Result<AllRepositories> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| EngineError::Connection(anyhow::anyhow!(e)))?;

    let catalog = Arc::new(LanceCatalogRepository::open(&data_dir.join("catalog.lance"), dimension).await?);
    let chunks = LanceChunkRepository::open(&data_dir.join("chunks.lance"), dimension, catalog.clone()).await?;
    let concepts = LanceConceptRepository::open(&data_dir.join("concepts.lance"), dimension).await?;
    let categories =
        LanceCategoryRepository::open(&data_dir.join("categories.lance"), dimension).await?;

    Ok(AllRepositories {
        catalog,
        chunks,
        concepts,
        categories,
    })
}

pub struct AllRepositories {
    pub catalog: Arc<LanceCatalogRepository>,
    pub chunks: LanceChunkRepository,
    pub concepts: LanceConceptRepository,
    pub categories: LanceCategoryRepository,
}
