use arrow_array::{Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::Path;
use std::sync::Arc;

use super::arrow_util::{
    column_i64, column_list, column_string, column_u32, column_vector, decode_u32_list,
    decode_vector, encode_u32_lists, encode_vectors, validate_vector_dimension,
};
use super::catalog::LanceCatalogRepository;
use crate::error::{EngineError, Result};
use crate::storage::filter;
use crate::storage::repo::{CatalogRepository, ChunkRepository};
use crate::types::{ChunkLocation, ChunkRow};

pub struct LanceChunkRepository {
    db: lancedb::Connection,
    dimension: usize,
    /// Resolves a row's `source_path` from its `catalog_id` for callers
    /// that go through the plain [`ChunkRepository::upsert_many`] trait
    /// method instead of [`Self::upsert_many_with_source`].
    catalog: Arc<LanceCatalogRepository>,
}

const TABLE: &str = "chunks";

impl LanceChunkRepository {
    pub async fn open(path: &Path, dimension: usize, catalog: Arc<LanceCatalogRepository>) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(|e| EngineError::Connection(anyhow::anyhow!(e)))?;
        let repo = Self { db, dimension, catalog };
        repo.ensure_table().await?;
        Ok(repo)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("catalog_id", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            // location is flattened: page (-1 = none), byte_start, byte_end
            Field::new("page", DataType::Int64, false),
            Field::new("byte_start", DataType::Int64, false),
            Field::new("byte_end", DataType::Int64, false),
            Field::new(
                "concept_ids",
                DataType::List(Arc::new(Field::new("item", DataType::UInt32, true))),
                true,
            ),
            Field::new(
                "category_ids",
                DataType::List(Arc::new(Field::new("item", DataType::UInt32, true))),
                true,
            ),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("created_at", DataType::Int64, false),
            // source_path is denormalized onto the chunk so chunk-in-source
            // search can filter/scan without a Catalog join.
            Field::new("source_path", DataType::Utf8, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| EngineError::database("list tables", anyhow::anyhow!(e)))?;
        if names.contains(&TABLE.to_string()) {
            return Ok(());
        }

        let seed = self.rows_to_batch(&[ChunkRow {
            id: 0,
            catalog_id: 0,
            chunk_index: 0,
            text: String::new(),
            content_hash: String::new(),
            location: ChunkLocation {
                page: None,
                byte_start: 0,
                byte_end: 0,
            },
            concept_ids: vec![],
            category_ids: vec![],
            vector: vec![0.0; self.dimension],
            created_at: 0,
        }], &[String::new()])?;

        let schema = self.schema();
        let batches = RecordBatchIterator::new(vec![Ok(seed)], schema);
        self.db
            .create_table(TABLE, Box::new(batches))
            .execute()
            .await
            .map_err(|e| EngineError::database("create chunks table", anyhow::anyhow!(e)))?;

        let table = self.open_table().await?;
        table.delete("content_hash = '' AND chunk_index = 0 AND catalog_id = 0").await.ok();
        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(TABLE)
            .execute()
            .await
            .map_err(|e| EngineError::database("open chunks table", anyhow::anyhow!(e)))
    }

    fn rows_to_batch(&self, rows: &[ChunkRow], source_paths: &[String]) -> Result<RecordBatch> {
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        let catalog_ids: Vec<u32> = rows.iter().map(|r| r.catalog_id).collect();
        let chunk_indices: Vec<u32> = rows.iter().map(|r| r.chunk_index).collect();
        let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        let hashes: Vec<&str> = rows.iter().map(|r| r.content_hash.as_str()).collect();
        let pages: Vec<i64> = rows.iter().map(|r| r.location.page.map(|p| p as i64).unwrap_or(-1)).collect();
        let byte_starts: Vec<i64> = rows.iter().map(|r| r.location.byte_start as i64).collect();
        let byte_ends: Vec<i64> = rows.iter().map(|r| r.location.byte_end as i64).collect();
        let concept_ids: Vec<Vec<u32>> = rows.iter().map(|r| r.concept_ids.clone()).collect();
        let category_ids: Vec<Vec<u32>> = rows.iter().map(|r| r.category_ids.clone()).collect();
        let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.vector.clone()).collect();
        validate_vector_dimension(&vectors, self.dimension)?;
        let created: Vec<i64> = rows.iter().map(|r| r.created_at).collect();
        let sources: Vec<&str> = source_paths.iter().map(|s| s.as_str()).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(ids)) as Arc<dyn Array>,
                Arc::new(UInt32Array::from(catalog_ids)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(hashes)),
                Arc::new(Int64Array::from(pages)),
                Arc::new(Int64Array::from(byte_starts)),
                Arc::new(Int64Array::from(byte_ends)),
                Arc::new(encode_u32_lists(&concept_ids)),
                Arc::new(encode_u32_lists(&category_ids)),
                Arc::new(encode_vectors(&vectors, self.dimension)),
                Arc::new(Int64Array::from(created)),
                Arc::new(StringArray::from(sources)),
            ],
        )
        .map_err(|e| EngineError::database("build chunk batch", anyhow::anyhow!(e)))
    }

    fn batch_to_rows(
        &self,
        batch: &RecordBatch,
        scores: Option<&arrow_array::Float32Array>,
    ) -> Result<Vec<(ChunkRow, f32)>> {
        let ids = column_u32(batch, "id")?;
        let catalog_ids = column_u32(batch, "catalog_id")?;
        let chunk_indices = column_u32(batch, "chunk_index")?;
        let texts = column_string(batch, "text")?;
        let hashes = column_string(batch, "content_hash")?;
        let pages = column_i64(batch, "page")?;
        let byte_starts = column_i64(batch, "byte_start")?;
        let byte_ends = column_i64(batch, "byte_end")?;
        let concept_ids = column_list(batch, "concept_ids")?;
        let category_ids = column_list(batch, "category_ids")?;
        let vectors = column_vector(batch, "vector")?;
        let created = column_i64(batch, "created_at")?;

        let mut out = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if hashes.value(i).is_empty() && chunk_indices.value(i) == 0 && catalog_ids.value(i) == 0 {
                continue;
            }
            let page = pages.value(i);
            let row = ChunkRow {
                id: ids.value(i),
                catalog_id: catalog_ids.value(i),
                chunk_index: chunk_indices.value(i),
                text: texts.value(i).to_string(),
                content_hash: hashes.value(i).to_string(),
                location: ChunkLocation {
                    page: if page < 0 { None } else { Some(page as u32) },
                    byte_start: byte_starts.value(i) as u64,
                    byte_end: byte_ends.value(i) as u64,
                },
                concept_ids: decode_u32_list(concept_ids, i),
                category_ids: decode_u32_list(category_ids, i),
                vector: decode_vector(vectors, i, self.dimension),
                created_at: created.value(i),
            };
            let score = scores.map(|s| (1.0 - s.value(i)).max(0.0)).unwrap_or(0.0);
            out.push((row, score));
        }
        Ok(out)
    }

    async fn query_rows(&self, predicate: Option<String>, limit: Option<usize>) -> Result<Vec<ChunkRow>> {
        let table = self.open_table().await?;
        let mut query = table.query();
        if let Some(pred) = predicate {
            query = query.only_if(pred);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let results = query
            .execute()
            .await
            .map_err(|e| EngineError::database("query chunks", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect chunk batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            out.extend(self.batch_to_rows(batch, None)?.into_iter().map(|(r, _)| r));
        }
        Ok(out)
    }
}

#[async_trait]
impl ChunkRepository for LanceChunkRepository {
    async fn get(&self, id: u32) -> Result<ChunkRow> {
        self.get_opt(id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound {
                entity: "chunk",
                id: id.to_string(),
            })
    }

    async fn get_opt(&self, id: u32) -> Result<Option<ChunkRow>> {
        Ok(self
            .query_rows(Some(filter::eq_u32("id", id)), Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<(ChunkRow, f32)>> {
        let table = self.open_table().await?;
        let mut query = table
            .query()
            .nearest_to(vector)
            .map_err(|e| EngineError::database("build chunk vector query", anyhow::anyhow!(e)))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);
        if let Some(pred) = predicate {
            query = query.only_if(pred);
        }
        let results = query
            .execute()
            .await
            .map_err(|e| EngineError::database("chunk vector search", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect chunk batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<arrow_array::Float32Array>());
            out.extend(self.batch_to_rows(batch, distances)?);
        }
        Ok(out)
    }

    async fn find_by_source(&self, source_path: &str, limit: Option<usize>) -> Result<Vec<ChunkRow>> {
        self.query_rows(Some(filter::eq_string("source_path", source_path)), limit)
            .await
    }

    async fn find_by_concept(&self, concept_id: u32, k: usize) -> Result<Vec<ChunkRow>> {
        self.query_rows(
            Some(filter::array_contains_u32("concept_ids", concept_id)),
            Some(k),
        )
        .await
    }

    async fn find_by_concept_set(&self, concept_ids: &[u32], k: usize) -> Result<Vec<ChunkRow>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }
        let predicate = concept_ids
            .iter()
            .map(|id| filter::array_contains_u32("concept_ids", *id))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.query_rows(Some(format!("({predicate})")), Some(k)).await
    }

    async fn find_by_ids(&self, ids: &[u32]) -> Result<Vec<ChunkRow>> {
        let mut out = Vec::new();
        for batch_ids in ids.chunks(50) {
            if let Some(predicate) = filter::in_u32_list("id", batch_ids) {
                out.extend(self.query_rows(Some(predicate), None).await?);
            }
        }
        Ok(out)
    }

    async fn list_all(&self, limit: Option<usize>) -> Result<Vec<ChunkRow>> {
        self.query_rows(None, limit).await
    }

    /// Resolves each row's `source_path` by `catalog_id` (one catalog
    /// lookup per distinct id in the batch) before writing, so chunks
    /// inserted through the bare trait method stay visible to
    /// `find_by_source`. Callers that already know the source path for
    /// every row (the ingestion orchestrator) should use
    /// [`Self::upsert_many_with_source`] instead and skip the lookup.
    async fn upsert_many(&self, rows: Vec<ChunkRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut resolved: std::collections::HashMap<u32, String> = std::collections::HashMap::new();
        for catalog_id in rows.iter().map(|r| r.catalog_id).collect::<std::collections::HashSet<_>>() {
            let source_path = self
                .catalog
                .get_opt(catalog_id)
                .await?
                .map(|row| row.source_path)
                .unwrap_or_default();
            resolved.insert(catalog_id, source_path);
        }
        let source_paths: Vec<String> = rows.iter().map(|r| resolved[&r.catalog_id].clone()).collect();
        self.upsert_many_with_source(rows, source_paths).await
    }

    async fn delete_by_catalog_id(&self, catalog_id: u32) -> Result<usize> {
        let table = self.open_table().await?;
        let before = table.count_rows(None).await.unwrap_or(0);
        table
            .delete(&filter::eq_u32("catalog_id", catalog_id))
            .await
            .map_err(|e| EngineError::database("delete chunks by catalog_id", anyhow::anyhow!(e)))?;
        let after = table.count_rows(None).await.unwrap_or(0);
        Ok(before.saturating_sub(after))
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| EngineError::database("count chunks", anyhow::anyhow!(e)))
    }
}

impl LanceChunkRepository {
    /// Upsert with an explicit parallel `source_path` list (one per row),
    /// the path the ingestion orchestrator uses since it already knows
    /// each chunk's parent document path and avoids a join at query time.
    pub async fn upsert_many_with_source(&self, rows: Vec<ChunkRow>, source_paths: Vec<String>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if rows.len() != source_paths.len() {
            return Err(EngineError::Validation {
                field: "source_paths".to_string(),
                reason: "must have one entry per chunk row".to_string(),
            });
        }
        for row in &rows {
            if row.vector.len() != self.dimension {
                return Err(EngineError::EmbedDimensionMismatch {
                    expected: self.dimension,
                    actual: row.vector.len(),
                });
            }
        }

        let table = self.open_table().await?;
        let batch = self.rows_to_batch(&rows, &source_paths)?;
        let schema = self.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| EngineError::database("upsert chunks", anyhow::anyhow!(e)))?;
        Ok(())
    }
}
