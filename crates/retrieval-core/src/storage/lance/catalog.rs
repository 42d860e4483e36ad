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
use crate::error::{EngineError, Result};
use crate::storage::repo::CatalogRepository;
use crate::types::CatalogRow;

pub struct LanceCatalogRepository {
    db: lancedb::Connection,
    dimension: usize,
}

const TABLE: &str = "catalog";

impl LanceCatalogRepository {
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(|e| EngineError::Connection(anyhow::anyhow!(e)))?;
        let repo = Self { db, dimension };
        repo.ensure_table().await?;
        Ok(repo)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
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
            Field::new("updated_at", DataType::Int64, false),
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

        let schema = self.schema();
        let seed = self.rows_to_batch(&[CatalogRow {
            id: 0,
            source_path: "__seed__".to_string(),
            summary: String::new(),
            content_hash: String::new(),
            category_ids: vec![],
            vector: vec![0.0; self.dimension],
            created_at: 0,
            updated_at: 0,
        }])?;

        let batches = RecordBatchIterator::new(vec![Ok(seed)], schema);
        self.db
            .create_table(TABLE, Box::new(batches))
            .execute()
            .await
            .map_err(|e| EngineError::database("create catalog table", anyhow::anyhow!(e)))?;

        let table = self.open_table().await?;
        table.delete("source_path = '__seed__'").await.ok();
        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(TABLE)
            .execute()
            .await
            .map_err(|e| EngineError::database("open catalog table", anyhow::anyhow!(e)))
    }

    fn rows_to_batch(&self, rows: &[CatalogRow]) -> Result<RecordBatch> {
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        let sources: Vec<&str> = rows.iter().map(|r| r.source_path.as_str()).collect();
        let summaries: Vec<&str> = rows.iter().map(|r| r.summary.as_str()).collect();
        let hashes: Vec<&str> = rows.iter().map(|r| r.content_hash.as_str()).collect();
        let category_ids: Vec<Vec<u32>> = rows.iter().map(|r| r.category_ids.clone()).collect();
        let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.vector.clone()).collect();
        validate_vector_dimension(&vectors, self.dimension)?;
        let created: Vec<i64> = rows.iter().map(|r| r.created_at).collect();
        let updated: Vec<i64> = rows.iter().map(|r| r.updated_at).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(summaries)),
                Arc::new(StringArray::from(hashes)),
                Arc::new(encode_u32_lists(&category_ids)),
                Arc::new(encode_vectors(&vectors, self.dimension)),
                Arc::new(Int64Array::from(created)),
                Arc::new(Int64Array::from(updated)),
            ],
        )
        .map_err(|e| EngineError::database("build catalog batch", anyhow::anyhow!(e)))
    }

    fn batch_to_rows(&self, batch: &RecordBatch, scores: Option<&arrow_array::Float32Array>) -> Result<Vec<(CatalogRow, f32)>> {
        let ids = column_u32(batch, "id")?;
        let sources = column_string(batch, "source_path")?;
        let summaries = column_string(batch, "summary")?;
        let hashes = column_string(batch, "content_hash")?;
        let category_ids = column_list(batch, "category_ids")?;
        let vectors = column_vector(batch, "vector")?;
        let created = column_i64(batch, "created_at")?;
        let updated = column_i64(batch, "updated_at")?;

        let mut out = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if sources.value(i) == "__seed__" {
                continue;
            }
            let row = CatalogRow {
                id: ids.value(i),
                source_path: sources.value(i).to_string(),
                summary: summaries.value(i).to_string(),
                content_hash: hashes.value(i).to_string(),
                category_ids: decode_u32_list(category_ids, i),
                vector: decode_vector(vectors, i, self.dimension),
                created_at: created.value(i),
                updated_at: updated.value(i),
            };
            let score = scores.map(|s| (1.0 - s.value(i)).max(0.0)).unwrap_or(0.0);
            out.push((row, score));
        }
        Ok(out)
    }
}

#[async_trait]
impl CatalogRepository for LanceCatalogRepository {
    async fn get(&self, id: u32) -> Result<CatalogRow> {
        self.get_opt(id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound {
                entity: "catalog",
                id: id.to_string(),
            })
    }

    async fn get_opt(&self, id: u32) -> Result<Option<CatalogRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(crate::storage::filter::eq_u32("id", id))
            .execute()
            .await
            .map_err(|e| EngineError::database("get catalog by id", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect catalog batches", anyhow::anyhow!(e)))?;
        for batch in &batches {
            let rows = self.batch_to_rows(batch, None)?;
            if let Some((row, _)) = rows.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn find_by_source(&self, source_path: &str) -> Result<Option<CatalogRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(crate::storage::filter::eq_string("source_path", source_path))
            .execute()
            .await
            .map_err(|e| EngineError::database("find catalog by source", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect catalog batches", anyhow::anyhow!(e)))?;
        for batch in &batches {
            let rows = self.batch_to_rows(batch, None)?;
            if let Some((row, _)) = rows.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<(CatalogRow, f32)>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .nearest_to(vector)
            .map_err(|e| EngineError::database("build catalog vector query", anyhow::anyhow!(e)))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| EngineError::database("catalog vector search", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect catalog batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<arrow_array::Float32Array>());
            out.extend(self.batch_to_rows(batch, distances)?);
        }
        Ok(out)
    }

    async fn find_by_category(&self, category_id: u32) -> Result<Vec<CatalogRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(crate::storage::filter::array_contains_u32("category_ids", category_id))
            .execute()
            .await
            .map_err(|e| EngineError::database("find catalog by category", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect catalog batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            out.extend(self.batch_to_rows(batch, None)?.into_iter().map(|(r, _)| r));
        }
        Ok(out)
    }

    async fn upsert(&self, row: CatalogRow) -> Result<()> {
        if row.vector.len() != self.dimension {
            return Err(EngineError::EmbedDimensionMismatch {
                expected: self.dimension,
                actual: row.vector.len(),
            });
        }
        if let Some(existing) = self.get_opt(row.id).await? {
            if existing.source_path != row.source_path {
                return Err(EngineError::IdCollision {
                    entity: "catalog",
                    id: row.id,
                    canonical: existing.source_path,
                });
            }
        }

        let table = self.open_table().await?;
        table
            .delete(&crate::storage::filter::eq_u32("id", row.id))
            .await
            .ok();

        let batch = self.rows_to_batch(&[row])?;
        let schema = self.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| EngineError::database("upsert catalog row", anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn delete_by_source(&self, source_path: &str) -> Result<usize> {
        let table = self.open_table().await?;
        let before = table.count_rows(None).await.unwrap_or(0);
        table
            .delete(&crate::storage::filter::eq_string("source_path", source_path))
            .await
            .map_err(|e| EngineError::database("delete catalog by source", anyhow::anyhow!(e)))?;
        let after = table.count_rows(None).await.unwrap_or(0);
        Ok(before.saturating_sub(after))
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| EngineError::database("count catalog", anyhow::anyhow!(e)))
    }

    async fn list_all(&self) -> Result<Vec<CatalogRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| EngineError::database("list catalog", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect catalog batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            out.extend(self.batch_to_rows(batch, None)?.into_iter().map(|(r, _)| r));
        }
        Ok(out)
    }
}
