use arrow_array::{Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::Path;
use std::sync::Arc;

use super::arrow_util::{
    column_i64, column_list, column_string, column_u32, column_vector, decode_string_list,
    decode_u32_list, decode_vector, encode_string_lists, encode_u32_lists, encode_vectors, validate_vector_dimension,
};
use crate::error::{EngineError, Result};
use crate::storage::filter;
use crate::storage::repo::{CategoryRepository, CategorySort};
use crate::types::CategoryRow;

pub struct LanceCategoryRepository {
    db: lancedb::Connection,
    dimension: usize,
}

const TABLE: &str = "categories";
/// Sentinel for an absent `parent_category_id` (flat hierarchy for now,
/// per §3 — the slot is reserved, not yet populated).
const NO_PARENT: i64 = -1;

impl LanceCategoryRepository {
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
        let u32_list = || DataType::List(Arc::new(Field::new("item", DataType::UInt32, true)));
        let str_list = || DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)));
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("description", DataType::Utf8, false),
            Field::new("parent_category_id", DataType::Int64, false),
            Field::new("aliases", str_list(), true),
            Field::new("related_categories", u32_list(), true),
            Field::new("document_count", DataType::UInt32, false),
            Field::new("chunk_count", DataType::UInt32, false),
            Field::new("concept_count", DataType::UInt32, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
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

        let seed = self.rows_to_batch(&[CategoryRow {
            id: 0,
            name: "__seed__".to_string(),
            description: String::new(),
            parent_category_id: None,
            aliases: vec![],
            related_categories: vec![],
            document_count: 0,
            chunk_count: 0,
            concept_count: 0,
            vector: vec![0.0; self.dimension],
        }])?;

        let schema = self.schema();
        let batches = RecordBatchIterator::new(vec![Ok(seed)], schema);
        self.db
            .create_table(TABLE, Box::new(batches))
            .execute()
            .await
            .map_err(|e| EngineError::database("create categories table", anyhow::anyhow!(e)))?;

        let table = self.open_table().await?;
        table.delete("name = '__seed__'").await.ok();
        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(TABLE)
            .execute()
            .await
            .map_err(|e| EngineError::database("open categories table", anyhow::anyhow!(e)))
    }

    fn rows_to_batch(&self, rows: &[CategoryRow]) -> Result<RecordBatch> {
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        let descriptions: Vec<&str> = rows.iter().map(|r| r.description.as_str()).collect();
        let parents: Vec<i64> = rows
            .iter()
            .map(|r| r.parent_category_id.map(|p| p as i64).unwrap_or(NO_PARENT))
            .collect();
        let aliases: Vec<Vec<String>> = rows.iter().map(|r| r.aliases.clone()).collect();
        let related: Vec<Vec<u32>> = rows.iter().map(|r| r.related_categories.clone()).collect();
        let doc_counts: Vec<u32> = rows.iter().map(|r| r.document_count).collect();
        let chunk_counts: Vec<u32> = rows.iter().map(|r| r.chunk_count).collect();
        let concept_counts: Vec<u32> = rows.iter().map(|r| r.concept_count).collect();
        let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.vector.clone()).collect();
        validate_vector_dimension(&vectors, self.dimension)?;

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(names)),
                Arc::new(StringArray::from(descriptions)),
                Arc::new(Int64Array::from(parents)),
                Arc::new(encode_string_lists(&aliases)),
                Arc::new(encode_u32_lists(&related)),
                Arc::new(UInt32Array::from(doc_counts)),
                Arc::new(UInt32Array::from(chunk_counts)),
                Arc::new(UInt32Array::from(concept_counts)),
                Arc::new(encode_vectors(&vectors, self.dimension)),
            ],
        )
        .map_err(|e| EngineError::database("build category batch", anyhow::anyhow!(e)))
    }

    fn batch_to_rows(&self, batch: &RecordBatch) -> Result<Vec<CategoryRow>> {
        let ids = column_u32(batch, "id")?;
        let names = column_string(batch, "name")?;
        let descriptions = column_string(batch, "description")?;
        let parents = column_i64(batch, "parent_category_id")?;
        let aliases = column_list(batch, "aliases")?;
        let related = column_list(batch, "related_categories")?;
        let doc_counts = column_u32(batch, "document_count")?;
        let chunk_counts = column_u32(batch, "chunk_count")?;
        let concept_counts = column_u32(batch, "concept_count")?;
        let vectors = column_vector(batch, "vector")?;

        let mut out = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if names.value(i) == "__seed__" {
                continue;
            }
            let parent = parents.value(i);
            out.push(CategoryRow {
                id: ids.value(i),
                name: names.value(i).to_string(),
                description: descriptions.value(i).to_string(),
                parent_category_id: if parent == NO_PARENT { None } else { Some(parent as u32) },
                aliases: decode_string_list(aliases, i),
                related_categories: decode_u32_list(related, i),
                document_count: doc_counts.value(i),
                chunk_count: chunk_counts.value(i),
                concept_count: concept_counts.value(i),
                vector: decode_vector(vectors, i, self.dimension),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl CategoryRepository for LanceCategoryRepository {
    async fn find_by_id(&self, id: u32) -> Result<CategoryRow> {
        self.find_by_id_opt(id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound {
                entity: "category",
                id: id.to_string(),
            })
    }

    async fn find_by_id_opt(&self, id: u32) -> Result<Option<CategoryRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(filter::eq_u32("id", id))
            .execute()
            .await
            .map_err(|e| EngineError::database("get category by id", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect category batches", anyhow::anyhow!(e)))?;
        for batch in &batches {
            if let Some(row) = self.batch_to_rows(batch)?.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRow>> {
        let canonical = crate::identity::canonicalize_name(name);
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(filter::eq_string("name", &canonical))
            .execute()
            .await
            .map_err(|e| EngineError::database("find category by name", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect category batches", anyhow::anyhow!(e)))?;
        for batch in &batches {
            if let Some(row) = self.batch_to_rows(batch)?.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn list(&self, sort: CategorySort, limit: usize) -> Result<Vec<CategoryRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .limit(limit.max(1) * 4) // over-fetch since sort happens client-side below
            .execute()
            .await
            .map_err(|e| EngineError::database("list categories", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect category batches", anyhow::anyhow!(e)))?;
        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(self.batch_to_rows(batch)?);
        }
        match sort {
            CategorySort::NameAscending => rows.sort_by(|a, b| a.name.cmp(&b.name)),
            CategorySort::DocumentCountDescending => {
                rows.sort_by(|a, b| b.document_count.cmp(&a.document_count))
            }
        }
        rows.truncate(limit);
        Ok(rows)
    }

    async fn upsert_many(&self, rows: Vec<CategoryRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = self.open_table().await?;
        for row in &rows {
            table.delete(&filter::eq_u32("id", row.id)).await.ok();
        }
        let batch = self.rows_to_batch(&rows)?;
        let schema = self.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| EngineError::database("upsert categories", anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| EngineError::database("count categories", anyhow::anyhow!(e)))
    }
}
