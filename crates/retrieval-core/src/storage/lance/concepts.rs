use arrow_array::{Array, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::Path;
use std::sync::Arc;

use super::arrow_util::{
    column_f32, column_list, column_string, column_u32, column_vector, decode_string_list,
    decode_u32_list, decode_vector, encode_string_lists, encode_u32_lists, encode_vectors, validate_vector_dimension,
};
use crate::error::{EngineError, Result};
use crate::storage::filter;
use crate::storage::repo::ConceptRepository;
use crate::types::ConceptRow;

pub struct LanceConceptRepository {
    db: lancedb::Connection,
    dimension: usize,
}

const TABLE: &str = "concepts";

impl LanceConceptRepository {
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
            Field::new("summary", DataType::Utf8, false),
            Field::new("catalog_ids", u32_list(), true),
            Field::new("related_concept_ids", u32_list(), true),
            Field::new("synonyms", str_list(), true),
            Field::new("broader_terms", str_list(), true),
            Field::new("narrower_terms", str_list(), true),
            Field::new("weight", DataType::Float32, false),
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

        let seed = self.rows_to_batch(&[ConceptRow {
            id: 0,
            name: "__seed__".to_string(),
            summary: String::new(),
            catalog_ids: vec![],
            related_concept_ids: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 0.0,
            vector: vec![0.0; self.dimension],
        }])?;

        let schema = self.schema();
        let batches = RecordBatchIterator::new(vec![Ok(seed)], schema);
        self.db
            .create_table(TABLE, Box::new(batches))
            .execute()
            .await
            .map_err(|e| EngineError::database("create concepts table", anyhow::anyhow!(e)))?;

        let table = self.open_table().await?;
        table.delete("name = '__seed__'").await.ok();
        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(TABLE)
            .execute()
            .await
            .map_err(|e| EngineError::database("open concepts table", anyhow::anyhow!(e)))
    }

    fn rows_to_batch(&self, rows: &[ConceptRow]) -> Result<RecordBatch> {
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        let summaries: Vec<&str> = rows.iter().map(|r| r.summary.as_str()).collect();
        let catalog_ids: Vec<Vec<u32>> = rows.iter().map(|r| r.catalog_ids.clone()).collect();
        let related: Vec<Vec<u32>> = rows.iter().map(|r| r.related_concept_ids.clone()).collect();
        let synonyms: Vec<Vec<String>> = rows.iter().map(|r| r.synonyms.clone()).collect();
        let broader: Vec<Vec<String>> = rows.iter().map(|r| r.broader_terms.clone()).collect();
        let narrower: Vec<Vec<String>> = rows.iter().map(|r| r.narrower_terms.clone()).collect();
        let weights: Vec<f32> = rows.iter().map(|r| r.weight).collect();
        let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.vector.clone()).collect();
        validate_vector_dimension(&vectors, self.dimension)?;

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(names)),
                Arc::new(StringArray::from(summaries)),
                Arc::new(encode_u32_lists(&catalog_ids)),
                Arc::new(encode_u32_lists(&related)),
                Arc::new(encode_string_lists(&synonyms)),
                Arc::new(encode_string_lists(&broader)),
                Arc::new(encode_string_lists(&narrower)),
                Arc::new(Float32Array::from(weights)),
                Arc::new(encode_vectors(&vectors, self.dimension)),
            ],
        )
        .map_err(|e| EngineError::database("build concept batch", anyhow::anyhow!(e)))
    }

    fn batch_to_rows(
        &self,
        batch: &RecordBatch,
        scores: Option<&Float32Array>,
    ) -> Result<Vec<(ConceptRow, f32)>> {
        let ids = column_u32(batch, "id")?;
        let names = column_string(batch, "name")?;
        let summaries = column_string(batch, "summary")?;
        let catalog_ids = column_list(batch, "catalog_ids")?;
        let related = column_list(batch, "related_concept_ids")?;
        let synonyms = column_list(batch, "synonyms")?;
        let broader = column_list(batch, "broader_terms")?;
        let narrower = column_list(batch, "narrower_terms")?;
        let weights = column_f32(batch, "weight")?;
        let vectors = column_vector(batch, "vector")?;

        let mut out = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if names.value(i) == "__seed__" {
                continue;
            }
            let row = ConceptRow {
                id: ids.value(i),
                name: names.value(i).to_string(),
                summary: summaries.value(i).to_string(),
                catalog_ids: decode_u32_list(catalog_ids, i),
                related_concept_ids: decode_u32_list(related, i),
                synonyms: decode_string_list(synonyms, i),
                broader_terms: decode_string_list(broader, i),
                narrower_terms: decode_string_list(narrower, i),
                weight: weights.value(i),
                vector: decode_vector(vectors, i, self.dimension),
            };
            let score = scores.map(|s| (1.0 - s.value(i)).max(0.0)).unwrap_or(0.0);
            out.push((row, score));
        }
        Ok(out)
    }
}

#[async_trait]
impl ConceptRepository for LanceConceptRepository {
    async fn find_by_id(&self, id: u32) -> Result<ConceptRow> {
        self.find_by_id_opt(id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound {
                entity: "concept",
                id: id.to_string(),
            })
    }

    async fn find_by_id_opt(&self, id: u32) -> Result<Option<ConceptRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(filter::eq_u32("id", id))
            .execute()
            .await
            .map_err(|e| EngineError::database("get concept by id", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect concept batches", anyhow::anyhow!(e)))?;
        for batch in &batches {
            if let Some((row, _)) = self.batch_to_rows(batch, None)?.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ConceptRow>> {
        let canonical = crate::identity::canonicalize_name(name);
        let table = self.open_table().await?;
        let results = table
            .query()
            .only_if(filter::eq_string("name", &canonical))
            .execute()
            .await
            .map_err(|e| EngineError::database("find concept by name", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect concept batches", anyhow::anyhow!(e)))?;
        for batch in &batches {
            if let Some((row, _)) = self.batch_to_rows(batch, None)?.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn search_similar(&self, vector: &[f32], k: usize) -> Result<Vec<(ConceptRow, f32)>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .nearest_to(vector)
            .map_err(|e| EngineError::database("build concept vector query", anyhow::anyhow!(e)))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| EngineError::database("concept vector search", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect concept batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            out.extend(self.batch_to_rows(batch, distances)?);
        }
        Ok(out)
    }

    async fn get_all(&self) -> Result<Vec<ConceptRow>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| EngineError::database("list concepts", anyhow::anyhow!(e)))?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| EngineError::database("collect concept batches", anyhow::anyhow!(e)))?;
        let mut out = Vec::new();
        for batch in &batches {
            out.extend(self.batch_to_rows(batch, None)?.into_iter().map(|(r, _)| r));
        }
        Ok(out)
    }

    async fn upsert_many(&self, rows: Vec<ConceptRow>) -> Result<()> {
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
            .map_err(|e| EngineError::database("upsert concepts", anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| EngineError::database("count concepts", anyhow::anyhow!(e)))
    }
}
