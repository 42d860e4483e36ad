//! Arrow column encode/decode helpers shared by all four table
//! repositories. Generalizes the teacher's single-table `FixedSizeListArray`
//! vector-column construction (`lance_store.rs::upsert_chunks`) to also
//! cover the `List<UInt32>` / `List<Utf8>` array-id columns this data
//! model needs (concept_ids, category_ids, catalog_ids, synonyms, ...)
//! that the teacher's single flat table never had to represent.

use arrow_array::builder::{ListBuilder, StringBuilder, UInt32Builder};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, ListArray, StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field};
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Invariant 6 (§3): vector dimension must be exactly `dimension` on every
/// row. A mismatch is fatal for that write, not a silent zero-fill.
pub fn validate_vector_dimension(vectors: &[Vec<f32>], dimension: usize) -> Result<()> {
    for v in vectors {
        if v.len() != dimension {
            return Err(EngineError::Validation {
                field: "vector".to_string(),
                reason: format!("expected dimension {dimension}, got {}", v.len()),
            });
        }
    }
    Ok(())
}

pub fn encode_vectors(vectors: &[Vec<f32>], dimension: usize) -> FixedSizeListArray {
    let flat: Vec<f32> = vectors.iter().flat_map(|v| v.clone()).collect();
    let values = Float32Array::from(flat);
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    FixedSizeListArray::new(field, dimension as i32, Arc::new(values), None)
}

pub fn decode_vector(array: &FixedSizeListArray, row: usize, dimension: usize) -> Vec<f32> {
    let values = array.value(row);
    let floats = values
        .as_any()
        .downcast_ref::<Float32Array>()
        .expect("vector column values must be Float32Array");
    (0..dimension.min(floats.len())).map(|i| floats.value(i)).collect()
}

pub fn encode_u32_lists(lists: &[Vec<u32>]) -> ListArray {
    let mut builder = ListBuilder::new(UInt32Builder::new());
    for list in lists {
        for &v in list {
            builder.values().append_value(v);
        }
        builder.append(true);
    }
    builder.finish()
}

pub fn decode_u32_list(array: &ListArray, row: usize) -> Vec<u32> {
    let values = array.value(row);
    let ints = values
        .as_any()
        .downcast_ref::<UInt32Array>()
        .expect("id-array column values must be UInt32Array");
    ints.iter().map(|v| v.unwrap_or(0)).collect()
}

pub fn encode_string_lists(lists: &[Vec<String>]) -> ListArray {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for list in lists {
        for v in list {
            builder.values().append_value(v);
        }
        builder.append(true);
    }
    builder.finish()
}

pub fn decode_string_list(array: &ListArray, row: usize) -> Vec<String> {
    let values = array.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string-array column values must be StringArray");
    strings.iter().map(|v| v.unwrap_or("").to_string()).collect()
}

pub fn column_u32(
    batch: &arrow_array::RecordBatch,
    name: &str,
) -> Result<&UInt32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| EngineError::database(format!("missing column {name}"), anyhow::anyhow!("column type mismatch")))
}

pub fn column_string(
    batch: &arrow_array::RecordBatch,
    name: &str,
) -> Result<&StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| EngineError::database(format!("missing column {name}"), anyhow::anyhow!("column type mismatch")))
}

pub fn column_i64(
    batch: &arrow_array::RecordBatch,
    name: &str,
) -> Result<&arrow_array::Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<arrow_array::Int64Array>())
        .ok_or_else(|| EngineError::database(format!("missing column {name}"), anyhow::anyhow!("column type mismatch")))
}

pub fn column_f32(
    batch: &arrow_array::RecordBatch,
    name: &str,
) -> Result<&Float32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| EngineError::database(format!("missing column {name}"), anyhow::anyhow!("column type mismatch")))
}

pub fn column_list(
    batch: &arrow_array::RecordBatch,
    name: &str,
) -> Result<&ListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
        .ok_or_else(|| EngineError::database(format!("missing column {name}"), anyhow::anyhow!("column type mismatch")))
}

pub fn column_vector(
    batch: &arrow_array::RecordBatch,
    name: &str,
) -> Result<&FixedSizeListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| EngineError::database(format!("missing column {name}"), anyhow::anyhow!("column type mismatch")))
}
