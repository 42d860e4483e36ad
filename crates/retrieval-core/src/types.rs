//! Domain row types for the four logical tables (§3) plus the search
//! result and metadata-filter types shared across search services.
//!
//! Every row carries a 32-bit hash `id` (see [`crate::identity`]) and a
//! dense 384-dim `vector`. Relations are native arrays of integer ids, not
//! JSON-encoded strings — the teacher's `ChunkRecord` stored `metadata_json`
//! / `citation_json` blobs; this model keeps the array fields typed all
//! the way through the repository boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const VECTOR_DIMENSION: usize = 384;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: u32,
    pub source_path: String,
    pub summary: String,
    pub content_hash: String,
    pub category_ids: Vec<u32>,
    pub vector: Vec<f32>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkLocation {
    pub page: Option<u32>,
    pub byte_start: u64,
    pub byte_end: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
    pub id: u32,
    pub catalog_id: u32,
    pub chunk_index: u32,
    pub text: String,
    pub content_hash: String,
    pub location: ChunkLocation,
    pub concept_ids: Vec<u32>,
    pub category_ids: Vec<u32>,
    pub vector: Vec<f32>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRow {
    pub id: u32,
    pub name: String,
    pub summary: String,
    pub catalog_ids: Vec<u32>,
    pub related_concept_ids: Vec<u32>,
    pub synonyms: Vec<String>,
    pub broader_terms: Vec<String>,
    pub narrower_terms: Vec<String>,
    /// Normalized corpus-frequency weight in [0, 1].
    pub weight: f32,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: u32,
    pub name: String,
    pub description: String,
    /// Flat hierarchy for now; the slot is reserved for future nesting.
    pub parent_category_id: Option<u32>,
    pub aliases: Vec<String>,
    pub related_categories: Vec<u32>,
    pub document_count: u32,
    pub chunk_count: u32,
    pub concept_count: u32,
    pub vector: Vec<f32>,
}

/// Per-signal sub-scores attached to a ranked result for transparency
/// (§4.6 step 5). Values are the already-normalized contributions used
/// in the weighted sum, not the raw signal outputs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub vector: f32,
    pub bm25: f32,
    pub title: f32,
    pub concept: f32,
    pub lexical: f32,
    pub total: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSearchResult {
    pub catalog_id: u32,
    pub source_path: String,
    pub summary: String,
    pub scores: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk_id: u32,
    pub catalog_id: u32,
    pub source_path: String,
    pub text: String,
    pub scores: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptSearchResult {
    pub concept_id: u32,
    pub concept_name: String,
    pub related_concept_names: Vec<String>,
    pub chunks: Vec<ChunkSearchResult>,
}

/// Scalar filter applied before (or alongside) scoring. `source_path` is
/// used by chunk-in-source search; `category_id` by category-scoped
/// search; `custom` carries additional equality filters a caller may
/// need without growing this struct per case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub source_path: Option<String>,
    pub category_id: Option<u32>,
    pub date_from: Option<i64>,
    pub date_to: Option<i64>,
    pub custom: Option<HashMap<String, String>>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.source_path.is_none()
            && self.category_id.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.custom.as_ref().map(|m| m.is_empty()).unwrap_or(true)
    }

    /// A stable digest of the active filters, suitable as part of a
    /// search-cache key. Does not itself need escaping since it never
    /// touches a query string — escaping happens in `storage::filter`.
    pub fn digest(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref p) = self.source_path {
            parts.push(format!("source_path={p}"));
        }
        if let Some(c) = self.category_id {
            parts.push(format!("category_id={c}"));
        }
        if let Some(f) = self.date_from {
            parts.push(format!("date_from={f}"));
        }
        if let Some(t) = self.date_to {
            parts.push(format!("date_to={t}"));
        }
        if let Some(ref custom) = self.custom {
            let mut keys: Vec<_> = custom.keys().collect();
            keys.sort();
            for k in keys {
                parts.push(format!("{k}={}", custom[k]));
            }
        }
        parts.join("&")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentFormat {
    Txt,
    Md,
    Html,
    Json,
    Pdf,
    Csv,
    Epub,
    Code,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Md),
            "html" | "htm" => Some(Self::Html),
            "json" => Some(Self::Json),
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            "epub" => Some(Self::Epub),
            "rs" | "py" | "js" | "ts" | "jsx" | "tsx" | "go" | "java" | "c" | "cpp" | "h"
            | "hpp" | "cs" | "rb" | "php" | "swift" | "kt" | "scala" | "sql" | "sh" | "yaml"
            | "yml" | "toml" => Some(Self::Code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_digest_is_order_independent_for_custom_keys() {
        let mut a = MetadataFilter::default();
        let mut custom = HashMap::new();
        custom.insert("b".to_string(), "2".to_string());
        custom.insert("a".to_string(), "1".to_string());
        a.custom = Some(custom);
        assert_eq!(a.digest(), "a=1&b=2");
    }

    #[test]
    fn empty_filter_reports_empty() {
        assert!(MetadataFilter::default().is_empty());
    }

    #[test]
    fn unknown_extension_yields_none() {
        assert_eq!(DocumentFormat::from_extension("xyz123"), None);
    }
}
