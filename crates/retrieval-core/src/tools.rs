//! The tool surface (§6): the JSON-in/JSON-out operations an external
//! agent runtime invokes against a fully-wired [`Engine`].
//!
//! Grounded in the teacher's MCP tool layer (`mcp/mod.rs::ToolDefinition`/
//! `ToolCallResult`, `mcp/builtin_tools.rs::get_builtin_tools`), which
//! exposes the same RAG system as a set of named, JSON-schema-described
//! operations. This generalizes that shape from the teacher's
//! `{success, result, error, artifacts}` result envelope to the uniform
//! `{content, isError, _meta}` envelope this engine's tool surface
//! actually returns, and replaces the teacher's single `rag_search`
//! catch-all with the ten named, single-purpose operations below.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::identity::canonicalize_name;
use crate::storage::repo::CategorySort;
use crate::storage::{CatalogRepository, CategoryRepository, ChunkRepository, ConceptRepository};
use crate::types::{CatalogSearchResult, ChunkSearchResult, ConceptSearchResult};

/// One block of a tool result's `content` array. The tool surface only
/// ever emits `"text"` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

impl ToolContentBlock {
    fn text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Uniform envelope every tool call returns (§6): the result payload
/// serialized into a single text block on success, or a `{code,
/// message}` body with `isError:true` on failure. Never a stack trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub content: Vec<ToolContentBlock>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ToolEnvelope {
    fn ok(payload: &impl Serialize) -> Self {
        let text = serde_json::to_string(payload).unwrap_or_else(|_| "null".to_string());
        Self {
            content: vec![ToolContentBlock::text(text)],
            is_error: false,
            meta: None,
        }
    }

    fn err(error: &EngineError) -> Self {
        let body = json!({ "code": error.code(), "message": error.to_string() });
        Self {
            content: vec![ToolContentBlock::text(body.to_string())],
            is_error: true,
            meta: None,
        }
    }
}

fn envelope<T: Serialize>(result: Result<T, EngineError>) -> ToolEnvelope {
    match result {
        Ok(payload) => ToolEnvelope::ok(&payload),
        Err(e) => ToolEnvelope::err(&e),
    }
}

/// Boundary check shared by every tool taking free-text input (§8: empty
/// query ⇒ `VALIDATION_*`, text over 10,000 chars ⇒ `VALIDATION_*`).
fn validate_query_text(field: &'static str, text: &str) -> Result<(), EngineError> {
    if text.trim().is_empty() {
        return Err(EngineError::Validation {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if text.chars().count() > 10_000 {
        return Err(EngineError::Validation {
            field: field.to_string(),
            reason: "must not exceed 10,000 characters".to_string(),
        });
    }
    Ok(())
}

fn validate_non_empty(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSearchArgs {
    pub text: String,
    #[serde(default)]
    pub top_n: Option<usize>,
}

/// `catalog_search`: documents ranked by summary relevance.
pub async fn catalog_search(engine: &Engine, args: CatalogSearchArgs) -> ToolEnvelope {
    envelope(catalog_search_inner(engine, args).await)
}

async fn catalog_search_inner(
    engine: &Engine,
    args: CatalogSearchArgs,
) -> Result<Vec<CatalogSearchResult>, EngineError> {
    validate_query_text("text", &args.text)?;
    let top_n = args.top_n.unwrap_or(engine.config.scoring.default_top_n);
    engine.search.catalog_search(&args.text, top_n, false).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadChunksSearchArgs {
    pub text: String,
    #[serde(default)]
    pub top_n: Option<usize>,
}

/// `broad_chunks_search`: passages ranked across the whole corpus.
pub async fn broad_chunks_search(engine: &Engine, args: BroadChunksSearchArgs) -> ToolEnvelope {
    envelope(broad_chunks_search_inner(engine, args).await)
}

async fn broad_chunks_search_inner(
    engine: &Engine,
    args: BroadChunksSearchArgs,
) -> Result<Vec<ChunkSearchResult>, EngineError> {
    validate_query_text("text", &args.text)?;
    let top_n = args.top_n.unwrap_or(engine.config.scoring.default_top_n);
    engine.search.broad_chunk_search(&args.text, top_n, false).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunksSearchArgs {
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub top_n: Option<usize>,
}

/// `chunks_search`: passages ranked within a single document.
pub async fn chunks_search(engine: &Engine, args: ChunksSearchArgs) -> ToolEnvelope {
    envelope(chunks_search_inner(engine, args).await)
}

async fn chunks_search_inner(engine: &Engine, args: ChunksSearchArgs) -> Result<Vec<ChunkSearchResult>, EngineError> {
    validate_query_text("text", &args.text)?;
    validate_non_empty("source", &args.source)?;
    let top_n = args.top_n.unwrap_or(engine.config.scoring.default_top_n);
    engine.search.chunk_in_source_search(&args.text, &args.source, top_n, false).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptSearchArgs {
    pub text: String,
    #[serde(default)]
    pub top_n: Option<usize>,
}

/// `concept_search`: the single best-matching concept plus its related
/// concepts and member chunks, ranked. `None` (not an error) when no
/// concept resolves for the query.
pub async fn concept_search(engine: &Engine, args: ConceptSearchArgs) -> ToolEnvelope {
    envelope(concept_search_inner(engine, args).await)
}

async fn concept_search_inner(
    engine: &Engine,
    args: ConceptSearchArgs,
) -> Result<Option<ConceptSearchResult>, EngineError> {
    validate_query_text("text", &args.text)?;
    let top_n = args.top_n.unwrap_or(engine.config.scoring.default_top_n);
    engine.search.concept_search(&args.text, top_n, false).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConceptsArgs {
    pub source: String,
}

/// `extract_concepts`: live re-derivation of a document's concepts by
/// loading it fresh and running it through the resilience-wrapped
/// extractor, not a read of whatever was persisted at last ingestion.
pub async fn extract_concepts(engine: &Engine, args: ExtractConceptsArgs) -> ToolEnvelope {
    envelope(extract_concepts_inner(engine, args).await)
}

async fn extract_concepts_inner(engine: &Engine, args: ExtractConceptsArgs) -> Result<Vec<String>, EngineError> {
    validate_non_empty("source", &args.source)?;
    let extracted = engine.ingestion.extract_concepts_for_source(Path::new(&args.source)).await?;
    Ok(extracted.all_concept_names())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConceptsArgs {
    pub source: String,
}

/// `source_concepts`: the concept names already persisted on a
/// document's stored chunks, as of the last ingestion run.
pub async fn source_concepts(engine: &Engine, args: SourceConceptsArgs) -> ToolEnvelope {
    envelope(source_concepts_inner(engine, args).await)
}

async fn source_concepts_inner(engine: &Engine, args: SourceConceptsArgs) -> Result<Vec<String>, EngineError> {
    validate_non_empty("source", &args.source)?;
    let chunks = engine.chunks.find_by_source(&args.source, None).await?;

    let mut concept_ids: std::collections::BTreeSet<u32> = std::collections::BTreeSet::new();
    for chunk in &chunks {
        concept_ids.extend(chunk.concept_ids.iter().copied());
    }

    let mut names = Vec::with_capacity(concept_ids.len());
    for id in concept_ids {
        if let Some(concept) = engine.concepts.find_by_id_opt(id).await? {
            names.push(concept.name);
        }
    }
    names.sort();
    Ok(names)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptSourcesArgs {
    pub concept: String,
}

/// `concept_sources`: documents whose chunks mention a named concept. An
/// unknown concept name yields an empty list, not an error — absence of
/// a match is informational (§7).
pub async fn concept_sources(engine: &Engine, args: ConceptSourcesArgs) -> ToolEnvelope {
    envelope(concept_sources_inner(engine, args).await)
}

async fn concept_sources_inner(engine: &Engine, args: ConceptSourcesArgs) -> Result<Vec<String>, EngineError> {
    validate_non_empty("concept", &args.concept)?;
    let canonical = canonicalize_name(&args.concept);
    let Some(concept) = engine.concepts.find_by_name(&canonical).await? else {
        return Ok(Vec::new());
    };

    let mut sources = Vec::with_capacity(concept.catalog_ids.len());
    for catalog_id in concept.catalog_ids {
        if let Some(row) = engine.catalog.get_opt(catalog_id).await? {
            sources.push(row.source_path);
        }
    }
    sources.sort();
    Ok(sources)
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDocumentEntry {
    pub source: String,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySearchArgs {
    pub category: String,
}

/// `category_search`: documents filed under a named category. An unknown
/// category name yields an empty list, not an error.
pub async fn category_search(engine: &Engine, args: CategorySearchArgs) -> ToolEnvelope {
    envelope(category_search_inner(engine, args).await)
}

async fn category_search_inner(
    engine: &Engine,
    args: CategorySearchArgs,
) -> Result<Vec<CategoryDocumentEntry>, EngineError> {
    validate_non_empty("category", &args.category)?;
    let canonical = canonicalize_name(&args.category);
    let Some(category) = engine.categories.find_by_name(&canonical).await? else {
        return Ok(Vec::new());
    };

    let documents = engine.category_service.find_documents_in_category(category.id).await?;
    Ok(documents
        .into_iter()
        .map(|row| CategoryDocumentEntry {
            source: row.source_path,
            summary: row.summary,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBrowseEntry {
    pub name: String,
    pub document_count: u32,
    pub chunk_count: u32,
    pub concept_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListCategoriesArgs {
    #[serde(default)]
    pub prefix: Option<String>,
    /// `"name"` (default) or `"document_count"`.
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `list_categories`: browse the category catalog, optionally filtered by
/// name prefix and sorted by name or document count.
pub async fn list_categories(engine: &Engine, args: ListCategoriesArgs) -> ToolEnvelope {
    envelope(list_categories_inner(engine, args).await)
}

async fn list_categories_inner(
    engine: &Engine,
    args: ListCategoriesArgs,
) -> Result<Vec<CategoryBrowseEntry>, EngineError> {
    let sort = match args.sort.as_deref() {
        Some("document_count") => CategorySort::DocumentCountDescending,
        _ => CategorySort::NameAscending,
    };
    let limit = args.limit.unwrap_or(engine.config.scoring.default_top_n.max(20));
    let rows = engine
        .category_service
        .list_categories(sort, limit, args.prefix.as_deref())
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| CategoryBrowseEntry {
            name: row.name,
            document_count: row.document_count,
            chunk_count: row.chunk_count,
            concept_count: row.concept_count,
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListConceptsInCategoryArgs {
    pub category: String,
}

/// `list_concepts_in_category`: concept names occurring anywhere in a
/// category's documents. An unknown category name yields an empty list.
pub async fn list_concepts_in_category(engine: &Engine, args: ListConceptsInCategoryArgs) -> ToolEnvelope {
    envelope(list_concepts_in_category_inner(engine, args).await)
}

async fn list_concepts_in_category_inner(
    engine: &Engine,
    args: ListConceptsInCategoryArgs,
) -> Result<Vec<String>, EngineError> {
    validate_non_empty("category", &args.category)?;
    let canonical = canonicalize_name(&args.category);
    let Some(category) = engine.categories.find_by_name(&canonical).await? else {
        return Ok(Vec::new());
    };

    let concept_ids = engine.category_service.concepts_in_category(category.id).await?;
    let mut names = Vec::with_capacity(concept_ids.len());
    for id in concept_ids {
        if let Some(concept) = engine.concepts.find_by_id_opt(id).await? {
            names.push(concept.name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_text_is_rejected() {
        let err = validate_query_text("text", "   ").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_INVALID");
    }

    #[test]
    fn overlong_query_text_is_rejected() {
        let text: String = "a".repeat(10_001);
        let err = validate_query_text("text", &text).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_INVALID");
    }

    #[test]
    fn query_text_within_bounds_is_accepted() {
        assert!(validate_query_text("text", "distributed consensus").is_ok());
    }

    #[test]
    fn ok_envelope_is_never_marked_as_error() {
        let envelope: ToolEnvelope = ToolEnvelope::ok(&json!({"hits": 3}));
        assert!(!envelope.is_error);
        assert_eq!(envelope.content.len(), 1);
        assert_eq!(envelope.content[0].block_type, "text");
    }

    #[test]
    fn err_envelope_carries_the_stable_error_code() {
        let error = EngineError::Validation {
            field: "text".into(),
            reason: "must not be empty".into(),
        };
        let envelope = ToolEnvelope::err(&error);
        assert!(envelope.is_error);
        assert!(envelope.content[0].text.contains("VALIDATION_INVALID"));
    }
}
