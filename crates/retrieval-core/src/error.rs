//! Domain error type for the retrieval engine.
//!
//! Every variant carries a stable machine-readable code (`code()`) matching
//! one of the seven prefixes the tool surface and CLI exit codes key off of:
//! `VALIDATION_*`, `DB_*`, `EMBED_*`, `SEARCH_*`, `CFG_*`, `DOC_*`, `RES_*`.
//! Infrastructure errors are wrapped with operation/entity context and keep
//! their cause chain via `#[source]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("record not found: {entity} {id}")]
    RecordNotFound { entity: &'static str, id: String },

    #[error("database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store connection error: {0}")]
    Connection(#[source] anyhow::Error),

    #[error("id collision for {entity} {id}: existing canonical form differs from '{canonical}'")]
    IdCollision {
        entity: &'static str,
        id: u32,
        canonical: String,
    },

    #[error("embedding provider error: {0}")]
    EmbedProvider(#[source] anyhow::Error),

    #[error("embedding rate-limited, retry after backoff")]
    EmbedRateLimit,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbedDimensionMismatch { expected: usize, actual: usize },

    #[error("invalid search query: {0}")]
    SearchInvalidQuery(String),

    #[error("search timed out after {0:?}")]
    SearchTimeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported document format: {0}")]
    DocUnsupportedFormat(String),

    #[error("document parse error for {path}: {source}")]
    DocParse {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("document too large: {size} bytes (limit {limit})")]
    DocTooLarge { size: u64, limit: u64 },

    #[error("operation timed out after {0:?}")]
    ResTimeout(std::time::Duration),

    #[error("circuit breaker open for '{0}'")]
    ResCircuitOpen(String),

    #[error("bulkhead rejected: {0} at capacity")]
    ResBulkheadRejected(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{operation} failed: {source}")]
    Wrapped {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Stable machine-readable code, mirroring the prefixes the tool
    /// envelope and CLI surfaces expose to callers.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "VALIDATION_INVALID",
            EngineError::RecordNotFound { .. } => "DB_RECORD_NOT_FOUND",
            EngineError::Database { .. } => "DB_QUERY_ERROR",
            EngineError::Connection(_) => "DB_CONNECTION_ERROR",
            EngineError::IdCollision { .. } => "DB_ID_COLLISION",
            EngineError::EmbedProvider(_) => "EMBED_PROVIDER_ERROR",
            EngineError::EmbedRateLimit => "EMBED_RATE_LIMIT",
            EngineError::EmbedDimensionMismatch { .. } => "EMBED_DIMENSION_MISMATCH",
            EngineError::SearchInvalidQuery(_) => "SEARCH_INVALID_QUERY",
            EngineError::SearchTimeout(_) => "SEARCH_TIMEOUT",
            EngineError::Configuration(_) => "CFG_INVALID",
            EngineError::DocUnsupportedFormat(_) => "DOC_UNSUPPORTED_FORMAT",
            EngineError::DocParse { .. } => "DOC_PARSE_ERROR",
            EngineError::DocTooLarge { .. } => "DOC_TOO_LARGE",
            EngineError::ResTimeout(_) => "RES_TIMEOUT",
            EngineError::ResCircuitOpen(_) => "RES_CIRCUIT_OPEN",
            EngineError::ResBulkheadRejected(_) => "RES_BULKHEAD_REJECTED",
            EngineError::Cancelled => "RES_CANCELLED",
            EngineError::Wrapped { .. } => "DB_QUERY_ERROR",
        }
    }

    /// Whether the retry layer is allowed to retry this error. Validation,
    /// configuration, and circuit-open errors are never retried; the rest
    /// may be, subject to the resilience profile's max-attempts cap.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            EngineError::Validation { .. }
                | EngineError::Configuration(_)
                | EngineError::ResCircuitOpen(_)
                | EngineError::EmbedDimensionMismatch { .. }
                | EngineError::DocUnsupportedFormat(_)
                | EngineError::Cancelled
        )
    }

    pub fn database(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        EngineError::Database {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn wrapped(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        EngineError::Wrapped {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<lancedb::Error> for EngineError {
    fn from(e: lancedb::Error) -> Self {
        EngineError::database("lancedb operation", anyhow::anyhow!(e))
    }
}

impl From<tantivy::TantivyError> for EngineError {
    fn from(e: tantivy::TantivyError) -> Self {
        EngineError::database("tantivy operation", anyhow::anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_never_retryable() {
        let e = EngineError::Validation {
            field: "query".into(),
            reason: "empty".into(),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.code(), "VALIDATION_INVALID");
    }

    #[test]
    fn circuit_open_is_never_retried_at_inner_layer() {
        let e = EngineError::ResCircuitOpen("llm_extract".into());
        assert!(!e.is_retryable());
        assert_eq!(e.code(), "RES_CIRCUIT_OPEN");
    }

    #[test]
    fn connection_errors_are_retryable() {
        let e = EngineError::Connection(anyhow::anyhow!("refused"));
        assert!(e.is_retryable());
    }
}
