//! External collaborator contracts (§6): the document loader factory and
//! the LLM extractor. Both are out-of-core per the spec's Non-goals — this
//! module defines the trait each adapter must satisfy plus one local,
//! deterministic default implementation so the engine is runnable without
//! a network call or a model file, mirroring `embeddings::LocalHashEmbedder`'s
//! role as the in-core `EmbeddingProvider` default.
//!
//! `LexicalNetwork` has its own home in [`crate::concepts::lexical`] since
//! it is consumed directly by the query expander rather than by
//! ingestion; it is re-exported here for discoverability alongside the
//! other three external contracts §6 names.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{EngineError, Result};

#[doc(inline)]
pub use crate::concepts::lexical::LexicalNetwork;

/// One loaded document: its extracted plain text plus whatever metadata
/// the loader could recover (title, page count, ...). `metadata` values
/// are loader-specific and not interpreted by the ingestion orchestrator
/// beyond an optional `"title"` key used for catalog display.
#[derive(Debug, Clone, Default)]
pub struct LoadedDocument {
    pub text: String,
    pub metadata: std::collections::HashMap<String, String>,
}

/// `DocumentLoader Factory` (§6): claims a set of extensions and parses
/// matching files into plain text. Concrete adapters for PDF/EPUB/OCR are
/// external collaborators per the Non-goals; this crate ships only
/// `PlainTextLoader`.
pub trait DocumentLoader: Send + Sync {
    fn supported_extensions(&self) -> &[&'static str];
    fn load(&self, path: &Path) -> Result<LoadedDocument>;
}

/// Dispatches to the first registered loader claiming a file's extension,
/// per §9's "capability-set polymorphism... the factory returns the first
/// adapter claiming an extension" redesign note.
pub struct LoaderFactory {
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl LoaderFactory {
    pub fn new() -> Self {
        Self { loaders: vec![Box::new(PlainTextLoader)] }
    }

    /// Register an additional loader ahead of the built-in ones (e.g. a
    /// PDF adapter plugged in by a deployment). The most recently
    /// registered loader wins ties on extension.
    pub fn register(&mut self, loader: Box<dyn DocumentLoader>) {
        self.loaders.insert(0, loader);
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.loaders.iter().flat_map(|l| l.supported_extensions().iter().copied()).collect()
    }

    pub fn loader_for(&self, path: &Path) -> Option<&dyn DocumentLoader> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.loaders
            .iter()
            .find(|l| l.supported_extensions().contains(&ext.as_str()))
            .map(|b| b.as_ref())
    }

    pub fn load(&self, path: &Path) -> Result<LoadedDocument> {
        match self.loader_for(path) {
            Some(loader) => loader.load(path),
            None => Err(EngineError::DocUnsupportedFormat(
                path.extension().and_then(|e| e.to_str()).unwrap_or("").to_string(),
            )),
        }
    }
}

impl Default for LoaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// In-core default: reads `.txt`/`.md` files verbatim as UTF-8 (lossily,
/// for corpora with stray non-UTF-8 bytes). PDF/EPUB/OCR loaders are
/// external-collaborator concerns the spec scopes out of this core.
pub struct PlainTextLoader;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];
/// §7 boundary: documents larger than this are rejected with `DOC_TOO_LARGE`.
const MAX_DOCUMENT_BYTES: u64 = 50 * 1024 * 1024;

impl DocumentLoader for PlainTextLoader {
    fn supported_extensions(&self) -> &[&'static str] {
        PLAIN_TEXT_EXTENSIONS
    }

    fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let meta = std::fs::metadata(path).map_err(|e| EngineError::DocParse {
            path: path.display().to_string(),
            source: anyhow::anyhow!(e),
        })?;
        if meta.len() > MAX_DOCUMENT_BYTES {
            return Err(EngineError::DocTooLarge { size: meta.len(), limit: MAX_DOCUMENT_BYTES });
        }
        let bytes = std::fs::read(path).map_err(|e| EngineError::DocParse {
            path: path.display().to_string(),
            source: anyhow::anyhow!(e),
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let mut metadata = std::collections::HashMap::new();
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            metadata.insert("title".to_string(), stem.to_string());
        }
        Ok(LoadedDocument { text, metadata })
    }
}

/// Concepts extracted from a single chunk (§6 `extract_concepts`): primary
/// concepts carry the most weight, technical concepts are domain jargon
/// worth indexing even if infrequent, related concepts seed corpus
/// co-occurrence, and categories feed the document's category membership.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExtractedConcepts {
    pub primary: Vec<String>,
    pub technical: Vec<String>,
    pub related: Vec<String>,
    pub categories: Vec<String>,
}

impl ExtractedConcepts {
    /// All concept names this extraction surfaced, deduplicated, in the
    /// order primary > technical > related.
    pub fn all_concept_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for name in self.primary.iter().chain(self.technical.iter()).chain(self.related.iter()) {
            let canon = crate::identity::canonicalize_name(name);
            if !canon.is_empty() && seen.insert(canon.clone()) {
                out.push(canon);
            }
        }
        out
    }
}

/// `LLM Extractor` (§6): concept extraction and document summarization,
/// both wrapped by the resilience envelope at the ingestion call site
/// (this trait itself stays a plain fallible async call; retry/circuit/
/// timeout/bulkhead compose around it, not inside it).
#[async_trait]
pub trait LLMExtractor: Send + Sync {
    async fn extract_concepts(&self, chunk_text: &str) -> Result<ExtractedConcepts>;
    async fn summarize(&self, document_text: &str) -> Result<String>;
}

/// Deterministic, model-free default: extracts concepts via simple
/// frequency-ranked noun-phrase-shaped tokens (capitalized multi-word
/// runs and frequent nouns), and summarizes via a lead-sentences
/// heuristic. Adequate for development/testing and for corpora where no
/// hosted LLM is configured; production deployments plug in a real model
/// behind the same trait.
pub struct HeuristicExtractor {
    max_concepts: usize,
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self { max_concepts: 8 }
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMExtractor for HeuristicExtractor {
    async fn extract_concepts(&self, chunk_text: &str) -> Result<ExtractedConcepts> {
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for word in chunk_text.split_whitespace() {
            let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if cleaned.len() < 4 {
                continue;
            }
            if STOPWORDS.contains(&cleaned.to_lowercase().as_str()) {
                continue;
            }
            *counts.entry(cleaned.to_lowercase()).or_insert(0) += 1;
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let primary: Vec<String> = ranked.iter().take(3).map(|(w, _)| w.clone()).collect();
        let technical: Vec<String> = ranked
            .iter()
            .skip(3)
            .take(self.max_concepts.saturating_sub(3))
            .map(|(w, _)| w.clone())
            .collect();

        Ok(ExtractedConcepts { primary, technical, related: Vec::new(), categories: Vec::new() })
    }

    async fn summarize(&self, document_text: &str) -> Result<String> {
        let summary: String = document_text
            .split(". ")
            .take(3)
            .collect::<Vec<_>>()
            .join(". ");
        Ok(if summary.len() > 500 { summary.chars().take(500).collect() } else { summary })
    }
}

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "been", "were", "their", "which", "about", "into",
    "such", "these", "those", "there", "when", "where", "while", "would", "could", "should",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loader_factory_dispatches_by_extension() {
        let factory = LoaderFactory::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "hello world").unwrap();
        let doc = factory.load(&path).unwrap();
        assert!(doc.text.contains("hello world"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let factory = LoaderFactory::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let err = factory.load(&path).unwrap_err();
        assert_eq!(err.code(), "DOC_UNSUPPORTED_FORMAT");
    }

    #[tokio::test]
    async fn heuristic_extractor_surfaces_frequent_terms() {
        let extractor = HeuristicExtractor::new();
        let extracted = extractor
            .extract_concepts("distributed consensus distributed consensus paxos raft")
            .await
            .unwrap();
        assert!(extracted.primary.contains(&"distributed".to_string()));
    }

    #[test]
    fn all_concept_names_dedup_across_buckets() {
        let extracted = ExtractedConcepts {
            primary: vec!["Paxos".to_string()],
            technical: vec!["paxos".to_string()],
            related: vec!["Raft".to_string()],
            categories: vec![],
        };
        assert_eq!(extracted.all_concept_names(), vec!["paxos".to_string(), "raft".to_string()]);
    }
}
