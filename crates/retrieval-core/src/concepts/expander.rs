//! Query expansion (§4.5): turns a raw query string into a weighted term
//! set drawn 70% from the corpus concept index and 30% from the static
//! lexical network, plus the original tokens at weight 1.0.
//!
//! Grounded in the teacher's `rag/query_rewriter.rs` (tokenize-then-enrich
//! shape) and `rag/query_decomposer.rs` (concurrent sub-query gathering),
//! generalized here to a single flat weighted term set instead of
//! rewritten query strings.

use std::collections::{HashMap, HashSet};

use crate::storage::ConceptRepository;

use super::lexical::LexicalNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOrigin {
    Original,
    Corpus,
    Lexical,
}

#[derive(Debug, Clone)]
pub struct ExpandedTerm {
    pub term: String,
    pub weight: f32,
    pub origin: TermOrigin,
}

/// Result of expanding one query: the deduplicated weighted term set plus
/// the two side-channels the hybrid scorer consumes directly — the
/// expanded concept id set (Concept signal) and the lexical-origin terms
/// (Lexical signal). Vector search intentionally does not consume this at
/// all; it scores against the original query embedding (§4.6).
#[derive(Debug, Clone, Default)]
pub struct ExpandedQuery {
    pub original_tokens: Vec<String>,
    pub terms: Vec<ExpandedTerm>,
    pub concept_ids: HashSet<u32>,
    pub lexical_terms: Vec<String>,
}

impl ExpandedQuery {
    /// The BM25 signal's query string: every surviving term, space-joined,
    /// weight-agnostic (Tantivy's own BM25 handles term frequency).
    pub fn bm25_query_string(&self) -> String {
        self.terms
            .iter()
            .map(|t| t.term.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const CORPUS_WEIGHT: f32 = 0.7;
const LEXICAL_WEIGHT: f32 = 0.3;
const ORIGINAL_WEIGHT: f32 = 1.0;

pub struct QueryExpander<'a> {
    concepts: &'a dyn ConceptRepository,
    lexical: &'a dyn LexicalNetwork,
    /// Minimum relevance score a lexical-origin expansion must clear to
    /// survive the "technical-context filter" (§9 Open Question).
    /// Resolved in DESIGN.md: corpus-origin terms are already
    /// domain-validated by virtue of having co-occurred in the corpus, so
    /// the filter applies only to lexical-network terms. The score is a
    /// length-normalized heuristic (`min(len / 8, 1.0)`) combined with a
    /// flat stopword reject — a transformer-free gate per the spec's
    /// "implementation-neutral" note, chosen over a semantic-distance
    /// score since the lexical network itself is the trusted source of
    /// relatedness here, not the raw string.
    relevance_threshold: f32,
}

impl<'a> QueryExpander<'a> {
    pub fn new(concepts: &'a dyn ConceptRepository, lexical: &'a dyn LexicalNetwork, relevance_threshold: f32) -> Self {
        Self {
            concepts,
            lexical,
            relevance_threshold,
        }
    }

    /// Tokenize `query` into lowercase unigrams and adjacent bigrams.
    pub fn tokenize(query: &str) -> Vec<String> {
        let unigrams: Vec<String> = query
            .split_whitespace()
            .map(|t| {
                t.chars()
                    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect();

        let mut tokens = unigrams.clone();
        for window in unigrams.windows(2) {
            tokens.push(format!("{} {}", window[0], window[1]));
        }
        tokens
    }

    /// Run the five-step expansion algorithm. Corpus and lexical lookups
    /// proceed concurrently per token (§4.5: "corpus and lexical lookups
    /// proceed concurrently").
    pub async fn expand(&self, query: &str) -> ExpandedQuery {
        let tokens = Self::tokenize(query);

        let mut candidates: HashMap<String, (f32, TermOrigin)> = HashMap::new();
        let mut concept_ids: HashSet<u32> = HashSet::new();
        let mut lexical_terms: Vec<String> = Vec::new();

        for token in &tokens {
            Self::upsert_max(&mut candidates, token.clone(), ORIGINAL_WEIGHT, TermOrigin::Original);
        }

        for token in &tokens {
            let (corpus_terms, lexical_entry) =
                tokio::join!(self.corpus_expansion(token), async { self.lexical.lookup(token) });

            if let Some((related_ids, synonym_terms)) = corpus_terms {
                concept_ids.extend(related_ids);
                for term in synonym_terms {
                    Self::upsert_max(&mut candidates, term, CORPUS_WEIGHT, TermOrigin::Corpus);
                }
            }

            for term in lexical_entry
                .synonyms
                .iter()
                .chain(lexical_entry.hypernyms.iter())
                .chain(lexical_entry.hyponyms.iter())
            {
                lexical_terms.push(term.clone());
                Self::upsert_max(&mut candidates, term.clone(), LEXICAL_WEIGHT, TermOrigin::Lexical);
            }
        }

        let terms = candidates
            .into_iter()
            .filter(|(term, (_, origin))| {
                *origin != TermOrigin::Lexical || self.passes_relevance_filter(term)
            })
            .map(|(term, (weight, origin))| ExpandedTerm { term, weight, origin })
            .collect();

        ExpandedQuery {
            original_tokens: tokens,
            terms,
            concept_ids,
            lexical_terms,
        }
    }

    /// Corpus expansion (§4.5 step 2): look up `token` as a concept name,
    /// returning its corpus-related concept ids plus its own normalized
    /// synonym strings, or `None` if the token isn't a known concept.
    async fn corpus_expansion(&self, token: &str) -> Option<(Vec<u32>, Vec<String>)> {
        let concept = self.concepts.find_by_name(token).await.ok().flatten()?;
        Some((concept.related_concept_ids.clone(), concept.synonyms.clone()))
    }

    fn upsert_max(map: &mut HashMap<String, (f32, TermOrigin)>, term: String, weight: f32, origin: TermOrigin) {
        map.entry(term)
            .and_modify(|(existing_weight, existing_origin)| {
                if weight > *existing_weight {
                    *existing_weight = weight;
                    *existing_origin = origin;
                }
            })
            .or_insert((weight, origin));
    }

    /// The technical-context filter (§9 Open Question), applied only to
    /// lexical-network terms (corpus terms are pre-validated by
    /// co-occurrence). Rejects common stopwords outright, then requires
    /// the length-normalized score to clear `relevance_threshold`.
    fn passes_relevance_filter(&self, term: &str) -> bool {
        if STOPWORDS.contains(&term) {
            return false;
        }
        let score = (term.len() as f32 / 8.0).min(1.0);
        score >= self.relevance_threshold
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "of", "in", "on", "at", "to", "for", "and", "or", "it", "be",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::lexical::StaticLexicalNetwork;
    use crate::types::ConceptRow;
    use async_trait::async_trait;

    struct FakeConceptRepo(Vec<ConceptRow>);

    #[async_trait]
    impl ConceptRepository for FakeConceptRepo {
        async fn find_by_id(&self, id: u32) -> crate::error::Result<ConceptRow> {
            self.find_by_id_opt(id).await?.ok_or_else(|| crate::error::EngineError::RecordNotFound {
                entity: "concept",
                id: id.to_string(),
            })
        }
        async fn find_by_id_opt(&self, id: u32) -> crate::error::Result<Option<ConceptRow>> {
            Ok(self.0.iter().find(|c| c.id == id).cloned())
        }
        async fn find_by_name(&self, name: &str) -> crate::error::Result<Option<ConceptRow>> {
            Ok(self.0.iter().find(|c| c.name == name).cloned())
        }
        async fn search_similar(&self, _v: &[f32], _k: usize) -> crate::error::Result<Vec<(ConceptRow, f32)>> {
            Ok(vec![])
        }
        async fn get_all(&self) -> crate::error::Result<Vec<ConceptRow>> {
            Ok(self.0.clone())
        }
        async fn upsert_many(&self, _rows: Vec<ConceptRow>) -> crate::error::Result<()> {
            Ok(())
        }
        async fn count(&self) -> crate::error::Result<usize> {
            Ok(self.0.len())
        }
    }

    fn concept(id: u32, name: &str, related: Vec<u32>, synonyms: Vec<&str>) -> ConceptRow {
        ConceptRow {
            id,
            name: name.to_string(),
            summary: String::new(),
            catalog_ids: vec![],
            related_concept_ids: related,
            synonyms: synonyms.into_iter().map(String::from).collect(),
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 1.0,
            vector: vec![],
        }
    }

    #[tokio::test]
    async fn original_tokens_always_kept_at_weight_one() {
        let repo = FakeConceptRepo(vec![]);
        let lexical = StaticLexicalNetwork::new();
        let expander = QueryExpander::new(&repo, &lexical, 0.15);
        let expanded = expander.expand("consensus algorithms").await;
        let original: Vec<_> = expanded
            .terms
            .iter()
            .filter(|t| t.origin == TermOrigin::Original)
            .collect();
        assert!(original.iter().any(|t| t.term == "consensus"));
        assert!(original.iter().any(|t| t.term == "algorithms"));
        assert!(original.iter().all(|t| t.weight == 1.0));
    }

    #[tokio::test]
    async fn expansion_multiplier_meets_s3_scenario_floor() {
        let repo = FakeConceptRepo(vec![concept(1, "consensus", vec![2], vec!["paxos"])]);
        let lexical = StaticLexicalNetwork::new();
        let expander = QueryExpander::new(&repo, &lexical, 0.15);
        let expanded = expander.expand("consensus algorithms").await;
        // 2 original tokens + bigram + corpus/lexical enrichment clears 6.
        assert!(expanded.terms.len() >= 6, "got {} terms", expanded.terms.len());
        assert!(expanded.terms.iter().any(|t| t.term == "agreement"));
    }

    #[tokio::test]
    async fn corpus_hit_contributes_related_concept_ids() {
        let repo = FakeConceptRepo(vec![concept(1, "consensus", vec![42], vec![])]);
        let lexical = StaticLexicalNetwork::new();
        let expander = QueryExpander::new(&repo, &lexical, 0.15);
        let expanded = expander.expand("consensus").await;
        assert!(expanded.concept_ids.contains(&42));
    }

    #[tokio::test]
    async fn dedup_keeps_max_weight_per_term() {
        // "algorithm" is both a lexical synonym of "algorithm" overlap and
        // possibly an original token; ensure weight 1.0 always wins.
        let repo = FakeConceptRepo(vec![]);
        let lexical = StaticLexicalNetwork::new();
        let expander = QueryExpander::new(&repo, &lexical, 0.15);
        let expanded = expander.expand("algorithm").await;
        let algo_term = expanded.terms.iter().find(|t| t.term == "algorithm").unwrap();
        assert_eq!(algo_term.weight, 1.0);
    }

    #[tokio::test]
    async fn short_lexical_terms_are_filtered_by_relevance_gate() {
        let repo = FakeConceptRepo(vec![]);
        let lexical = StaticLexicalNetwork::new();
        // Threshold of 0.9 requires length >= 7.2 chars, so the 3-char
        // lexical hyponym "zab" is dropped while the original survives.
        let expander = QueryExpander::new(&repo, &lexical, 0.9);
        let expanded = expander.expand("consensus").await;
        assert!(expanded.terms.iter().any(|t| t.term == "consensus"));
        assert!(!expanded.terms.iter().any(|t| t.term == "zab"));
    }
}
