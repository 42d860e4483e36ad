//! The five-signal hybrid scorer (§4.6).
//!
//! Grounded in `rag_engine.rs::search_comprehensive`'s candidate-gather/
//! fuse/hydrate shape, but replacing the teacher's two-signal Reciprocal
//! Rank Fusion (`search/hybrid.rs`) with the spec's full five-signal
//! weighted sum: vector, BM25, title, concept-overlap, lexical-overlap.
//! BM25 and title scores are min-max normalized over the candidate set
//! before weighting (raw BM25/title ranges are unbounded/[0,10] and not
//! directly comparable to the already-[0,1] signals); vector, concept,
//! and lexical sub-scores are computed already normalized.

use std::collections::HashSet;

use crate::config::ScoreWeights;
use crate::types::ScoreBreakdown;

/// One candidate's raw per-signal inputs, gathered by a search service
/// before scoring. A candidate missing a signal (e.g. it wasn't found by
/// BM25) passes `None`/empty and contributes 0 for that signal.
#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub id: u32,
    /// Already-normalized [0,1] cosine-like similarity against the
    /// *original* query embedding (query expansion does not touch
    /// vector scoring, §4.6 "Query expansion scope").
    pub vector_score: Option<f32>,
    /// Raw Tantivy BM25 score against the expanded term set, if this
    /// candidate was retrieved by the text-search signal.
    pub bm25_raw: Option<f32>,
    /// Filename/title text, canonicalized (lowercased) by the caller.
    pub title: String,
    /// Full candidate text (chunk text or document summary), used for
    /// the title substring check and the lexical-overlap signal.
    pub text: String,
    pub concept_ids: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub id: u32,
    pub scores: ScoreBreakdown,
}

pub struct HybridScorer;

impl HybridScorer {
    /// Score and rank `candidates`, returning them in descending score
    /// order with the tie-break rule from §4.6 step 4: higher vector sub-
    /// score, then higher (normalized) BM25 sub-score, then lexicographic
    /// id.
    pub fn score(
        candidates: Vec<CandidateInput>,
        original_query_tokens: &[String],
        expanded_concept_ids: &HashSet<u32>,
        lexical_terms: &[String],
        weights: ScoreWeights,
    ) -> Vec<ScoredCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let title_raw: Vec<f32> = candidates
            .iter()
            .map(|c| title_score(&c.title, original_query_tokens))
            .collect();
        let bm25_raw: Vec<f32> = candidates.iter().map(|c| c.bm25_raw.unwrap_or(0.0)).collect();

        let title_norm = min_max_normalize(&title_raw);
        let bm25_norm = min_max_normalize(&bm25_raw);

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let vector = c.vector_score.unwrap_or(0.0).clamp(0.0, 1.0);
                let bm25 = bm25_norm[i];
                let title = title_norm[i];
                let concept = concept_overlap_score(&c.concept_ids, expanded_concept_ids);
                let lexical = lexical_overlap_score(&c.text, lexical_terms);

                let total = weights.vector * vector
                    + weights.bm25 * bm25
                    + weights.title * title
                    + weights.concept * concept
                    + weights.lexical * lexical;

                ScoredCandidate {
                    id: c.id,
                    scores: ScoreBreakdown {
                        vector,
                        bm25,
                        title,
                        concept,
                        lexical,
                        total,
                    },
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.scores
                .total
                .partial_cmp(&a.scores.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.scores
                        .vector
                        .partial_cmp(&a.scores.vector)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    b.scores
                        .bm25
                        .partial_cmp(&a.scores.bm25)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });

        scored
    }

    pub fn top_n(candidates: Vec<CandidateInput>, original_query_tokens: &[String], expanded_concept_ids: &HashSet<u32>, lexical_terms: &[String], weights: ScoreWeights, n: usize) -> Vec<ScoredCandidate> {
        let mut scored = Self::score(candidates, original_query_tokens, expanded_concept_ids, lexical_terms, weights);
        scored.truncate(n);
        scored
    }
}

/// Min-max normalize a slice to [0,1]. When every value is tied (a
/// degenerate candidate set of one, or identical raw scores), all
/// non-zero ties map to 1.0 so they still register as a positive signal
/// rather than collapsing to 0.
fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range.abs() < 1e-9 {
        return values.iter().map(|&v| if v > 0.0 { 1.0 } else { 0.0 }).collect();
    }
    values.iter().map(|&v| (v - min) / range).collect()
}

/// Title signal (§4.6: range [0,10] before normalization): exact
/// full-query match scores the maximum; otherwise each original token
/// found as a substring of the canonicalized title contributes 2.0,
/// capped at 10.0.
fn title_score(title: &str, original_query_tokens: &[String]) -> f32 {
    let title_lc = title.to_lowercase();
    if original_query_tokens.is_empty() {
        return 0.0;
    }
    let full_query = original_query_tokens.join(" ");
    if !full_query.is_empty() && title_lc.contains(&full_query) {
        return 10.0;
    }
    let hits = original_query_tokens
        .iter()
        .filter(|t| !t.contains(' ') && title_lc.contains(t.as_str()))
        .count();
    (hits as f32 * 2.0).min(10.0)
}

/// Concept-overlap signal (§4.6): the share of the expanded concept set
/// present on this candidate, already in [0,1].
fn concept_overlap_score(candidate_concepts: &[u32], expanded: &HashSet<u32>) -> f32 {
    if expanded.is_empty() {
        return 0.0;
    }
    let overlap = candidate_concepts.iter().filter(|c| expanded.contains(c)).count();
    (overlap as f32 / expanded.len() as f32).min(1.0)
}

/// Lexical-overlap signal (§4.6): the share of lexical-expansion-origin
/// terms found (as a substring) in the candidate's text, already in
/// [0,1].
fn lexical_overlap_score(text: &str, lexical_terms: &[String]) -> f32 {
    if lexical_terms.is_empty() {
        return 0.0;
    }
    let text_lc = text.to_lowercase();
    let hits = lexical_terms.iter().filter(|t| text_lc.contains(t.as_str())).count();
    (hits as f32 / lexical_terms.len() as f32).min(1.0)
}
