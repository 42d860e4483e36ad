//! Hybrid scorer (§4.6): fuses five per-candidate signals into one
//! ranked list with attached sub-scores for transparency.

pub mod hybrid;

pub use hybrid::{CandidateInput, HybridScorer, ScoredCandidate};
