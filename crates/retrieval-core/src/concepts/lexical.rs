//! Static lexical network bridge (§4.5, §6 "Lexical Network Bridge").
//!
//! The real bridge to a WordNet-like data source is an out-of-core
//! collaborator; this module ships the trait plus one bundled
//! implementation backed by a small in-memory synonym/hypernym/hyponym
//! table covering the technical vocabulary the corpus scenarios exercise
//! (S3: "consensus" -> "agreement", "protocol"). Per-lemma results are
//! cached in a bounded no-TTL map since the underlying data never changes
//! for a fixed process lifetime (teacher pattern: `e5.rs`'s query cache).

use std::collections::HashMap;

use crate::cache::BoundedCache;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalEntry {
    pub synonyms: Vec<String>,
    pub hypernyms: Vec<String>,
    pub hyponyms: Vec<String>,
}

impl LexicalEntry {
    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty() && self.hypernyms.is_empty() && self.hyponyms.is_empty()
    }
}

/// Bridge contract to an offline lexical data source (synonym/hypernym/
/// hyponym lookup by lemma). Implementations are expected to be
/// deterministic and side-effect free; callers cache results themselves.
pub trait LexicalNetwork: Send + Sync {
    fn lookup(&self, lemma: &str) -> LexicalEntry;
}

/// Bundled lemma table plus a bounded, unbounded-TTL lookup cache (§4.5:
/// "its per-lemma query results are cached in a separate bounded map
/// without TTL, since the input is stable").
pub struct StaticLexicalNetwork {
    table: HashMap<&'static str, LexicalEntry>,
    cache: BoundedCache<String, LexicalEntry>,
}

impl StaticLexicalNetwork {
    pub fn new() -> Self {
        Self::with_cache_capacity(5_000)
    }

    pub fn with_cache_capacity(cache_capacity: usize) -> Self {
        Self {
            table: builtin_table(),
            cache: BoundedCache::new(cache_capacity),
        }
    }

    pub fn cache_metrics(&self) -> crate::cache::CacheMetricsSnapshot {
        self.cache.metrics()
    }
}

impl Default for StaticLexicalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalNetwork for StaticLexicalNetwork {
    fn lookup(&self, lemma: &str) -> LexicalEntry {
        let lemma = lemma.trim().to_lowercase();
        if let Some(cached) = self.cache.get(&lemma) {
            return cached;
        }
        let entry = self.table.get(lemma.as_str()).cloned().unwrap_or_default();
        self.cache.put(lemma, entry.clone());
        entry
    }
}

/// A small, hand-curated table standing in for the real bridge. Entries
/// are chosen to cover the scenario vocabulary (distributed systems,
/// machine learning) rather than attempt general-purpose coverage.
fn builtin_table() -> HashMap<&'static str, LexicalEntry> {
    let mut t: HashMap<&'static str, LexicalEntry> = HashMap::new();

    t.insert(
        "consensus",
        LexicalEntry {
            synonyms: vec!["agreement".into(), "accord".into()],
            hypernyms: vec!["protocol".into(), "coordination".into()],
            hyponyms: vec!["paxos".into(), "raft".into(), "zab".into()],
        },
    );
    t.insert(
        "algorithm",
        LexicalEntry {
            synonyms: vec!["procedure".into(), "method".into()],
            hypernyms: vec!["process".into()],
            hyponyms: vec!["heuristic".into(), "protocol".into()],
        },
    );
    t.insert(
        "distributed",
        LexicalEntry {
            synonyms: vec!["decentralized".into()],
            hypernyms: vec!["networked".into()],
            hyponyms: vec!["replicated".into(), "partitioned".into()],
        },
    );
    t.insert(
        "innovation",
        LexicalEntry {
            synonyms: vec!["invention".into(), "novelty".into()],
            hypernyms: vec!["change".into()],
            hyponyms: vec!["breakthrough".into(), "disruption".into()],
        },
    );
    t.insert(
        "system",
        LexicalEntry {
            synonyms: vec!["framework".into()],
            hypernyms: vec!["structure".into()],
            hyponyms: vec!["subsystem".into(), "component".into()],
        },
    );
    t.insert(
        "concept",
        LexicalEntry {
            synonyms: vec!["idea".into(), "notion".into()],
            hypernyms: vec!["abstraction".into()],
            hyponyms: vec![],
        },
    );
    t.insert(
        "learning",
        LexicalEntry {
            synonyms: vec!["training".into()],
            hypernyms: vec!["cognition".into()],
            hyponyms: vec!["supervised learning".into(), "reinforcement learning".into()],
        },
    );
    t.insert(
        "network",
        LexicalEntry {
            synonyms: vec!["graph".into(), "mesh".into()],
            hypernyms: vec!["structure".into()],
            hyponyms: vec!["neural network".into()],
        },
    );

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_lemma_returns_curated_entry() {
        let net = StaticLexicalNetwork::new();
        let entry = net.lookup("consensus");
        assert!(entry.synonyms.contains(&"agreement".to_string()));
        assert!(entry.hyponyms.contains(&"paxos".to_string()));
    }

    #[test]
    fn unknown_lemma_returns_empty() {
        let net = StaticLexicalNetwork::new();
        assert!(net.lookup("zzznotaword").is_empty());
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let net = StaticLexicalNetwork::new();
        assert_eq!(net.lookup("Consensus "), net.lookup("consensus"));
    }

    #[test]
    fn repeated_lookup_is_served_from_cache() {
        let net = StaticLexicalNetwork::new();
        net.lookup("consensus");
        net.lookup("consensus");
        assert_eq!(net.cache_metrics().hits, 1);
    }
}
