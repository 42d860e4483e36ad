//! In-memory concept co-occurrence index, rebuilt from the full chunk
//! corpus after every ingestion batch (§4.5, §5 "concept-index rebuild is
//! a single logical pass").
//!
//! Grounded on the teacher's `graph::KnowledgeGraph`
//! (`graph/knowledge_graph.rs`): same `petgraph::DiGraph` + name-to-node
//! map shape, generalized from document entities linked by extraction
//! relationships to concepts linked by corpus co-occurrence (two concepts
//! sharing a chunk), and `get_related_doc_ids`'s BFS becomes
//! `related_concepts`'s BFS over concept ids instead of document ids.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};

use crate::types::ChunkRow;

#[derive(Debug, Clone, Default)]
pub struct ConceptOccurrence {
    pub concept_id: u32,
    pub chunk_count: u32,
    pub catalog_ids: HashSet<u32>,
}

/// Snapshot the concept index can be atomically swapped to: the spec
/// requires readers never observe a partially-rebuilt index, so the
/// rebuild is assembled off to the side and only installed once complete
/// (see [`ConceptIndex::rebuild`]).
pub struct ConceptIndex {
    graph: UnGraph<u32, u32>,
    id_to_node: HashMap<u32, NodeIndex>,
    occurrences: HashMap<u32, ConceptOccurrence>,
}

impl ConceptIndex {
    pub fn empty() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            id_to_node: HashMap::new(),
            occurrences: HashMap::new(),
        }
    }

    /// Rebuild from scratch over every chunk in the corpus (not just new
    /// ones), so cross-document counts stay exact. Returns the new index;
    /// callers install it with a single pointer swap (e.g. behind an
    /// `ArcSwap` or a write-locked `Arc`) so concurrent readers see either
    /// the old or new snapshot, never an in-progress one.
    pub fn rebuild(chunks: &[ChunkRow]) -> Self {
        let mut index = Self::empty();

        for chunk in chunks {
            for &concept_id in &chunk.concept_ids {
                let entry = index.occurrences.entry(concept_id).or_default();
                entry.concept_id = concept_id;
                entry.chunk_count += 1;
                entry.catalog_ids.insert(chunk.catalog_id);
                index.node_for(concept_id);
            }

            // Co-occurrence: every pair of concepts sharing this chunk
            // gets (or strengthens) an edge, mirroring the teacher's
            // `add_relationship` call made once per extracted pair.
            for i in 0..chunk.concept_ids.len() {
                for j in (i + 1)..chunk.concept_ids.len() {
                    index.add_cooccurrence(chunk.concept_ids[i], chunk.concept_ids[j]);
                }
            }
        }

        index
    }

    fn node_for(&mut self, concept_id: u32) -> NodeIndex {
        if let Some(&idx) = self.id_to_node.get(&concept_id) {
            return idx;
        }
        let idx = self.graph.add_node(concept_id);
        self.id_to_node.insert(concept_id, idx);
        idx
    }

    fn add_cooccurrence(&mut self, a: u32, b: u32) {
        let a_idx = self.node_for(a);
        let b_idx = self.node_for(b);
        if let Some(edge) = self.graph.find_edge(a_idx, b_idx) {
            if let Some(weight) = self.graph.edge_weight_mut(edge) {
                *weight += 1;
            }
        } else {
            self.graph.add_edge(a_idx, b_idx, 1);
        }
    }

    pub fn occurrence(&self, concept_id: u32) -> Option<&ConceptOccurrence> {
        self.occurrences.get(&concept_id)
    }

    /// Normalized corpus-frequency weight in [0, 1]: this concept's chunk
    /// count divided by the most frequent concept's chunk count.
    pub fn weight(&self, concept_id: u32) -> f32 {
        let max_count = self.occurrences.values().map(|o| o.chunk_count).max().unwrap_or(1);
        self.occurrences
            .get(&concept_id)
            .map(|o| o.chunk_count as f32 / max_count.max(1) as f32)
            .unwrap_or(0.0)
    }

    /// Concepts co-occurring with `concept_id` within `max_hops`, ranked
    /// by edge weight (co-occurrence frequency) at each hop.
    pub fn related_concepts(&self, concept_id: u32, max_hops: usize, limit: usize) -> Vec<u32> {
        let Some(&start) = self.id_to_node.get(&concept_id) else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut related = Vec::new();

        queue.push_back((start, 0usize));
        visited.insert(start);

        while let Some((node, depth)) = queue.pop_front() {
            if node != start {
                related.push(*self.graph.node_weight(node).unwrap());
            }
            if depth >= max_hops {
                continue;
            }
            let mut neighbors: Vec<_> = self
                .graph
                .neighbors(node)
                .filter(|n| !visited.contains(n))
                .collect();
            neighbors.sort_by_key(|n| {
                let edge = self.graph.find_edge(node, *n).unwrap();
                std::cmp::Reverse(*self.graph.edge_weight(edge).unwrap())
            });
            for neighbor in neighbors {
                visited.insert(neighbor);
                queue.push_back((neighbor, depth + 1));
            }
        }

        related.truncate(limit);
        related
    }

    pub fn concept_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Every concept id present in this snapshot, in no particular order.
    /// Used by the ingestion orchestrator's batch rebuild to enumerate
    /// which `ConceptRow`s need a fresh `weight`/`related_concept_ids`.
    pub fn all_concept_ids(&self) -> Vec<u32> {
        self.occurrences.keys().copied().collect()
    }
}
