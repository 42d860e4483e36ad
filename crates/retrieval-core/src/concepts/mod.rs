//! Concept index and query expansion (§4.5).

pub mod expander;
pub mod index;
pub mod lexical;

pub use expander::{ExpandedTerm, QueryExpander};
pub use index::ConceptIndex;
pub use lexical::{LexicalEntry, LexicalNetwork, StaticLexicalNetwork};
