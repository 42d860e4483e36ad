//! Storage abstraction (§4.2): repository traits plus the centralized
//! filter builder and the LanceDB-backed implementations.

pub mod filter;
pub mod lance;
pub mod repo;

pub use lance::{connect_all, AllRepositories};
pub use repo::{CatalogRepository, CategoryRepository, CategorySort, ChunkRepository, ConceptRepository};
