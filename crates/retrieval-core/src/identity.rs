//! Deterministic identifiers and content hashing.
//!
//! `hash_id` is the single source of truth for every `id` column in the
//! data model (§3): catalog rows hash their source path verbatim, concept
//! and category rows hash their lowercased, trimmed name. Collisions are
//! possible (birthday bound around ~65k distinct strings) and are handled
//! at the repository boundary, not here — this module only guarantees the
//! hash is a total, pure function of its canonical input.

use sha2::{Digest, Sha256};

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// FNV-1a over the UTF-8 bytes of `s`. Callers are responsible for
/// canonicalizing `s` first (lowercase + trim for concepts/categories,
/// left verbatim for catalog source paths) — `hash_id` itself does not
/// canonicalize, so that identical canonicalization logic lives in one
/// place per entity kind rather than being silently baked into hashing.
pub fn hash_id(s: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Canonicalize a concept or category name: lowercase, trim whitespace,
/// collapse interior whitespace runs to a single space.
pub fn canonicalize_name(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `id = hash_id(canonicalize_name(name))`, the identifier used for
/// Concept and Category rows.
pub fn concept_id(name: &str) -> u32 {
    hash_id(&canonicalize_name(name))
}

/// `id = hash_id(path)`, the identifier used for Catalog rows. Source
/// paths are left verbatim — canonicalizing them (lowercasing, say) would
/// make case-sensitive filesystems resolve two distinct files to the same
/// id.
pub fn catalog_id(source_path: &str) -> u32 {
    hash_id(source_path)
}

/// SHA-256 of `bytes`, as a lowercase hex string. Used for catalog/chunk
/// content deduplication and the ingestion stage cache key.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
