//! Filesystem-backed Stage Cache (§4.10, §5 ordering guarantees): one JSON
//! file per content hash under `<dataRoot>/stage_cache/`, written with a
//! tmp-file-then-rename so a crash mid-write never leaves a corrupt or
//! half-written entry behind. This is the durable checkpoint that makes
//! ingestion resumption skip completed documents without re-issuing LLM
//! calls — the write here precedes any store mutation for the document.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::external::ExtractedConcepts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedChunk {
    pub index: usize,
    pub text: String,
    pub byte_start: usize,
    pub byte_end: usize,
    pub concepts: ExtractedConcepts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedDocument {
    pub content_hash: String,
    pub source_path: String,
    pub summary: String,
    pub chunks: Vec<StagedChunk>,
    pub staged_at_unix_secs: u64,
}

pub struct StageCache {
    dir: PathBuf,
    ttl: Duration,
}

impl StageCache {
    /// Opens (creating if absent) the stage cache directory and sweeps
    /// any entries older than `ttl` (§5: "a TTL cleanup sweep runs on
    /// orchestrator start").
    pub fn open(dir: &Path, ttl: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| EngineError::wrapped("create stage cache dir", anyhow::anyhow!(e)))?;
        let cache = Self { dir: dir.to_path_buf(), ttl };
        cache.sweep_expired()?;
        Ok(cache)
    }

    pub fn with_default_ttl(dir: &Path) -> Result<Self> {
        Self::open(dir, Duration::from_secs(7 * 24 * 60 * 60))
    }

    fn path_for(&self, content_hash: &str) -> PathBuf {
        self.dir.join(format!("{content_hash}.json"))
    }

    pub fn get(&self, content_hash: &str) -> Result<Option<StagedDocument>> {
        let path = self.path_for(content_hash);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::wrapped("read stage cache entry", anyhow::anyhow!(e)))?;
        let staged: StagedDocument = serde_json::from_str(&raw)
            .map_err(|e| EngineError::wrapped("parse stage cache entry", anyhow::anyhow!(e)))?;
        if self.is_expired(&staged) {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(staged))
    }

    /// Atomic tmp+rename write so readers never observe a partial file.
    pub fn put(&self, staged: &StagedDocument) -> Result<()> {
        let path = self.path_for(&staged.content_hash);
        let tmp_path = self.dir.join(format!("{}.tmp.{}", staged.content_hash, std::process::id()));
        let body = serde_json::to_vec_pretty(staged)
            .map_err(|e| EngineError::wrapped("serialize stage cache entry", anyhow::anyhow!(e)))?;
        std::fs::write(&tmp_path, body)
            .map_err(|e| EngineError::wrapped("write stage cache tmp file", anyhow::anyhow!(e)))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| EngineError::wrapped("rename stage cache tmp file", anyhow::anyhow!(e)))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir)
            .map_err(|e| EngineError::wrapped("list stage cache dir", anyhow::anyhow!(e)))?
        {
            let entry = entry.map_err(|e| EngineError::wrapped("read stage cache dir entry", anyhow::anyhow!(e)))?;
            let _ = std::fs::remove_file(entry.path());
        }
        Ok(())
    }

    fn is_expired(&self, staged: &StagedDocument) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(staged.staged_at_unix_secs) > self.ttl.as_secs()
    }

    fn sweep_expired(&self) -> Result<()> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(raw) = std::fs::read_to_string(&path) {
                if let Ok(staged) = serde_json::from_str::<StagedDocument>(&raw) {
                    if self.is_expired(&staged) {
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(hash: &str, staged_at: u64) -> StagedDocument {
        StagedDocument {
            content_hash: hash.to_string(),
            source_path: "/docs/a.md".to_string(),
            summary: "a summary".to_string(),
            chunks: vec![],
            staged_at_unix_secs: staged_at,
        }
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        cache.put(&staged("abc123", unix_now_secs())).unwrap();
        let loaded = cache.get("abc123").unwrap().unwrap();
        assert_eq!(loaded.summary, "a summary");
    }

    #[test]
    fn missing_entry_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        assert!(cache.get("nope").unwrap().is_none());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path(), Duration::from_secs(1)).unwrap();
        cache.put(&staged("old", 0)).unwrap();
        assert!(cache.get("old").unwrap().is_none());
    }

    #[test]
    fn sweep_on_open_removes_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = StageCache::open(dir.path(), Duration::from_secs(1_000_000)).unwrap();
            cache.put(&staged("stale", 0)).unwrap();
        }
        let cache = StageCache::open(dir.path(), Duration::from_secs(1)).unwrap();
        assert!(cache.get("stale").unwrap().is_none());
    }
}
