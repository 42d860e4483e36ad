//! Tantivy-backed BM25 text index (§4.6: "BM25 is sourced from Tantivy's
//! own BM25 ranking... grounded in `search/text_search.rs`'s
//! `QueryParser`/`TopDocs`"). One instance per logical table (catalog
//! summaries, chunk text) since each needs its own schema/segment files;
//! `u32` row ids are stored as indexed strings so `TermQuery`/`delete_term`
//! keep working the way the teacher's `TextSearch` relies on.

use std::path::Path;

use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{self, Schema, Value as TantivyValue, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::error::{EngineError, Result};

pub struct TextIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: schema::Field,
    text_field: schema::Field,
    title_field: schema::Field,
    source_field: schema::Field,
}

impl TextIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::wrapped("create tantivy dir", anyhow::anyhow!(e)))?;

        let mut sb = Schema::builder();
        let id_field = sb.add_text_field("id", STRING | STORED);
        let text_field = sb.add_text_field("text", TEXT | STORED);
        let title_field = sb.add_text_field("title", TEXT | STORED);
        let source_field = sb.add_text_field("source", TEXT | STORED);
        let schema = sb.build();

        let index = {
            let mmap = tantivy::directory::MmapDirectory::open(dir)?;
            if Index::exists(&mmap)? {
                Index::open_in_dir(dir)?
            } else {
                Index::create_in_dir(dir, schema)?
            }
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let writer = index.writer(50_000_000)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            text_field,
            title_field,
            source_field,
        })
    }

    pub fn index_row(&self, id: u32, text: &str, title: &str, source: &str) -> Result<()> {
        let writer = self.writer.lock();
        writer.add_document(doc!(
            self.id_field => id.to_string(),
            self.text_field => text,
            self.title_field => title,
            self.source_field => source,
        ))?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// BM25 top-`k` candidates for `query` over text+title, optionally
    /// restricted to rows whose `source` field contains `source_filter`
    /// (chunk-in-source search's pre-filter).
    pub fn search(&self, query: &str, k: usize, source_filter: Option<&str>) -> Result<Vec<(u32, f32)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field, self.title_field]);
        let parsed = parser.parse_query(query).or_else(|_| {
            let fallback = QueryParser::for_index(&self.index, vec![self.text_field]);
            fallback.parse_query(&format!("\"{}\"", query.replace('"', "")))
        })?;

        let fetch_limit = if source_filter.is_some() { k * 3 } else { k }.max(1);
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(fetch_limit))?;

        let mut out = Vec::with_capacity(k);
        for (score, addr) in top_docs {
            let Ok(document) = searcher.doc::<TantivyDocument>(addr) else { continue };
            if let Some(filter) = source_filter {
                let source = document
                    .get_first(self.source_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if !source.contains(filter) {
                    continue;
                }
            }
            if let Some(id_text) = document.get_first(self.id_field).and_then(|v| v.as_str()) {
                if let Ok(id) = id_text.parse::<u32>() {
                    out.push((id, score));
                    if out.len() >= k {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn delete_by_id(&self, id: u32) -> Result<()> {
        let writer = self.writer.lock();
        let term = tantivy::Term::from_field_text(self.id_field, &id.to_string());
        writer.delete_term(term);
        Ok(())
    }

    /// Deletes every row whose `source` field exactly matches `source`,
    /// used before re-indexing a document's chunks on re-ingestion.
    pub fn delete_by_source(&self, source: &str) -> Result<()> {
        self.reader.reload().ok();
        let searcher = self.reader.searcher();
        let mut writer = self.writer.lock();
        let mut deleted = 0usize;
        for segment in searcher.segment_readers() {
            let store = segment.get_store_reader(64)?;
            for doc_id in 0..segment.max_doc() {
                if segment.is_deleted(doc_id) {
                    continue;
                }
                let Ok(document) = store.get::<TantivyDocument>(doc_id) else { continue };
                let matches = document
                    .get_first(self.source_field)
                    .and_then(|v| v.as_str())
                    .map(|s| s == source)
                    .unwrap_or(false);
                if matches {
                    if let Some(id_text) = document.get_first(self.id_field).and_then(|v| v.as_str()) {
                        writer.delete_term(tantivy::Term::from_field_text(self.id_field, id_text));
                        deleted += 1;
                    }
                }
            }
        }
        if deleted > 0 {
            writer.commit()?;
            self.reader.reload()?;
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.reader.searcher().num_docs() as usize)
    }
}
