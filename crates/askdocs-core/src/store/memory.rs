//! In-memory [`VectorStore`] implementation for tests.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over all stored vectors.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, EmbeddingRecord, ScoredChunk, SourceSummary, StoreStats};

use super::{check_dims, rank, SourceWrite, VectorStore, WriteOutcome};

#[derive(Default)]
struct Inner {
    records: Vec<EmbeddingRecord>,
    dims: Option<usize>,
    model: Option<String>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert(&self, records: &[EmbeddingRecord], model: &str) -> Result<()> {
        let mut inner = self.write()?;
        let dims = check_dims(inner.dims, records)?;
        if records.is_empty() {
            return Ok(());
        }
        inner.dims = dims;
        inner.model.get_or_insert_with(|| model.to_string());
        inner.records.extend_from_slice(records);
        Ok(())
    }

    async fn write_source(
        &self,
        filename: &str,
        records: &[EmbeddingRecord],
        model: &str,
        mode: SourceWrite,
    ) -> Result<WriteOutcome> {
        let mut inner = self.write()?;
        let exists = inner.records.iter().any(|r| r.chunk.source == filename);
        if exists && mode == SourceWrite::SkipExisting {
            return Ok(WriteOutcome::Skipped);
        }
        let dims = check_dims(inner.dims, records)?;

        let mut replaced = 0;
        if exists && mode == SourceWrite::Replace {
            let before = inner.records.len();
            inner.records.retain(|r| r.chunk.source != filename);
            replaced = (before - inner.records.len()) as u64;
            if inner.records.is_empty() {
                *inner = Inner::default();
            }
        }
        if !records.is_empty() {
            inner.dims = dims;
            inner.model.get_or_insert_with(|| model.to_string());
            inner.records.extend_from_slice(records);
        }
        Ok(WriteOutcome::Written { replaced })
    }

    async fn query(&self, vector: &[f32], k: usize, score_threshold: f32) -> Result<Vec<ScoredChunk>> {
        let inner = self.read()?;
        match inner.dims {
            None => return Ok(Vec::new()),
            Some(d) if d != vector.len() => {
                return Err(RagError::DimensionMismatch {
                    expected: d,
                    actual: vector.len(),
                })
            }
            Some(_) => {}
        }
        let scored = inner
            .records
            .iter()
            .map(|r| ScoredChunk {
                chunk: r.chunk.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .filter(|sc| sc.score >= score_threshold)
            .collect();
        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.records.len() as u64)
    }

    async fn clear(&self) -> Result<u64> {
        let mut inner = self.write()?;
        let removed = inner.records.len() as u64;
        *inner = Inner::default();
        Ok(removed)
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let inner = self.read()?;
        let mut out: Vec<SourceSummary> = Vec::new();
        for r in &inner.records {
            let ts = Some(r.chunk.uploaded_at).filter(|t| *t > 0);
            match out.iter_mut().find(|s| s.filename == r.chunk.source) {
                Some(s) => {
                    s.chunk_count += 1;
                    s.last_uploaded_at = s.last_uploaded_at.max(ts);
                }
                None => out.push(SourceSummary {
                    filename: r.chunk.source.clone(),
                    chunk_count: 1,
                    last_uploaded_at: ts,
                }),
            }
        }
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(out)
    }

    async fn search_text(&self, term: &str, limit: usize) -> Result<Vec<Chunk>> {
        let needle = term.to_lowercase();
        if needle.trim().is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.chunk.text.to_lowercase().contains(&needle))
            .take(limit)
            .map(|r| r.chunk.clone())
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        let mut sources: Vec<&str> = inner.records.iter().map(|r| r.chunk.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        Ok(StoreStats {
            document_count: sources.len() as i64,
            chunk_count: inner.records.len() as i64,
            dims: inner.dims,
            model: inner.model.clone(),
        })
    }

    async fn has_source(&self, filename: &str) -> Result<bool> {
        Ok(self.read()?.records.iter().any(|r| r.chunk.source == filename))
    }

    async fn delete_source(&self, filename: &str) -> Result<u64> {
        let mut inner = self.write()?;
        let before = inner.records.len();
        inner.records.retain(|r| r.chunk.source != filename);
        let removed = (before - inner.records.len()) as u64;
        if inner.records.is_empty() {
            *inner = Inner::default();
        }
        Ok(removed)
    }

    async fn dims(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dims)
    }
}
