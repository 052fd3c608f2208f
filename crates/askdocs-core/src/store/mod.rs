//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines every storage operation the ingest,
//! retrieval and management paths need, so backends are interchangeable
//! (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! # Dimensionality
//!
//! A store holds vectors of a single dimensionality, fixed by the first
//! insert and forgotten on [`clear`](VectorStore::clear). Inserting or
//! querying with any other length fails with
//! [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch).

pub mod memory;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::{Chunk, EmbeddingRecord, ScoredChunk, SourceSummary, StoreStats};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorStore::insert) | Persist embedding records |
/// | [`query`](VectorStore::query) | Top-k cosine similarity search above a threshold |
/// | [`count`](VectorStore::count) | Number of stored records |
/// | [`clear`](VectorStore::clear) | Remove everything |
/// | [`list_sources`](VectorStore::list_sources) | Distinct sources with chunk counts |
/// | [`search_text`](VectorStore::search_text) | Case-insensitive substring search |
/// | [`stats`](VectorStore::stats) | Aggregate counts |
/// | [`write_source`](VectorStore::write_source) | Store one document under a duplicate policy, atomically |
/// | [`has_source`](VectorStore::has_source) / [`delete_source`](VectorStore::delete_source) | Duplicate handling |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist records produced by `model`. All-or-nothing.
    ///
    /// The same chunk inserted twice is stored twice; duplicate handling
    /// is the caller's job.
    async fn insert(&self, records: &[EmbeddingRecord], model: &str) -> Result<()>;

    /// Store the records of one document, treating chunks already stored
    /// under `filename` according to `mode`.
    ///
    /// The existence check, any removal and the insert happen as one write:
    /// concurrent writers of the same source are serialized, and a failure
    /// (including a dimension mismatch) leaves the earlier copy untouched.
    async fn write_source(
        &self,
        filename: &str,
        records: &[EmbeddingRecord],
        model: &str,
        mode: SourceWrite,
    ) -> Result<WriteOutcome>;

    /// Up to `k` chunks ordered by descending cosine similarity, excluding
    /// any scoring below `score_threshold`.
    async fn query(&self, vector: &[f32], k: usize, score_threshold: f32) -> Result<Vec<ScoredChunk>>;

    async fn count(&self) -> Result<u64>;

    /// Remove all records and the recorded dimensionality. Returns the
    /// number of records removed.
    async fn clear(&self) -> Result<u64>;

    async fn list_sources(&self) -> Result<Vec<SourceSummary>>;

    async fn search_text(&self, term: &str, limit: usize) -> Result<Vec<Chunk>>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn has_source(&self, filename: &str) -> Result<bool>;

    /// Remove every chunk of `filename`. Returns the number removed.
    /// Removing the last chunk also forgets the dimensionality.
    async fn delete_source(&self, filename: &str) -> Result<u64>;

    /// Dimensionality fixed by the first insert, `None` while empty.
    async fn dims(&self) -> Result<Option<usize>>;
}

/// How [`VectorStore::write_source`] treats an existing copy of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceWrite {
    /// Remove the old chunks in the same write as the insert.
    Replace,
    /// Leave the old chunks and write nothing.
    SkipExisting,
    /// Keep the old chunks next to the new ones.
    Append,
}

/// Result of [`VectorStore::write_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Records were stored; `replaced` chunks of an earlier copy were removed.
    Written { replaced: u64 },
    /// The source already existed under [`SourceWrite::SkipExisting`].
    Skipped,
}

/// Check that every record in `records` has the same length, matching
/// `fixed` when the store already has one. Returns the batch dimensionality.
pub fn check_dims(fixed: Option<usize>, records: &[EmbeddingRecord]) -> Result<Option<usize>> {
    let Some(first) = records.first() else {
        return Ok(fixed);
    };
    let expected = fixed.unwrap_or(first.vector.len());
    for r in records {
        if r.vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: r.vector.len(),
            });
        }
    }
    Ok(Some(expected))
}

/// Sort scored chunks by descending score and keep the best `k`.
pub fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
