//! Core data models used throughout askdocs.
//!
//! These types represent the uploads, chunks, stored records and answers
//! that flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single uploaded file, before extraction.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
    /// Random id shared by every chunk produced from this upload.
    pub upload_id: String,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            uploaded_at: Utc::now(),
            upload_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A contiguous text segment of an extracted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Source filename, used for attribution.
    pub source: String,
    /// Position in the document's chunk sequence, starting at 0.
    pub chunk_index: i64,
    /// Offset of the first character of `text` in the extracted text,
    /// counted in characters.
    pub start_offset: i64,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    #[serde(default)]
    pub upload_id: Option<String>,
    /// Unix timestamp of the upload this chunk came from (0 if unknown).
    #[serde(default)]
    pub uploaded_at: i64,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Attach upload provenance to the chunk.
    pub fn with_upload(mut self, doc: &UploadedDocument) -> Self {
        self.upload_id = Some(doc.upload_id.clone());
        self.uploaded_at = doc.uploaded_at.timestamp();
        self
    }
}

/// A chunk paired with its embedding vector, as persisted by a store.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by a similarity query, with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Attribution entry for a chunk cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub filename: String,
    pub score: f32,
    pub start_offset: i64,
    pub chunk_index: i64,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(sc: &ScoredChunk) -> Self {
        Self {
            filename: sc.chunk.source.clone(),
            score: sc.score,
            start_offset: sc.chunk.start_offset,
            chunk_index: sc.chunk.chunk_index,
        }
    }
}

/// Per-source summary, as listed by management commands.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub filename: String,
    pub chunk_count: i64,
    /// Unix timestamp of the most recent upload of this source.
    pub last_uploaded_at: Option<i64>,
}

/// Aggregate counts for a store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub document_count: i64,
    pub chunk_count: i64,
    pub dims: Option<usize>,
    pub model: Option<String>,
}
