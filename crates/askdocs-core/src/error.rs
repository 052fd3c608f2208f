//! Error taxonomy for the ingestion and question-answering pipeline.
//!
//! Every failure that can reach a caller is a [`RagError`]. Each variant
//! knows which pipeline [`Stage`] it came from and, where it makes sense,
//! which file it concerns, so the CLI and HTTP layers can report it without
//! inspecting message strings.
//!
//! Provider implementations report the lower-level [`ProviderError`]; the
//! pipeline converts it into [`RagError::EmbeddingService`],
//! [`RagError::Generation`] or [`RagError::Timeout`] once it knows the batch
//! or stage involved.

use std::fmt;
use std::ops::Range;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::SourceRef;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Extract,
    Chunk,
    Embed,
    Store,
    Retrieve,
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Upload => "upload",
            Stage::Extract => "extract",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Store => "store",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Unrecognized file type whose plain-text fallback decode also failed.
    #[error("unsupported format for '{filename}': not decodable as {}", .attempted.join(" or "))]
    UnsupportedFormat {
        filename: String,
        attempted: Vec<String>,
    },

    /// A loader failed on a recognized type (corrupted PDF, broken ZIP, ...).
    #[error("failed to extract text from '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Upload exceeds the configured size cap.
    #[error("'{filename}' is {size} bytes, over the {limit} byte upload limit")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    /// The embedding provider failed for a batch of inputs.
    #[error("embedding failed for inputs {}..{}{}: {message}", .indices.start, .indices.end, fmt_status(.status))]
    EmbeddingService {
        indices: Range<usize>,
        status: Option<u16>,
        message: String,
    },

    /// The generative provider failed. `sources` holds the chunks that would
    /// have been used, so callers can still show them.
    #[error("answer generation failed{}: {message}", fmt_status(.status))]
    Generation {
        status: Option<u16>,
        message: String,
        sources: Vec<SourceRef>,
    },

    /// An external call exceeded its time bound (after the allowed retry).
    #[error("{stage} call timed out after {}s", .after.as_secs_f32())]
    Timeout { stage: Stage, after: Duration },

    /// Local vector store I/O failure.
    #[error("vector store error: {0}")]
    Storage(String),

    /// Vectors of a different dimensionality than the store already holds.
    #[error("embedding dimension mismatch: store holds {expected}-d vectors, got {actual}-d (run `askdocs clear` and re-ingest after switching models)")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Caller supplied something unusable (blank question, bad parameter).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Provider or pipeline misconfiguration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl RagError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            RagError::UnsupportedFormat { .. } | RagError::Extraction { .. } => Stage::Extract,
            RagError::FileTooLarge { .. } | RagError::InvalidInput(_) => Stage::Upload,
            RagError::EmbeddingService { .. } => Stage::Embed,
            RagError::Generation { .. } => Stage::Generate,
            RagError::Timeout { stage, .. } => *stage,
            RagError::Storage(_) | RagError::DimensionMismatch { .. } => Stage::Store,
            RagError::Config(_) => Stage::Retrieve,
        }
    }

    /// The file this error concerns, if any.
    pub fn filename(&self) -> Option<&str> {
        match self {
            RagError::UnsupportedFormat { filename, .. }
            | RagError::Extraction { filename, .. }
            | RagError::FileTooLarge { filename, .. } => Some(filename),
            _ => None,
        }
    }

    /// Shorthand for a [`RagError::Storage`] from any displayable error.
    pub fn storage(err: impl fmt::Display) -> Self {
        RagError::Storage(err.to_string())
    }
}

/// Convenience result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The provider answered with a non-success HTTP status.
    Status(u16),
    /// The call exceeded its time bound.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// The response arrived but could not be understood.
    Malformed,
    /// The provider is not usable as configured (missing key, disabled).
    Unavailable,
}

/// Error returned by embedding and generation providers.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// HTTP-style status, when the provider returned one.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ProviderErrorKind::Status(s) => Some(s),
            _ => None,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// 429, 5xx, network failures and timeouts are transient; other 4xx,
    /// malformed responses and unavailable providers are not.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Status(s) => s == 429 || (500..600).contains(&s),
            ProviderErrorKind::Timeout | ProviderErrorKind::Network => true,
            ProviderErrorKind::Malformed | ProviderErrorKind::Unavailable => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ProviderErrorKind::Timeout
    }

    /// Convert into the pipeline error for a failed embedding batch.
    pub fn into_embedding_error(self, indices: Range<usize>, timeout: Duration) -> RagError {
        match self.kind {
            ProviderErrorKind::Timeout => RagError::Timeout {
                stage: Stage::Embed,
                after: timeout,
            },
            ProviderErrorKind::Unavailable => RagError::Config(self.to_string()),
            _ => RagError::EmbeddingService {
                indices,
                status: self.status(),
                message: self.to_string(),
            },
        }
    }

    /// Convert into the pipeline error for a failed generation call.
    pub fn into_generation_error(self, sources: Vec<SourceRef>, timeout: Duration) -> RagError {
        match self.kind {
            ProviderErrorKind::Timeout => RagError::Timeout {
                stage: Stage::Generate,
                after: timeout,
            },
            _ => RagError::Generation {
                status: self.status(),
                message: self.to_string(),
                sources,
            },
        }
    }
}
