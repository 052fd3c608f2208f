//! Embedding provider trait, batched embedding and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! [`embed_texts`] which drives a provider batch by batch, and pure helper
//! functions for vector serialization and similarity computation.
//!
//! Concrete providers (OpenAI, Ollama, hashing) and the retry/timeout
//! wrapper live in the `askdocs` app crate.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorKind, Result};

/// Default number of texts sent to the provider per request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;
}

/// Embed `texts` in batches of `batch_size`.
///
/// The first failing batch aborts the whole call with
/// [`RagError::EmbeddingService`](crate::RagError::EmbeddingService) naming
/// the index range of that batch (or `Timeout` when the provider timed out).
/// A response with the wrong number of vectors or the wrong dimensionality
/// counts as a malformed response.
pub async fn embed_texts(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    call_timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(texts.len());

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        let start = batch_no * batch_size;
        let indices = start..start + batch.len();

        let result = embedder
            .embed_batch(batch)
            .await
            .and_then(|vectors| check_batch(embedder, batch.len(), vectors));

        match result {
            Ok(vectors) => {
                debug!(
                    model = embedder.model_name(),
                    start = indices.start,
                    end = indices.end,
                    "embedded batch"
                );
                out.extend(vectors);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    start = indices.start,
                    end = indices.end,
                    "embedding batch failed"
                );
                return Err(e.into_embedding_error(indices, call_timeout));
            }
        }
    }

    Ok(out)
}

fn check_batch(
    embedder: &dyn Embedder,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    if vectors.len() != expected {
        return Err(ProviderError::new(
            embedder.model_name(),
            ProviderErrorKind::Malformed,
            format!("expected {} vectors, got {}", expected, vectors.len()),
        ));
    }
    let dims = embedder.dims();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(ProviderError::new(
            embedder.model_name(),
            ProviderErrorKind::Malformed,
            format!("expected {}-d vectors, got {}-d", dims, bad.len()),
        ));
    }
    Ok(vectors)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use askdocs_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
