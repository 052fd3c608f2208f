//! Retrieval and answer assembly.
//!
//! The read path of the pipeline: embed a question, pull the most relevant
//! chunks from a [`VectorStore`], build a bounded context and ask a
//! [`Generator`] to answer from it, returning the answer together with the
//! chunks it was grounded on.
//!
//! When no chunk clears the relevance threshold the generator is not
//! called at all and an ungrounded [`Answer`] carrying
//! [`NO_CONTEXT_MESSAGE`] is returned.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::{embed_texts, Embedder};
use crate::error::{ProviderError, RagError, Result};
use crate::models::{ScoredChunk, SourceRef};
use crate::store::VectorStore;

/// Separator placed between chunk texts in the prompt context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Prompt sent to the generative model. `{context}` and `{question}` are
/// substituted by [`format_prompt`].
pub const PROMPT_TEMPLATE: &str = "Answer the question based only on the following context:\n\n{context}\n\n---\n\nAnswer the question based on the above context: {question}";

/// Answer text returned when nothing relevant was retrieved.
pub const NO_CONTEXT_MESSAGE: &str =
    "Unable to find matching results. Please try rephrasing your question or upload more documents.";

/// Trait for generative (chat/completion) providers.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError>;
}

/// Knobs for the read path.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub score_threshold: f32,
    pub max_context_chars: usize,
    /// Per-call timeout of the embedding provider, reported in `Timeout`
    /// errors from the question embedding.
    pub embed_timeout: Duration,
    /// Per-call timeout of the generative provider.
    pub generate_timeout: Duration,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: 0.7,
            max_context_chars: 6000,
            embed_timeout: Duration::from_secs(30),
            generate_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of answering a question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Chunks that entered the context, in retrieval order.
    pub sources: Vec<SourceRef>,
    /// `false` when no relevant context was found and the generator was
    /// never called.
    pub grounded: bool,
}

impl Answer {
    pub fn no_context() -> Self {
        Self {
            answer: NO_CONTEXT_MESSAGE.to_string(),
            sources: Vec::new(),
            grounded: false,
        }
    }
}

/// Embed `query` and return up to `k` stored chunks scoring at least
/// `score_threshold`, best first.
pub async fn retrieve(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
    score_threshold: f32,
    call_timeout: Duration,
) -> Result<Vec<ScoredChunk>> {
    if query.trim().is_empty() {
        return Err(RagError::InvalidInput("question must not be empty".into()));
    }
    let mut vectors = embed_texts(embedder, &[query.to_string()], 1, call_timeout).await?;
    let vector = vectors
        .pop()
        .ok_or_else(|| RagError::Storage("embedder returned no vector".into()))?;
    let hits = store.query(&vector, k, score_threshold).await?;
    debug!(k, score_threshold, hits = hits.len(), "retrieved chunks");
    Ok(hits)
}

/// Join chunk texts with [`CONTEXT_SEPARATOR`] within `max_chars`
/// characters.
///
/// The first chunk is truncated if it alone exceeds the budget. Any later
/// chunk that does not fit (with its separator) is dropped together with
/// all chunks after it. Returns the context and how many chunks it uses.
pub fn build_context(chunks: &[ScoredChunk], max_chars: usize) -> (String, usize) {
    let sep_len = CONTEXT_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut used_chars = 0usize;
    let mut used = 0usize;

    for (i, sc) in chunks.iter().enumerate() {
        let len = sc.chunk.char_len();
        if i == 0 {
            if len > max_chars {
                context.extend(sc.chunk.text.chars().take(max_chars));
                return (context, 1);
            }
            context.push_str(&sc.chunk.text);
            used_chars = len;
        } else {
            if used_chars + sep_len + len > max_chars {
                break;
            }
            context.push_str(CONTEXT_SEPARATOR);
            context.push_str(&sc.chunk.text);
            used_chars += sep_len + len;
        }
        used += 1;
    }

    (context, used)
}

/// Substitute context and question into [`PROMPT_TEMPLATE`].
pub fn format_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Answer `question` from the contents of `store`.
///
/// # Errors
///
/// - `InvalidInput` for a blank question.
/// - `EmbeddingService` / `Timeout` when embedding the question fails.
/// - `Generation` (carrying the would-be sources) or `Timeout` when the
///   generator fails.
/// - Store errors from the query.
pub async fn answer_question(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    settings: &RetrievalSettings,
    question: &str,
) -> Result<Answer> {
    let hits = retrieve(
        store,
        embedder,
        question,
        settings.top_k,
        settings.score_threshold,
        settings.embed_timeout,
    )
    .await?;

    if hits.is_empty() {
        info!("no chunk met the relevance threshold");
        return Ok(Answer::no_context());
    }

    let (context, used) = build_context(&hits, settings.max_context_chars);
    let sources: Vec<SourceRef> = hits[..used].iter().map(SourceRef::from).collect();
    let prompt = format_prompt(&context, question.trim());

    match generator.generate(&prompt).await {
        Ok(answer) => {
            info!(
                model = generator.model_name(),
                sources = sources.len(),
                context_chars = context.chars().count(),
                "answered question"
            );
            Ok(Answer {
                answer,
                sources,
                grounded: true,
            })
        }
        Err(e) => {
            warn!(error = %e, "generation failed");
            Err(e.into_generation_error(sources, settings.generate_timeout))
        }
    }
}
