//! Embedding and generation providers.
//!
//! Concrete implementations of the core [`Embedder`] and [`Generator`]
//! traits:
//! - **OpenAI**: `POST /v1/embeddings` and `POST /v1/chat/completions`.
//! - **Ollama**: `POST /api/embed` and `POST /api/chat` on a local instance.
//! - **Hashing**: offline, deterministic feature-hashing embedder.
//! - **Disabled**: every call fails as unavailable.
//!
//! Network providers make exactly one HTTP request per call. Retries,
//! backoff and per-call timeouts are added by wrapping them in
//! [`retry::Resilient`], which [`create_embedder`] and [`create_generator`]
//! always do.
//!
//! API keys are read from the environment (`OPENAI_API_KEY`) and never
//! appear in errors or logs.

pub mod hashing;
pub mod ollama;
pub mod openai;
pub mod retry;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use askdocs_core::answer::Generator;
use askdocs_core::embedding::Embedder;
use askdocs_core::{ProviderError, ProviderErrorKind};

use crate::config::{EmbeddingConfig, GenerationConfig};
use retry::{Resilient, RetryPolicy};

/// Longest provider error body kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Build the embedder selected by `config`, wrapped with retry/timeout.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let policy = RetryPolicy::new(config.max_retries, config.timeout());
    let model = config.model_or_default();
    let dims = config.dims_or_default();

    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "openai" => Arc::new(Resilient::new(
            openai::OpenAiEmbedder::new(model, dims, config.base_url.clone(), openai_key())?,
            policy,
        )),
        "ollama" => Arc::new(Resilient::new(
            ollama::OllamaEmbedder::new(model, dims, config.base_url.clone())?,
            policy,
        )),
        "hashing" => Arc::new(hashing::HashingEmbedder::new(dims)),
        "disabled" => Arc::new(DisabledEmbedder),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    };
    Ok(embedder)
}

/// Build the generator selected by `config`, wrapped with retry/timeout.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let policy = RetryPolicy::new(config.max_retries, config.timeout());
    let model = config.model_or_default();

    let generator: Arc<dyn Generator> = match config.provider.as_str() {
        "openai" => Arc::new(Resilient::new(
            openai::OpenAiGenerator::new(
                model,
                config.base_url.clone(),
                openai_key(),
                config.temperature,
                config.max_tokens,
            )?,
            policy,
        )),
        "ollama" => Arc::new(Resilient::new(
            ollama::OllamaGenerator::new(model, config.base_url.clone(), config.temperature)?,
            policy,
        )),
        "disabled" => Arc::new(DisabledGenerator),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    };
    Ok(generator)
}

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

// ============ Shared HTTP plumbing ============

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("askdocs/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// POST `body` as JSON and return the parsed JSON response, classifying
/// every failure as a [`ProviderError`].
async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> std::result::Result<serde_json::Value, ProviderError> {
    let response = request.json(body).send().await.map_err(|e| {
        let kind = if e.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Network
        };
        ProviderError::new(provider, kind, format!("request failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let text: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::Status(status.as_u16()),
            format!("API error {status}: {text}"),
        ));
    }

    response.json().await.map_err(|e| {
        ProviderError::new(
            provider,
            ProviderErrorKind::Malformed,
            format!("invalid JSON response: {e}"),
        )
    })
}

fn malformed(provider: &str, what: &str) -> ProviderError {
    ProviderError::new(
        provider,
        ProviderErrorKind::Malformed,
        format!("invalid response: {what}"),
    )
}

/// Read a JSON array of numbers as a vector.
fn json_vector(provider: &str, value: &serde_json::Value) -> std::result::Result<Vec<f32>, ProviderError> {
    value
        .as_array()
        .ok_or_else(|| malformed(provider, "embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| malformed(provider, "embedding contains a non-number"))
        })
        .collect()
}

fn base_url(configured: Option<String>, default: &str) -> String {
    configured
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

// ============ Disabled ============

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::new(
            "disabled",
            ProviderErrorKind::Unavailable,
            "embedding provider is disabled; set [embedding].provider",
        ))
    }
}

/// Generator used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, ProviderError> {
        Err(ProviderError::new(
            "disabled",
            ProviderErrorKind::Unavailable,
            "generation provider is disabled; set [generation].provider",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_providers_are_unavailable() {
        let err = DisabledEmbedder.embed_batch(&["x".into()]).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
        assert!(!err.is_retryable());
        let err = DisabledGenerator.generate("x").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
    }

    #[test]
    fn factory_selects_by_name() {
        let cfg = EmbeddingConfig {
            provider: "hashing".into(),
            ..Default::default()
        };
        let e = create_embedder(&cfg).unwrap();
        assert_eq!(e.model_name(), "hashing-v1");
        assert_eq!(e.dims(), 256);

        let cfg = GenerationConfig {
            provider: "disabled".into(),
            ..Default::default()
        };
        assert_eq!(create_generator(&cfg).unwrap().model_name(), "disabled");

        let cfg = EmbeddingConfig {
            provider: "nope".into(),
            ..Default::default()
        };
        assert!(create_embedder(&cfg).is_err());
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        assert_eq!(base_url(Some("http://x/".into()), "d"), "http://x");
        assert_eq!(base_url(None, "http://d"), "http://d");
    }
}
