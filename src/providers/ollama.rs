//! Ollama embeddings (`/api/embed`) and chat (`/api/chat`).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use askdocs_core::answer::Generator;
use askdocs_core::embedding::Embedder;
use askdocs_core::ProviderError;

use super::{base_url, http_client, json_vector, malformed, post_json};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const PROVIDER: &str = "ollama";

/// Embedding provider backed by a local Ollama instance.
///
/// Requires an embedding model to be pulled (`ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(model: String, dims: usize, base: Option<String>) -> Result<Self> {
        Ok(Self {
            model,
            dims,
            url: format!("{}/api/embed", base_url(base, DEFAULT_BASE_URL)),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let response = post_json(PROVIDER, self.client.post(&self.url), &body).await?;
        parse_embeddings(&response)
    }
}

fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed(PROVIDER, "missing embeddings array"))?
        .iter()
        .map(|v| json_vector(PROVIDER, v))
        .collect()
}

/// Chat provider backed by a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(model: String, base: Option<String>, temperature: f32) -> Result<Self> {
        Ok(Self {
            model,
            url: format!("{}/api/chat", base_url(base, DEFAULT_BASE_URL)),
            temperature,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "options": {"temperature": self.temperature},
        });
        let response = post_json(PROVIDER, self.client.post(&self.url), &body).await?;
        response
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| malformed(PROVIDER, "missing message.content"))
    }
}
