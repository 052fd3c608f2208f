//! OpenAI embeddings and chat completions.
//!
//! Any server speaking the OpenAI wire format works via `base_url`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use askdocs_core::answer::Generator;
use askdocs_core::embedding::Embedder;
use askdocs_core::{ProviderError, ProviderErrorKind};

use super::{base_url, http_client, json_vector, malformed, post_json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const PROVIDER: &str = "openai";

fn missing_key() -> ProviderError {
    ProviderError::new(
        PROVIDER,
        ProviderErrorKind::Unavailable,
        "OPENAI_API_KEY environment variable not set",
    )
}

/// Embedding provider calling `POST {base_url}/v1/embeddings`.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(model: String, dims: usize, base: Option<String>, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            model,
            dims,
            url: format!("{}/v1/embeddings", base_url(base, DEFAULT_BASE_URL)),
            api_key,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let key = self.api_key.as_ref().ok_or_else(missing_key)?;
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let request = self.client.post(&self.url).bearer_auth(key);
        let response = post_json(PROVIDER, request, &body).await?;
        parse_embeddings(&response)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| malformed(PROVIDER, "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| malformed(PROVIDER, "missing embedding"))?;
        indexed.push((index, json_vector(PROVIDER, embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Chat provider calling `POST {base_url}/v1/chat/completions`.
pub struct OpenAiGenerator {
    model: String,
    url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(
        model: String,
        base: Option<String>,
        api_key: Option<String>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        Ok(Self {
            model,
            url: format!("{}/v1/chat/completions", base_url(base, DEFAULT_BASE_URL)),
            api_key,
            temperature,
            max_tokens,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let key = self.api_key.as_ref().ok_or_else(missing_key)?;
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        });
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = json!(max);
        }
        let request = self.client.post(&self.url).bearer_auth(key);
        let response = post_json(PROVIDER, request, &body).await?;
        response
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| malformed(PROVIDER, "missing choices[0].message.content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn embeddings_request_and_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "text-embedding-3-small",
                "input": ["a", "b"],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": [
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 0, "embedding": [1.0, 0.0]},
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let e = OpenAiEmbedder::new(
            "text-embedding-3-small".into(),
            2,
            Some(server.url()),
            Some("test-key".into()),
        )
        .unwrap();
        let out = e.embed_batch(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_classified() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .create_async()
            .await;

        let e = OpenAiEmbedder::new("m".into(), 2, Some(server.url()), Some("secret-key".into()))
            .unwrap();
        let err = e.embed_batch(&["a".into()]).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_retryable());
        assert!(!err.to_string().contains("secret-key"));
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let e = OpenAiEmbedder::new("m".into(), 2, Some("http://127.0.0.1:9".into()), None).unwrap();
        let err = e.embed_batch(&["a".into()]).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn chat_completion_content() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "the prompt"}],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"choices": [{"message": {"role": "assistant", "content": "An answer."}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let g = OpenAiGenerator::new(
            "gpt-4o-mini".into(),
            Some(server.url()),
            Some("k".into()),
            0.2,
            Some(256),
        )
        .unwrap();
        assert_eq!(g.generate("the prompt").await.unwrap(), "An answer.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_chat_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;
        let g = OpenAiGenerator::new("m".into(), Some(server.url()), Some("k".into()), 0.0, None)
            .unwrap();
        let err = g.generate("p").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Malformed);
    }
}
