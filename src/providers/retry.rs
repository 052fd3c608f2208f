//! Bounded retry with exponential backoff and per-call timeouts.
//!
//! [`Resilient`] wraps any [`Embedder`] or [`Generator`]:
//! - every attempt is bounded by the policy's timeout;
//! - HTTP 429, 5xx and network errors are retried;
//! - other 4xx, malformed responses and unavailable providers fail at once;
//! - a timed-out call is retried once, a second timeout is final.
//!
//! Backoff doubles from `base_delay` (1s by default), capped at 2^5 times it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use askdocs_core::answer::Generator;
use askdocs_core::embedding::Embedder;
use askdocs_core::{ProviderError, ProviderErrorKind};

/// How many times, how long and how far apart to try a provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
            base_delay: Duration::from_secs(1),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }

    /// Run `call` until it succeeds or the policy gives up.
    pub async fn run<T, F, Fut>(&self, provider: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut timeouts = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::new(
                    provider,
                    ProviderErrorKind::Timeout,
                    format!("no response within {}s", self.timeout.as_secs_f32()),
                )),
            };

            let err = match result {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            if err.is_timeout() {
                timeouts += 1;
            }
            let give_up = !err.is_retryable()
                || attempt >= self.max_attempts
                || (err.is_timeout() && timeouts > 1);
            if give_up {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            warn!(
                provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// A provider wrapped with a [`RetryPolicy`].
pub struct Resilient<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> Resilient<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: Embedder> Embedder for Resilient<P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.policy
            .run(self.inner.model_name(), || self.inner.embed_batch(texts))
            .await
    }
}

#[async_trait]
impl<P: Generator> Generator for Resilient<P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.policy
            .run(self.inner.model_name(), || self.inner.generate(prompt))
            .await
    }
}
