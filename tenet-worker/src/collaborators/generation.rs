//! Content generation collaborator
//!
//! `generate(prompt, timeout) -> text`. Responses are expected to be JSON but
//! are never trusted; parsing and grounding happen in the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::pipeline::prompts::Task;

const BASE_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation rate limited")]
    RateLimited,

    #[error("generation service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("generation transport error: {0}")]
    Transport(String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Timeouts, 429, 5xx and transport errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Transport(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Trait implemented by every generation backend
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generates text for a prompt
    ///
    /// # Arguments
    /// * `prompt` - Full prompt text
    /// * `timeout` - Upper bound for each call to the backend
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError>;
}

/// Gemini-style `generateContent` backend over HTTP
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl HttpGenerator {
    /// Creates a new HTTP generator
    ///
    /// # Arguments
    /// * `base_url` - Service base URL (e.g., "https://generativelanguage.googleapis.com")
    /// * `config` - Model, key and retry settings
    pub fn new(base_url: String, config: &GenerationConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
        }
    }

    async fn call_once(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }));
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(timeout)
            } else {
                GenerationError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(timeout)
            } else {
                GenerationError::InvalidResponse(e.to_string())
            }
        })?;

        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GenerationError::InvalidResponse("response has no candidate text".into()))
    }
}

#[async_trait]
impl ContentGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let mut attempt = 1;

        loop {
            match self.call_once(prompt, timeout).await {
                Ok(text) => {
                    tracing::debug!(
                        "Generation succeeded on attempt {} ({} chars)",
                        attempt,
                        text.len()
                    );
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        "Generation failed with retryable error (attempt {}/{}), retrying after {:?}: {}",
                        attempt,
                        self.max_retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Generation failed after {} attempt(s): {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

/// `base * 2^(attempt-1)` plus up to `base` of jitter
fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BASE_RETRY_DELAY_MS.saturating_mul(1 << (attempt - 1).min(10));
    let jitter = rand::rng().random_range(0..BASE_RETRY_DELAY_MS);
    Duration::from_millis(exponential + jitter)
}

/// Deterministic backend used when no generation service is configured
///
/// Answers by task marker and cites segment 0 wherever a citation is expected.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubGenerator;

impl StubGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentGenerator for StubGenerator {
    async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, GenerationError> {
        let response = match Task::detect(prompt) {
            Some(Task::Classify) => json!({ "document_type": "UNKNOWN", "confidence": 0.5 }),
            Some(Task::Risk) => json!({ "detected": false, "items": [] }),
            Some(Task::Summary) => json!({
                "bullets": [
                    { "text": "The document sets out terms between the parties.", "chunk_ids": [0] }
                ]
            }),
            Some(Task::Obligations) => json!({
                "obligations": [
                    { "text": "The parties must follow the stated terms.", "severity": "medium", "chunk_ids": [0] }
                ],
                "restrictions": [],
                "termination_triggers": []
            }),
            Some(Task::Answer) => json!({
                "answer": "The cited passage addresses this question.",
                "chunk_ids": [0],
                "is_grounded": true
            }),
            None => json!({}),
        };

        Ok(response.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::prompts;

    #[test]
    fn test_retryable_errors() {
        assert!(GenerationError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GenerationError::RateLimited.is_retryable());
        assert!(
            GenerationError::Upstream {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !GenerationError::Upstream {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!GenerationError::InvalidResponse("x".into()).is_retryable());
    }

    #[test]
    fn test_backoff_grows_with_jitter() {
        for attempt in 1..=3 {
            let delay = backoff_delay(attempt).as_millis() as u64;
            let floor = BASE_RETRY_DELAY_MS << (attempt - 1);
            assert!(delay >= floor && delay < floor + BASE_RETRY_DELAY_MS);
        }
    }

    #[tokio::test]
    async fn test_stub_answers_by_task() {
        let stub = StubGenerator::new();
        let timeout = Duration::from_secs(1);

        let summary = stub.generate(&prompts::summary(&[]), timeout).await.unwrap();
        let value: Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(value["bullets"][0]["chunk_ids"][0], 0);

        let risk = stub
            .generate(
                &prompts::risk(tenet_core::domain::report::RiskCategory::Financial, &[]),
                timeout,
            )
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&risk).unwrap();
        assert_eq!(value["detected"], false);

        assert_eq!(stub.generate("no marker", timeout).await.unwrap(), "{}");
    }
}
