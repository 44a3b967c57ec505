//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use recall::config::EmbeddingConfig;
//! # use recall::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Input longer than `max_input_chars` is cut on a char boundary before it
//! is sent.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use recall_core::assemble::truncate_chars;

use crate::config::EmbeddingConfig;
use crate::error::{ProviderError, RecallError, Result};

/// Turns text into a fixed-length vector.
///
/// Implementations report failures as [`RecallError::Provider`]; callers
/// decide whether a failure skips one item or fails the request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text, truncated to `max_input_chars` characters.
    async fn embed(&self, text: &str, max_input_chars: usize) -> Result<Vec<f32>>;
}

/// Build the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => Err(RecallError::config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str, _max_input_chars: usize) -> Result<Vec<f32>> {
        Err(ProviderError::Disabled.into())
    }
}

// ============ OpenAI Provider ============

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `model` or `dims` is not set in
    /// config, or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RecallError::config("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| RecallError::config("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RecallError::config("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            api_key,
            client: build_client(config)?,
            retry: RetryPolicy::from_config(config),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, max_input_chars: usize) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": truncate_chars(text, max_input_chars),
        });

        let json = self
            .retry
            .run("OpenAI", || {
                self.client
                    .post(OPENAI_EMBEDDINGS_URL)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&body)
            })
            .await?;

        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing data[0].embedding".to_string())
        })?;
    parse_vector(embedding)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RecallError::config("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| RecallError::config("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            client: build_client(config)?,
            retry: RetryPolicy::from_config(config),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, max_input_chars: usize) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [truncate_chars(text, max_input_chars)],
        });
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));

        let json = self
            .retry
            .run("Ollama", || {
                self.client
                    .post(&endpoint)
                    .header("Content-Type", "application/json")
                    .json(&body)
            })
            .await?;

        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| ProviderError::InvalidResponse("missing embeddings[0]".to_string()))?;
    parse_vector(embedding)
}

// ============ Shared HTTP plumbing ============

fn build_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| RecallError::config(format!("Failed to build HTTP client: {}", e)))
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>> {
    let values = value
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("embedding is not an array".to_string()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                RecallError::from(ProviderError::InvalidResponse(
                    "embedding contains a non-number".to_string(),
                ))
            })
        })
        .collect()
}

/// Outer bound for one embedding call, retries included.
///
/// `timeout_secs` bounds each HTTP request; callers that wrap
/// [`EmbeddingProvider::embed`] in their own timeout use this so the retry
/// schedule is never cut short.
pub fn call_budget(config: &EmbeddingConfig) -> Duration {
    RetryPolicy::from_config(config).budget()
}

/// Retry loop shared by the HTTP providers.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    timeout_secs: u64,
}

impl RetryPolicy {
    fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Delay before attempt `attempt` (1-based for retries).
    fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(1 << (attempt - 1).min(5))
    }

    /// Worst case for [`RetryPolicy::run`]: every attempt times out and
    /// every backoff is slept.
    fn budget(&self) -> Duration {
        let requests = Duration::from_secs(self.timeout_secs) * (self.max_retries + 1);
        let backoffs: Duration = (1..=self.max_retries).map(Self::backoff).sum();
        requests + backoffs
    }

    /// Send the request built by `make_request` until it succeeds, fails
    /// with a non-retryable status, or retries run out.
    async fn run<F>(&self, service: &str, make_request: F) -> Result<serde_json::Value>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Self::backoff(attempt)).await;
            }

            match make_request().send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            RecallError::from(ProviderError::InvalidResponse(format!(
                                "{} response: {}",
                                service, e
                            )))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = ProviderError::Api {
                        status_code: status.as_u16(),
                        message: format!("{} API error: {}", service, body_text),
                    };

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::debug!(service, attempt, status = status.as_u16(), "retrying embedding request");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err.into());
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(ProviderError::Timeout(self.timeout_secs));
                }
                Err(e) => {
                    last_err = Some(ProviderError::Network(format!("{}: {}", service, e)));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                ProviderError::Network(format!("{} embedding failed after retries", service))
            })
            .into())
    }
}
