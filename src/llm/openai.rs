//! OpenAI-compatible HTTP clients for chat completions and embeddings.
//!
//! Works against any endpoint speaking the `/v1/chat/completions` and
//! `/v1/embeddings` wire format (OpenAI, OpenRouter, vLLM, llama.cpp server).
//!
//! ```no_run
//! use topicforge::llm::{OpenAiCompletionClient, OpenAiConfig, TokenPricing};
//! use topicforge_search::Tier;
//!
//! let config = OpenAiConfig::new("sk-...", "gpt-4o-mini")
//!     .with_tier(Tier::Paid)
//!     .with_pricing(TokenPricing::new(0.15, 0.60));
//! let client = OpenAiCompletionClient::new(config)?;
//! # Ok::<(), topicforge::llm::LlmError>(())
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use topicforge_search::error::is_rate_limit_text;
use topicforge_search::Tier;

use super::error::LlmError;
use super::usage::{TokenPricing, TokenUsage};
use super::{Completion, CompletionClient, CompletionRequest, ModelDescriptor};
use crate::embedding::{EmbeddingClient, Embeddings};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token. Never logged.
    pub api_key: String,
    /// Base URL without the `/v1` suffix.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Client-side request deadline.
    pub timeout: Duration,
    /// Free or paid, for cost accounting.
    pub tier: Tier,
    /// Token pricing, for cost accounting.
    pub pricing: TokenPricing,
    /// Identifier in cost records; defaults to `openai:<model>`.
    pub id: Option<String>,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

impl OpenAiConfig {
    /// Paid-tier config for `model` with zero pricing and a 60s deadline.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            tier: Tier::Paid,
            pricing: TokenPricing::free(),
            id: None,
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the tier.
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Set token pricing.
    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Override the identifier used in cost records.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn descriptor(&self) -> ModelDescriptor {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| format!("openai:{}", self.model));
        ModelDescriptor::new(id, self.tier, self.pricing)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url.trim_end_matches('/'))
    }

    fn client(&self) -> Result<reqwest::Client, LlmError> {
        if self.model.trim().is_empty() {
            return Err(LlmError::ConfigError("model name is empty".into()));
        }
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {e}")))
    }
}

/// Map an HTTP error status to an [`LlmError`].
fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => LlmError::AuthError(format!("authentication failed: {message}")),
        429 => LlmError::RateLimited(format!("HTTP 429: {message}")),
        code if is_rate_limit_text(&message) => {
            LlmError::RateLimited(format!("HTTP {code}: {message}"))
        }
        code => LlmError::ProviderError(format!("HTTP {code}: {message}")),
    }
}

fn map_send_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::TimeoutError(format!("request timed out: {e}"))
    } else {
        LlmError::RequestError(format!("request failed: {e}"))
    }
}

/// Extract `error.message` from an error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

async fn post_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    config: &OpenAiConfig,
    url: &str,
    body: &serde_json::Value,
) -> Result<T, LlmError> {
    let response = client
        .post(url)
        .bearer_auth(&config.api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| map_send_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(map_http_error(status, &body_text));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| LlmError::InvalidResponse(format!("malformed response body: {e}")))
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client.
pub struct OpenAiCompletionClient {
    config: OpenAiConfig,
    descriptor: ModelDescriptor,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompletionClient")
            .field("id", &self.descriptor.id)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiCompletionClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an empty model name or if the
    /// HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = config.client()?;
        let descriptor = config.descriptor();
        Ok(Self {
            config,
            descriptor,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let url = self.config.endpoint("chat/completions");
        let response: ChatResponse = post_json(&self.client, &self.config, &url, &body).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(Completion {
            text,
            usage: response.usage.map(TokenUsage::from).unwrap_or_default(),
            model: self.descriptor.id.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Embeddings client.
pub struct OpenAiEmbeddingClient {
    config: OpenAiConfig,
    descriptor: ModelDescriptor,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingClient")
            .field("id", &self.descriptor.id)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiEmbeddingClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an empty model name or if the
    /// HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = config.client()?;
        let descriptor = config.descriptor();
        Ok(Self {
            config,
            descriptor,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn embed(&self, inputs: &[String]) -> Result<Embeddings, LlmError> {
        let body = json!({
            "model": self.config.model,
            "input": inputs,
        });
        let url = self.config.endpoint("embeddings");
        let response: EmbeddingResponse =
            post_json(&self.client, &self.config, &url, &body).await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(Embeddings {
            vectors: data.into_iter().map(|d| d.embedding).collect(),
            usage: response.usage.map(TokenUsage::from).unwrap_or_default(),
        })
    }
}
