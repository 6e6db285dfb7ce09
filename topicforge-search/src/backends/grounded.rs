//! Grounded generative search over an OpenAI-compatible chat endpoint.
//!
//! Providers in this family (e.g. Perplexity's `sonar` models) answer a chat
//! request and attach the web sources they used. Only the sources are kept:
//! the generated answer is discarded, since synthesis happens later from
//! the fetched pages. Structured `search_results` are preferred; a bare
//! `citations` URL list is used when that is all the provider returns.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{rank_results, BackendDescriptor, SearchBackend};
use crate::backends::{join_endpoint, ROLE_GROUNDED};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{BackendId, SearchQuery, SearchResult, Tier};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";

/// Default USD charged per successful query.
pub const DEFAULT_COST_PER_CALL_USD: f64 = 0.005;

const SYSTEM_PROMPT: &str =
    "Find authoritative, recent web sources for the user's research topic. Cite every source.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct GroundedResponse {
    #[serde(default)]
    search_results: Vec<GroundedSource>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GroundedSource {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: Option<String>,
}

/// Paid grounded-search backend.
pub struct GroundedSearchBackend {
    descriptor: BackendDescriptor,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroundedSearchBackend {
    /// Create the backend with the default endpoint and model.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty API key, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(api_key: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("grounded search api key is empty".into()));
        }
        let client = http::build_client(
            config.user_agent.as_deref(),
            Duration::from_millis(config.backend_timeout_ms),
        )?;
        Ok(Self {
            descriptor: BackendDescriptor::new("grounded", Tier::Paid, ROLE_GROUNDED)
                .with_cost(DEFAULT_COST_PER_CALL_USD),
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the per-call cost.
    pub fn with_cost(mut self, cost_per_call_usd: f64) -> Self {
        self.descriptor = self.descriptor.with_cost(cost_per_call_usd);
        self
    }
}

#[async_trait]
impl SearchBackend for GroundedSearchBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query = query.text.as_str(), model = self.model.as_str(), "grounded search");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &query.text,
                },
            ],
        };
        let response = self
            .client
            .post(join_endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::map_send_error("grounded", &e))?;
        let response = http::check_status("grounded", response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("grounded body read failed: {e}")))?;

        parse_grounded_json(&body, self.id(), query.max_results)
    }
}

/// Parse the sources out of a grounded chat response.
pub(crate) fn parse_grounded_json(
    body: &str,
    backend: &BackendId,
    max_results: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let parsed: GroundedResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("grounded json: {e}")))?;

    let rows: Vec<(String, String, String)> = if parsed.search_results.is_empty() {
        parsed
            .citations
            .into_iter()
            .map(|url| (url, String::new(), String::new()))
            .collect()
    } else {
        parsed
            .search_results
            .into_iter()
            .map(|s| (s.url, s.title, s.snippet.unwrap_or_default()))
            .collect()
    };

    Ok(rank_results(backend, rows, max_results))
}
