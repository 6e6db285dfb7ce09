//! Serper.dev Google Search API: the paid web fallback.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{rank_results, BackendDescriptor, SearchBackend};
use crate::backends::{join_endpoint, ROLE_WEB};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{BackendId, SearchQuery, SearchResult, Tier};

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

/// Default USD charged per successful query.
pub const DEFAULT_COST_PER_CALL_USD: f64 = 0.001;

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Debug, Deserialize)]
struct SerperHit {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Metered Google results via Serper.
pub struct SerperBackend {
    descriptor: BackendDescriptor,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerperBackend {
    /// Create the backend.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty API key, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(api_key: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("serper api key is empty".into()));
        }
        let client = http::build_client(
            config.user_agent.as_deref(),
            Duration::from_millis(config.backend_timeout_ms),
        )?;
        Ok(Self {
            descriptor: BackendDescriptor::new("serper", Tier::Paid, ROLE_WEB)
                .with_cost(DEFAULT_COST_PER_CALL_USD),
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
        })
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-call cost.
    pub fn with_cost(mut self, cost_per_call_usd: f64) -> Self {
        self.descriptor = self.descriptor.with_cost(cost_per_call_usd);
        self
    }
}

#[async_trait]
impl SearchBackend for SerperBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query = query.text.as_str(), "serper search");

        let request = SerperRequest {
            q: &query.text,
            gl: &query.market,
            hl: &query.language,
            num: query.max_results,
        };
        let response = self
            .client
            .post(join_endpoint(&self.base_url, "search"))
            .header("X-API-KEY", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::map_send_error("serper", &e))?;
        let response = http::check_status("serper", response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("serper body read failed: {e}")))?;

        parse_serper_json(&body, self.id(), query.max_results)
    }
}

/// Parse a Serper JSON response body.
pub(crate) fn parse_serper_json(
    body: &str,
    backend: &BackendId,
    max_results: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let parsed: SerperResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("serper json: {e}")))?;
    Ok(rank_results(
        backend,
        parsed
            .organic
            .into_iter()
            .map(|hit| (hit.link, hit.title, hit.snippet)),
        max_results,
    ))
}
