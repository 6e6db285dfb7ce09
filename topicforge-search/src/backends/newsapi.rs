//! NewsAPI `/v2/everything` backend for news-vertical queries.
//!
//! The developer plan is free but capped; the business plan is metered.
//! The tier is therefore chosen at construction.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::{rank_results, BackendDescriptor, SearchBackend};
use crate::backends::{join_endpoint, ROLE_NEWS};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{BackendId, SearchQuery, SearchResult, Tier};

const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

/// NewsAPI page size ceiling.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// News index backend.
pub struct NewsApiBackend {
    descriptor: BackendDescriptor,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl NewsApiBackend {
    /// Create the backend with the given tier.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty API key, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        tier: Tier,
        config: &SearchConfig,
    ) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("newsapi key is empty".into()));
        }
        let client = http::build_client(
            config.user_agent.as_deref(),
            Duration::from_millis(config.backend_timeout_ms),
        )?;
        Ok(Self {
            descriptor: BackendDescriptor::new("newsapi", tier, ROLE_NEWS),
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
impl SearchBackend for NewsApiBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query = query.text.as_str(), "newsapi search");

        let page_size = query.max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .client
            .get(join_endpoint(&self.base_url, "everything"))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.text.as_str()),
                ("language", query.language.as_str()),
                ("sortBy", "relevancy"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| http::map_send_error("newsapi", &e))?;
        let response = http::check_status("newsapi", response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("newsapi body read failed: {e}")))?;

        parse_newsapi_json(&body, self.id(), query.max_results)
    }
}

/// Parse a NewsAPI response body. An `"status": "error"` payload is mapped
/// through the same classification as an HTTP error.
pub(crate) fn parse_newsapi_json(
    body: &str,
    backend: &BackendId,
    max_results: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let parsed: NewsResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("newsapi json: {e}")))?;

    if parsed.status == "error" {
        let code = parsed.code.unwrap_or_default();
        let message = parsed.message.unwrap_or_default();
        return Err(http::classify_status(
            "newsapi",
            200,
            &format!("{code}: {message}"),
        ));
    }

    Ok(rank_results(
        backend,
        parsed.articles.into_iter().map(|article| {
            (
                article.url,
                article.title.unwrap_or_default(),
                article.description.unwrap_or_default(),
            )
        }),
        max_results,
    ))
}
