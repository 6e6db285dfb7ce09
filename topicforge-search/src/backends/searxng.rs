//! SearXNG meta-search backend (free, self-hosted JSON API).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::{rank_results, BackendDescriptor, SearchBackend};
use crate::backends::{join_endpoint, ROLE_WEB};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{BackendId, SearchQuery, SearchResult, Tier};

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngHit>,
}

#[derive(Debug, Deserialize)]
struct SearxngHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Queries a SearXNG instance with `format=json`.
pub struct SearxngBackend {
    descriptor: BackendDescriptor,
    client: reqwest::Client,
    base_url: String,
}

impl SearxngBackend {
    /// Create a backend for the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty base URL, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(base_url: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(SearchError::Config("searxng base_url is empty".into()));
        }
        let client = http::build_client(
            config.user_agent.as_deref(),
            Duration::from_millis(config.backend_timeout_ms),
        )?;
        Ok(Self {
            descriptor: BackendDescriptor::new("searxng", Tier::Free, ROLE_WEB),
            client,
            base_url,
        })
    }
}

#[async_trait]
impl SearchBackend for SearxngBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query = query.text.as_str(), "searxng search");

        let response = self
            .client
            .get(join_endpoint(&self.base_url, "search"))
            .query(&[
                ("q", query.text.as_str()),
                ("format", "json"),
                ("language", query.language.as_str()),
                ("pageno", "1"),
            ])
            .send()
            .await
            .map_err(|e| http::map_send_error("searxng", &e))?;
        let response = http::check_status("searxng", response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("searxng body read failed: {e}")))?;

        parse_searxng_json(&body, self.id(), query.max_results)
    }
}

/// Parse a SearXNG JSON response body.
pub(crate) fn parse_searxng_json(
    body: &str,
    backend: &BackendId,
    max_results: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let parsed: SearxngResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("searxng json: {e}")))?;
    Ok(rank_results(
        backend,
        parsed
            .results
            .into_iter()
            .map(|hit| (hit.url, hit.title.trim().to_owned(), hit.content.trim().to_owned())),
        max_results,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_results_in_order() {
        let body = json!({
            "results": [
                {"url": "https://a.org/1", "title": " A ", "content": "alpha"},
                {"url": "", "title": "no url"},
                {"url": "https://b.org/2", "title": "B"}
            ]
        })
        .to_string();
        let results = parse_searxng_json(&body, &BackendId::from("searxng"), 10).expect("parse");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "A");
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_searxng_json("<html>", &BackendId::from("searxng"), 10).unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[test]
    fn empty_base_url_rejected() {
        assert!(SearxngBackend::new(" ", &SearchConfig::default()).is_err());
    }

    #[tokio::test]
    async fn fetch_requests_json_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("format", "json"))
            .and(query_param("q", "grid storage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"url": "https://x.org", "title": "X", "content": "x"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = SearxngBackend::new(server.uri(), &SearchConfig::default()).expect("backend");
        let results = backend
            .fetch(&SearchQuery::new("grid storage"))
            .await
            .expect("fetch");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].backend_id.as_str(), "searxng");
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let backend = SearxngBackend::new(server.uri(), &SearchConfig::default()).expect("backend");
        let err = backend.fetch(&SearchQuery::new("q")).await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimited(_)));
    }
}
