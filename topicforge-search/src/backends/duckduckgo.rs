//! DuckDuckGo HTML backend: free, no key, scraper-friendly.
//!
//! Uses the HTML-only endpoint at `https://html.duckduckgo.com/html/`,
//! which needs no JavaScript. When DuckDuckGo throttles a client it serves
//! an "anomaly" challenge page instead of results; that page is reported
//! as a rate limit so the coordinator can reroute.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::backend::{rank_results, BackendDescriptor, SearchBackend};
use crate::backends::ROLE_WEB;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{BackendId, SearchQuery, SearchResult, Tier};

const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Marker present on the bot-challenge page.
const ANOMALY_MARKER: &str = "anomaly-modal";

/// DuckDuckGo HTML scraper.
pub struct DuckDuckGoBackend {
    descriptor: BackendDescriptor,
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoBackend {
    /// Create the backend with the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = http::build_client(
            config.user_agent.as_deref(),
            Duration::from_millis(config.backend_timeout_ms),
        )?;
        Ok(Self {
            descriptor: BackendDescriptor::new("duckduckgo", Tier::Free, ROLE_WEB),
            client,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        })
    }

    /// Point the backend at a different endpoint (used by tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Extract the target URL from DuckDuckGo's redirect wrapper.
    ///
    /// DDG wraps links like `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`.
    fn extract_url(href: &str) -> Option<String> {
        let full_href = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.to_string()
        };

        let parsed = Url::parse(&full_href).ok()?;

        if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, value)| value.into_owned())
        } else {
            Some(full_href)
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query = query.text.as_str(), "duckduckgo search");

        let region = format!("{}-{}", query.market, query.language);
        let params = [("q", query.text.as_str()), ("kl", region.as_str())];

        let response = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .header("Accept-Language", format!("{},en;q=0.8", query.language))
            .send()
            .await
            .map_err(|e| http::map_send_error("duckduckgo", &e))?;
        let response = http::check_status("duckduckgo", response).await?;

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("duckduckgo body read failed: {e}")))?;

        if html.contains(ANOMALY_MARKER) {
            return Err(SearchError::RateLimited(
                "duckduckgo served a bot challenge".into(),
            ));
        }

        parse_duckduckgo_html(&html, self.id(), query.max_results)
    }
}

/// Parse a DuckDuckGo HTML results page, skipping ads.
pub(crate) fn parse_duckduckgo_html(
    html: &str,
    backend: &BackendId,
    max_results: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);

    let result_sel = Selector::parse(
        ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
    )
    .map_err(|e| SearchError::Parse(format!("invalid result selector: {e:?}")))?;
    let title_sel = Selector::parse(".result__a")
        .map_err(|e| SearchError::Parse(format!("invalid title selector: {e:?}")))?;
    let snippet_sel = Selector::parse(".result__snippet")
        .map_err(|e| SearchError::Parse(format!("invalid snippet selector: {e:?}")))?;

    let rows = document.select(&result_sel).filter_map(|element| {
        let title_el = element.select(&title_sel).next()?;
        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            return None;
        }
        let url = DuckDuckGoBackend::extract_url(title_el.value().attr("href")?)?;
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        Some((url, title, snippet))
    });

    let results = rank_results(backend, rows, max_results);
    tracing::debug!(count = results.len(), "duckduckgo results parsed");
    Ok(results)
}
