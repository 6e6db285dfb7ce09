//! Page fetching for dedup signatures and passage extraction.
//!
//! [`HttpPageFetcher`] downloads a page, extracts readable text with
//! [`crate::content::extract_content`], and keeps successful extractions in
//! a bounded in-memory cache keyed by normalised URL. The cache belongs to
//! the fetcher instance so separate engines never share state.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::config::SearchConfig;
use crate::content::extract_content;
use crate::error::SearchError;
use crate::http;
use crate::types::PageContent;
use crate::url_normalize::normalize_url;

/// Maximum cached pages per fetcher.
const MAX_CACHED_PAGES: u64 = 512;

/// How long an extracted page stays cached.
const PAGE_TTL: Duration = Duration::from_secs(30 * 60);

/// Fetches readable page content by URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Download and extract one page.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the page cannot be fetched or has no
    /// readable text.
    async fn fetch_page(&self, url: &str) -> Result<PageContent, SearchError>;
}

/// `reqwest`-backed fetcher with a per-instance cache.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_chars: usize,
    cache: Cache<String, PageContent>,
}

impl HttpPageFetcher {
    /// Build a fetcher from search settings (page deadline, size cap, UA).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = http::build_client(
            config.user_agent.as_deref(),
            Duration::from_millis(config.page_timeout_ms),
        )?;
        Ok(Self {
            client,
            max_chars: config.page_max_chars,
            cache: Cache::builder()
                .max_capacity(MAX_CACHED_PAGES)
                .time_to_live(PAGE_TTL)
                .build(),
        })
    }

    /// Number of cached pages (approximate; pending maintenance excluded).
    pub fn cached_pages(&self) -> u64 {
        self.cache.entry_count()
    }

    async fn download(&self, url: &str) -> Result<PageContent, SearchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| http::map_send_error("page", &e))?;
        let response = http::check_status("page", response).await?;
        let html = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("page body read failed: {e}")))?;
        extract_content(&html, url, self.max_chars)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<PageContent, SearchError> {
        let key = normalize_url(url);
        if let Some(page) = self.cache.get(&key).await {
            tracing::trace!(url, "page cache hit");
            return Ok(page);
        }

        let page = self.download(url).await?;
        tracing::debug!(url, words = page.word_count, "page fetched");
        self.cache.insert(key, page.clone()).await;
        Ok(page)
    }
}
