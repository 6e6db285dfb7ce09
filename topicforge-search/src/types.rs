//! Core types for backend results, backend identity, and fused candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of a search backend (e.g. `"duckduckgo"`, `"serper"`).
///
/// Downstream stages only ever see this identifier and the backend's
/// [`Tier`], never the concrete adapter that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Create a backend identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Cost classification of a backend, used to pick reroute targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No per-call charge; usually rate-limited.
    Free,
    /// Metered; used as the fallback when a free backend is degraded.
    Paid,
}

impl Tier {
    /// Lowercase name used in logs and cost reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A search request as seen by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: String,
    /// Market/region code (e.g. `"us"`, `"de"`).
    pub market: String,
    /// Language code (e.g. `"en"`).
    pub language: String,
    /// Maximum number of results the backend should return.
    pub max_results: usize,
}

impl SearchQuery {
    /// Create a query with default market `"us"`, language `"en"`, and 10 results.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            market: "us".into(),
            language: "en".into(),
            max_results: 10,
        }
    }

    /// Set market and language.
    pub fn with_locale(mut self, market: impl Into<String>, language: impl Into<String>) -> Self {
        self.market = market.into();
        self.language = language.into();
        self
    }

    /// Set the per-backend result bound.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// A single ranked result returned by one backend call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result URL as returned by the backend.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Short text snippet.
    pub snippet: String,
    /// Backend that produced this result.
    pub backend_id: BackendId,
    /// 1-based position within that backend's list.
    pub rank: usize,
}

/// One candidate after Reciprocal Rank Fusion.
///
/// Built from one or more [`SearchResult`]s that share a normalised URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    /// URL of the first-seen result for this normalised URL.
    pub url: String,
    /// Normalised URL used as the identity key.
    pub normalized_url: String,
    /// Title from the first-seen result.
    pub title: String,
    /// Snippet from the first-seen result.
    pub snippet: String,
    /// Sum of `1 / (k + rank)` over every list containing this URL.
    pub fusion_score: f64,
    /// Every backend that returned this URL.
    pub contributing_backends: BTreeSet<BackendId>,
}

/// Readable content extracted from a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    /// The URL that was fetched.
    pub url: String,
    /// Page title from the `<title>` element (may be empty).
    pub title: String,
    /// Whitespace-normalised readable text.
    pub text: String,
    /// Number of words in `text`.
    pub word_count: usize,
    /// Publication time from page metadata, when the page declares one.
    pub published_at: Option<DateTime<Utc>>,
}
