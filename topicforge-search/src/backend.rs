//! Trait definition for pluggable search backends.
//!
//! Each provider (HTML scrape, meta-search, grounded generative search,
//! news index) implements [`SearchBackend`]. Fusion, dedup, and rerank only
//! ever see a backend's [`BackendId`] and [`Tier`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::{BackendId, SearchQuery, SearchResult, Tier};

/// Static description of a backend, used by the cost coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Stable identifier.
    pub id: BackendId,
    /// Free or paid.
    pub tier: Tier,
    /// Functional role (e.g. `"web"`, `"news"`, `"grounded"`). A paid
    /// fallback is registered per role.
    pub role: String,
    /// Flat USD charge per successful call.
    pub cost_per_call_usd: f64,
}

impl BackendDescriptor {
    /// Create a descriptor with zero per-call cost.
    pub fn new(id: impl Into<String>, tier: Tier, role: impl Into<String>) -> Self {
        Self {
            id: BackendId::new(id),
            tier,
            role: role.into(),
            cost_per_call_usd: 0.0,
        }
    }

    /// Set the per-call cost.
    pub fn with_cost(mut self, cost_per_call_usd: f64) -> Self {
        self.cost_per_call_usd = cost_per_call_usd;
        self
    }
}

/// A pluggable search provider.
///
/// Implementations handle their own request construction, authentication,
/// and response parsing. They must map HTTP 429 and quota responses to
/// [`SearchError::RateLimited`] so the cost coordinator can reroute.
///
/// All implementations must be `Send + Sync` for concurrent fan-out.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Static description (id, tier, role, cost).
    fn descriptor(&self) -> &BackendDescriptor;

    /// Run one query and return results ranked from 1.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the request fails, the response cannot be
    /// parsed, or the provider is rate limiting.
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError>;

    /// Convenience accessor for the backend id.
    fn id(&self) -> &BackendId {
        &self.descriptor().id
    }

    /// Convenience accessor for the tier.
    fn tier(&self) -> Tier {
        self.descriptor().tier
    }
}

/// Assign 1-based ranks and the backend id to raw `(url, title, snippet)` rows,
/// truncating to `max_results`.
pub fn rank_results(
    backend: &BackendId,
    rows: impl IntoIterator<Item = (String, String, String)>,
    max_results: usize,
) -> Vec<SearchResult> {
    rows.into_iter()
        .filter(|(url, _, _)| !url.trim().is_empty())
        .take(max_results)
        .enumerate()
        .map(|(idx, (url, title, snippet))| SearchResult {
            url,
            title,
            snippet,
            backend_id: backend.clone(),
            rank: idx + 1,
        })
        .collect()
}
