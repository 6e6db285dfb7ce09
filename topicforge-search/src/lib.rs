//! # topicforge-search
//!
//! Source discovery for topicforge: concurrent multi-backend search, rank
//! fusion, page fetching, and per-run cost accounting.
//!
//! ## Design
//!
//! - Backends implement [`SearchBackend`] and are queried concurrently
//!   through a [`BackendPool`], each with its own deadline and bounded retries
//! - Ranked lists are merged with Reciprocal Rank Fusion (`k = 60`)
//! - A backend that signals a rate limit is degraded for the rest of the run
//!   and its role is served by the registered paid fallback
//! - Every external call is appended to the run's [`CostRecorder`]
//! - Graceful degradation: failed backends contribute nothing, and only a
//!   run where every backend comes back empty is an error
//!
//! ## Security
//!
//! - API keys are never logged or included in error messages
//! - Queries are logged only at trace level

pub mod backend;
pub mod backends;
pub mod config;
pub mod content;
pub mod cost;
pub mod error;
pub mod fanout;
pub mod fetch;
pub mod fusion;
pub mod http;
pub mod retry;
pub mod types;
pub mod url_normalize;

pub use backend::{BackendDescriptor, SearchBackend};
pub use config::SearchConfig;
pub use cost::{CostRecord, CostRecorder, CostSummary, Route};
pub use error::{Result, SearchError};
pub use fanout::{BackendOutcome, BackendPool, FanoutReport};
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy, MAX_ATTEMPTS};
pub use types::{BackendId, FusedCandidate, PageContent, SearchQuery, SearchResult, Tier};

use tokio_util::sync::CancellationToken;

/// Fan a query out to every backend in `pool` and fuse the ranked lists.
///
/// Returns fused candidates in descending RRF order together with the
/// per-backend report.
///
/// # Errors
///
/// Returns [`SearchError::Config`] for invalid settings,
/// [`SearchError::Cancelled`] if `cancel` fires, and
/// [`SearchError::AllBackendsFailed`] if no backend returned anything.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> topicforge_search::Result<()> {
/// use std::sync::Arc;
/// use topicforge_search::backends::DuckDuckGoBackend;
/// use topicforge_search::{search_and_fuse, BackendPool, SearchConfig, SearchQuery};
/// use tokio_util::sync::CancellationToken;
///
/// let config = SearchConfig::default();
/// let pool = BackendPool::new().with_backend(Arc::new(DuckDuckGoBackend::new(&config)?));
/// let recorder = pool.new_recorder();
/// let (fused, _report) = search_and_fuse(
///     &pool,
///     &SearchQuery::new("solid-state batteries"),
///     &config,
///     &recorder,
///     &CancellationToken::new(),
/// )
/// .await?;
/// for candidate in &fused {
///     println!("{:.4} {}", candidate.fusion_score, candidate.url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search_and_fuse(
    pool: &BackendPool,
    query: &SearchQuery,
    config: &SearchConfig,
    recorder: &CostRecorder,
    cancel: &CancellationToken,
) -> Result<(Vec<FusedCandidate>, FanoutReport)> {
    config.validate()?;
    let report = fanout::fan_out(pool, query, config, recorder, cancel).await?;
    report.ensure_any_results()?;
    let fused = fusion::reciprocal_rank_fusion(&report.ranked_lists(), config.rrf_k);
    tracing::debug!(
        backends = report.contributing_backends(),
        candidates = fused.len(),
        "search fused"
    );
    Ok((fused, report))
}
