//! Concurrent fan-out across backends with per-call deadlines, bounded
//! retries, and cost-aware fallback.
//!
//! Each primary backend is queried once per fan-out. A failure or timeout
//! yields an empty contribution plus a logged error and never aborts the
//! sibling calls. A rate-limit signal degrades the backend for the rest of
//! the run and the same query is immediately re-issued to the role's paid
//! fallback, if one is registered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::backend::SearchBackend;
use crate::config::SearchConfig;
use crate::cost::{CostRecorder, Route};
use crate::error::SearchError;
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};
use crate::types::{BackendId, SearchQuery, SearchResult};

/// Stage name used in cost records for backend searches.
pub const SEARCH_STAGE: &str = "search";

/// Primary backends plus per-role paid fallbacks.
#[derive(Clone, Default)]
pub struct BackendPool {
    primaries: Vec<Arc<dyn SearchBackend>>,
    fallbacks: HashMap<String, Arc<dyn SearchBackend>>,
}

impl BackendPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primary backend, queried on every fan-out.
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.primaries.push(backend);
        self
    }

    /// Register the paid fallback for a role.
    pub fn with_fallback(mut self, role: impl Into<String>, backend: Arc<dyn SearchBackend>) -> Self {
        self.fallbacks.insert(role.into(), backend);
        self
    }

    /// Primary backends in fan-out order.
    pub fn primaries(&self) -> &[Arc<dyn SearchBackend>] {
        &self.primaries
    }

    /// Number of primary backends.
    pub fn len(&self) -> usize {
        self.primaries.len()
    }

    /// Whether the pool has no primary backends.
    pub fn is_empty(&self) -> bool {
        self.primaries.is_empty()
    }

    /// `role → fallback id` map, for building a [`CostRecorder`].
    pub fn fallback_routes(&self) -> HashMap<String, BackendId> {
        self.fallbacks
            .iter()
            .map(|(role, backend)| (role.clone(), backend.id().clone()))
            .collect()
    }

    /// A fresh per-run recorder wired with this pool's fallback routes.
    pub fn new_recorder(&self) -> CostRecorder {
        CostRecorder::with_fallbacks(self.fallback_routes())
    }

    fn fallback(&self, role: &str) -> Option<&Arc<dyn SearchBackend>> {
        self.fallbacks.get(role)
    }
}

impl std::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let primaries: Vec<&str> = self.primaries.iter().map(|b| b.id().as_str()).collect();
        let fallbacks: HashMap<&str, &str> = self
            .fallbacks
            .iter()
            .map(|(role, b)| (role.as_str(), b.id().as_str()))
            .collect();
        f.debug_struct("BackendPool")
            .field("primaries", &primaries)
            .field("fallbacks", &fallbacks)
            .finish()
    }
}

/// What happened to one primary backend during a fan-out.
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    /// The primary backend this slot belongs to.
    pub backend_id: BackendId,
    /// The backend that actually served the results (differs on fallback).
    pub served_by: Option<BackendId>,
    /// Ranked results; empty on failure.
    pub results: Vec<SearchResult>,
    /// Errors encountered, in order (primary first, then fallback).
    pub errors: Vec<SearchError>,
    /// Whether the call was rerouted to a fallback.
    pub fell_back: bool,
}

impl BackendOutcome {
    fn new(backend_id: BackendId) -> Self {
        Self {
            backend_id,
            served_by: None,
            results: Vec::new(),
            errors: Vec::new(),
            fell_back: false,
        }
    }
}

/// Joined result of one fan-out, in primary-backend order.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    /// One outcome per primary backend.
    pub outcomes: Vec<BackendOutcome>,
}

impl FanoutReport {
    /// Ranked lists in backend order, skipping empty ones.
    pub fn ranked_lists(&self) -> Vec<Vec<SearchResult>> {
        self.outcomes
            .iter()
            .filter(|o| !o.results.is_empty())
            .map(|o| o.results.clone())
            .collect()
    }

    /// Number of backends that contributed at least one result.
    pub fn contributing_backends(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.results.is_empty()).count()
    }

    /// `backend: error` strings for every failure.
    pub fn error_summary(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|o| o.errors.iter().map(move |e| format!("{}: {e}", o.backend_id)))
            .collect()
    }

    /// Fail with [`SearchError::AllBackendsFailed`] when nothing came back.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend produced a non-empty list.
    pub fn ensure_any_results(&self) -> Result<(), SearchError> {
        if self.contributing_backends() > 0 {
            return Ok(());
        }
        let errors = self.error_summary();
        let detail = if errors.is_empty() {
            "every backend returned an empty list".to_string()
        } else {
            errors.join("; ")
        };
        Err(SearchError::AllBackendsFailed(detail))
    }
}

/// Query every primary backend concurrently and join the outcomes.
///
/// Concurrency is bounded by `config.max_concurrency` (or the backend count
/// when zero). Output order matches `pool.primaries()` so downstream fusion
/// is reproducible.
///
/// # Errors
///
/// Returns [`SearchError::Cancelled`] if `cancel` fires before the join
/// completes. Individual backend failures are reported in the outcomes.
pub async fn fan_out(
    pool: &BackendPool,
    query: &SearchQuery,
    config: &SearchConfig,
    recorder: &CostRecorder,
    cancel: &CancellationToken,
) -> Result<FanoutReport, SearchError> {
    let limit = match config.max_concurrency {
        0 => pool.len().max(1),
        n => n.min(pool.len().max(1)),
    };

    let outcomes: Vec<BackendOutcome> = stream::iter(pool.primaries().iter().cloned())
        .map(|backend| query_with_fallback(pool, backend, query, config, recorder, cancel))
        .buffered(limit)
        .collect()
        .await;

    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled("search fan-out cancelled".into()));
    }

    Ok(FanoutReport { outcomes })
}

async fn query_with_fallback(
    pool: &BackendPool,
    primary: Arc<dyn SearchBackend>,
    query: &SearchQuery,
    config: &SearchConfig,
    recorder: &CostRecorder,
    cancel: &CancellationToken,
) -> BackendOutcome {
    let role = primary.descriptor().role.clone();
    let mut outcome = BackendOutcome::new(primary.id().clone());

    let mut target = match recorder.route(&role, primary.id()) {
        Route::Primary(_) => Some((primary.clone(), false)),
        Route::Fallback(_) => pool.fallback(&role).map(|fb| (fb.clone(), true)),
        Route::Unavailable => None,
    };

    while let Some((backend, is_fallback)) = target.take() {
        if is_fallback {
            tracing::info!(
                backend = %primary.id(),
                fallback = %backend.id(),
                role = role.as_str(),
                "rerouting search to paid fallback"
            );
            outcome.fell_back = true;
        }
        match call_backend(backend.as_ref(), query, config, recorder, cancel, is_fallback).await {
            Ok(results) => {
                tracing::debug!(backend = %backend.id(), count = results.len(), "backend returned results");
                outcome.served_by = Some(backend.id().clone());
                outcome.results = results;
            }
            Err(err) => {
                tracing::warn!(backend = %backend.id(), error = %err, "backend query failed");
                let rate_limited = err.is_rate_limited();
                outcome.errors.push(err);
                if rate_limited {
                    recorder.mark_degraded(backend.id(), "rate limit signal");
                    if !is_fallback {
                        if let Route::Fallback(_) = recorder.route(&role, primary.id()) {
                            target = pool.fallback(&role).map(|fb| (fb.clone(), true));
                        }
                    }
                }
            }
        }
    }

    if outcome.results.is_empty() && outcome.errors.is_empty() && recorder.is_degraded(primary.id()) {
        outcome.errors.push(SearchError::RateLimited(format!(
            "{} degraded earlier in this run and no fallback is available",
            primary.id()
        )));
    }

    outcome
}

async fn call_backend(
    backend: &dyn SearchBackend,
    query: &SearchQuery,
    config: &SearchConfig,
    recorder: &CostRecorder,
    cancel: &CancellationToken,
    is_fallback: bool,
) -> Result<Vec<SearchResult>, SearchError> {
    let policy = RetryPolicy::new(
        config.retry_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    );
    let deadline = Duration::from_millis(config.backend_timeout_ms);
    let descriptor = backend.descriptor();

    let result = retry_with_backoff(policy, cancel, SearchError::is_retryable, |_| async move {
        let outcome = match tokio::time::timeout(deadline, backend.fetch(query)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SearchError::Timeout(format!(
                "{} exceeded {}ms",
                descriptor.id, config.backend_timeout_ms
            ))),
        };
        let success = outcome.is_ok();
        let cost = if success { descriptor.cost_per_call_usd } else { 0.0 };
        recorder.record_call(
            &descriptor.id,
            descriptor.tier,
            SEARCH_STAGE,
            success,
            cost,
            is_fallback,
        );
        outcome
    })
    .await;

    match result {
        Ok(mut results) => {
            results.truncate(query.max_results);
            Ok(results)
        }
        Err(RetryError::Failed(err)) => Err(err),
        Err(RetryError::Cancelled) => Err(SearchError::Cancelled(format!(
            "{} call cancelled",
            descriptor.id
        ))),
    }
}
