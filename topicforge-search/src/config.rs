//! Search-layer configuration with sensible defaults.
//!
//! [`SearchConfig`] controls per-backend result bounds, deadlines, retries,
//! fusion smoothing, and request behaviour.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Configuration for one fan-out across all backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum results requested from each backend.
    pub max_results_per_backend: usize,
    /// Independent deadline for each backend call, in milliseconds.
    pub backend_timeout_ms: u64,
    /// RRF smoothing constant `k`.
    pub rrf_k: f64,
    /// Attempts per backend call, including the first (1..=3).
    pub retry_attempts: u32,
    /// Base backoff between retries in milliseconds; doubles per attempt.
    pub retry_backoff_ms: u64,
    /// Upper bound on concurrently running backend calls.
    /// `0` means "one slot per backend".
    pub max_concurrency: usize,
    /// Deadline for fetching a single page, in milliseconds.
    pub page_timeout_ms: u64,
    /// Maximum characters kept from an extracted page.
    pub page_max_chars: usize,
    /// Custom User-Agent string. If `None`, rotates through a built-in list.
    pub user_agent: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results_per_backend: 10,
            backend_timeout_ms: 5_000,
            rrf_k: 60.0,
            retry_attempts: 2,
            retry_backoff_ms: 250,
            max_concurrency: 0,
            page_timeout_ms: 8_000,
            page_max_chars: 100_000,
            user_agent: None,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_results_per_backend == 0 {
            return Err(SearchError::Config(
                "max_results_per_backend must be greater than 0".into(),
            ));
        }
        if self.backend_timeout_ms == 0 {
            return Err(SearchError::Config(
                "backend_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.page_timeout_ms == 0 {
            return Err(SearchError::Config(
                "page_timeout_ms must be greater than 0".into(),
            ));
        }
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(SearchError::Config("rrf_k must be a positive number".into()));
        }
        if !(1..=3).contains(&self.retry_attempts) {
            return Err(SearchError::Config(
                "retry_attempts must be between 1 and 3".into(),
            ));
        }
        if self.page_max_chars == 0 {
            return Err(SearchError::Config(
                "page_max_chars must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
