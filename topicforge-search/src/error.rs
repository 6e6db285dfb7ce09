//! Error types for the topicforge-search crate.
//!
//! Messages are stable and never include API keys.

/// Substrings that mark an error message as a rate-limit signal.
const RATE_LIMIT_MARKERS: &[&str] = &["rate", "quota", "limit", "429"];

/// Errors that can occur while querying backends or fetching pages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Transport failure or unexpected HTTP status from a backend.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend signalled a rate limit or exhausted quota.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The call exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An HTTP request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The run was cancelled while the call was in flight.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Every backend failed or returned nothing.
    #[error("all search backends failed: {0}")]
    AllBackendsFailed(String),
}

impl SearchError {
    /// Whether this error should trigger cost-coordinator fallback.
    ///
    /// True for [`SearchError::RateLimited`], and for any other variant
    /// whose message contains a rate-limit marker.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Cancelled(_) | Self::Config(_) => false,
            other => is_rate_limit_text(&other.to_string()),
        }
    }

    /// Whether retrying the same backend could succeed.
    ///
    /// Rate limits are not retryable: they are rerouted instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendUnavailable(_) | Self::Timeout(_) | Self::Http(_) => {
                !self.is_rate_limited()
            }
            Self::RateLimited(_)
            | Self::Parse(_)
            | Self::Config(_)
            | Self::Cancelled(_)
            | Self::AllBackendsFailed(_) => false,
        }
    }
}

/// Case-insensitive substring match against the rate-limit markers.
pub fn is_rate_limit_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Convenience type alias for topicforge-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
