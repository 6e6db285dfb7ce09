//! Error types for completion and embedding calls.
//!
//! Each variant carries a stable code (SCREAMING_SNAKE_CASE) that is part of
//! the Display output and accessible via [`LlmError::code()`].

use topicforge_search::error::is_rate_limit_text;

/// Stable error codes for programmatic handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    /// Authentication failed (invalid or missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Provider signalled a rate limit or exhausted quota.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// The HTTP request could not be completed.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";
    /// The call exceeded its deadline.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
    /// The provider answered, but not with something usable.
    pub const RESPONSE_INVALID: &str = "RESPONSE_INVALID";
    /// Provider-side error not covered above.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
    /// The run was cancelled while the call was in flight.
    pub const CANCELLED: &str = "CANCELLED";
}

/// Errors from model providers.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// Authentication failed.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    AuthError(String),

    /// Rate limit or quota exhaustion.
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Transport failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Deadline exceeded.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    TimeoutError(String),

    /// Unparseable or empty response.
    #[error("[{}] {}", error_codes::RESPONSE_INVALID, .0)]
    InvalidResponse(String),

    /// Other provider-side failure (typically 5xx).
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    ProviderError(String),

    /// Cancelled by the caller.
    #[error("[{}] {}", error_codes::CANCELLED, .0)]
    Cancelled(String),
}

impl LlmError {
    /// The stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::AuthError(_) => error_codes::AUTH_FAILED,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::TimeoutError(_) => error_codes::TIMEOUT_ERROR,
            Self::InvalidResponse(_) => error_codes::RESPONSE_INVALID,
            Self::ProviderError(_) => error_codes::PROVIDER_ERROR,
            Self::Cancelled(_) => error_codes::CANCELLED,
        }
    }

    /// The inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigError(m)
            | Self::AuthError(m)
            | Self::RateLimited(m)
            | Self::RequestError(m)
            | Self::TimeoutError(m)
            | Self::InvalidResponse(m)
            | Self::ProviderError(m)
            | Self::Cancelled(m) => m,
        }
    }

    /// Whether this error should degrade the model for the rest of the run.
    ///
    /// True for [`LlmError::RateLimited`] and for transport or provider
    /// errors whose message carries a rate-limit marker.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::RequestError(m) | Self::ProviderError(m) => is_rate_limit_text(m),
            _ => false,
        }
    }

    /// Whether retrying the same model could succeed.
    ///
    /// Rate limits are rerouted, never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestError(_) | Self::ProviderError(_) => !self.is_rate_limited(),
            Self::TimeoutError(_) | Self::InvalidResponse(_) => true,
            Self::ConfigError(_) | Self::AuthError(_) | Self::RateLimited(_) | Self::Cancelled(_) => {
                false
            }
        }
    }
}
