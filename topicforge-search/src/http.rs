//! Shared HTTP client construction and status classification.
//!
//! Provides a configured [`reqwest::Client`] with browser-like headers and a
//! rotating User-Agent, plus [`check_status`] which turns provider responses
//! into the crate's error taxonomy (429 and quota bodies become
//! [`SearchError::RateLimited`]).

use crate::error::{is_rate_limit_text, SearchError};
use rand::seq::SliceRandom;
use std::time::Duration;

/// Realistic browser User-Agent strings, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Maximum characters of an error body carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Build a [`reqwest::Client`] for backend and page requests.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(
    user_agent: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, SearchError> {
    let ua = user_agent.map_or_else(|| random_user_agent().to_owned(), str::to_owned);

    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(timeout)
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Map a transport error from `reqwest` into the crate taxonomy.
pub fn map_send_error(backend: &str, err: &reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout(format!("{backend} request timed out"))
    } else {
        SearchError::BackendUnavailable(format!("{backend} request failed: {err}"))
    }
}

/// Return the response unchanged if its status is a success, otherwise
/// classify the failure.
///
/// - `429` → [`SearchError::RateLimited`]
/// - other statuses whose body mentions a rate-limit marker → `RateLimited`
/// - anything else → [`SearchError::BackendUnavailable`]
///
/// # Errors
///
/// Returns the classified error for any non-2xx status.
pub async fn check_status(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(backend, status.as_u16(), &body))
}

/// Classify a non-success status code and body.
pub fn classify_status(backend: &str, status: u16, body: &str) -> SearchError {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if status == 429 {
        return SearchError::RateLimited(format!("{backend} HTTP 429: {excerpt}"));
    }
    if is_rate_limit_text(&excerpt) {
        return SearchError::RateLimited(format!("{backend} HTTP {status}: {excerpt}"));
    }
    SearchError::BackendUnavailable(format!("{backend} HTTP {status}: {excerpt}"))
}
