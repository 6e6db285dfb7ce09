//! Bounded retry with exponential backoff.
//!
//! Every external call site retries at most [`MAX_ATTEMPTS`] times. Only
//! errors the caller classifies as retryable are retried; rate limits are
//! handed back immediately so the cost coordinator can reroute.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Hard ceiling on attempts for any call site.
pub const MAX_ATTEMPTS: u32 = 3;

/// Retry policy for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first; clamped to `1..=MAX_ATTEMPTS`.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy, clamping attempts into `1..=MAX_ATTEMPTS`.
    pub fn new(attempts: u32, base_backoff: Duration) -> Self {
        Self {
            attempts: attempts.clamp(1, MAX_ATTEMPTS),
            base_backoff,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Backoff before attempt `attempt` (1-based; attempt 1 has none).
    /// Adds up to 20% random jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.base_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exp = self.base_backoff.saturating_mul(1 << (attempt - 2).min(8));
        let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis() as u64 / 5);
        exp + Duration::from_millis(jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(250))
    }
}

/// Outcome of a retried operation when it never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The last error returned by the operation.
    Failed(E),
    /// The cancellation token fired before an attempt completed.
    Cancelled,
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy
/// is exhausted. Cancellation aborts both in-flight attempts and backoff sleeps.
///
/// # Errors
///
/// Returns [`RetryError::Failed`] with the last error, or
/// [`RetryError::Cancelled`] if `cancel` fired.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let delay = policy.backoff_for(attempt);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = op(attempt) => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts && is_retryable(&err) => {
                tracing::debug!(attempt, max = policy.attempts, "retrying after transient error");
                attempt += 1;
            }
            Err(err) => return Err(RetryError::Failed(err)),
        }
    }
}
