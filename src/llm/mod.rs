//! Model provider seams: chat completions and the rate-limit fallback router.
//!
//! Providers implement [`CompletionClient`] (and
//! [`crate::embedding::EmbeddingClient`] for vectors). Every call goes
//! through [`call_model`], which applies the bounded retry policy, honours
//! cancellation, and appends one cost record per attempt to the run's
//! [`CostRecorder`].
//!
//! [`CompletionRouter`] pairs a primary model with an optional paid
//! fallback. A rate-limit signal from the primary degrades it for the rest
//! of the run and the request is resent to the fallback immediately.

pub mod error;
pub mod openai;
pub mod usage;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use topicforge_search::{retry_with_backoff, BackendId, CostRecorder, RetryError, RetryPolicy, Tier};
use tokio_util::sync::CancellationToken;

use crate::error::Stage;

pub use self::error::LlmError;
pub use self::openai::{OpenAiCompletionClient, OpenAiConfig, OpenAiEmbeddingClient};
pub use self::usage::{TokenPricing, TokenUsage};

/// Identity, tier, and pricing of a model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Identifier used in cost records and degradation state.
    pub id: BackendId,
    /// Free or paid.
    pub tier: Tier,
    /// Token pricing.
    pub pricing: TokenPricing,
}

impl ModelDescriptor {
    /// Create a descriptor.
    pub fn new(id: impl Into<String>, tier: Tier, pricing: TokenPricing) -> Self {
        Self {
            id: BackendId::new(id),
            tier,
            pricing,
        }
    }
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// System instructions.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Output token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a request with default sampling (temperature 0.2, 1024 tokens).
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    /// Set the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A completion response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Generated text, never empty.
    pub text: String,
    /// Token usage reported by the provider.
    pub usage: TokenUsage,
    /// Model that produced the text.
    pub model: BackendId,
}

/// Chat-completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Identity and pricing.
    fn descriptor(&self) -> &ModelDescriptor;

    /// Run one completion. Implementations must not retry internally.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, provider, or parse failure.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Retry and deadline settings for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Bounded retry policy.
    pub retry: RetryPolicy,
    /// Per-attempt deadline; `None` relies on the client's own timeout.
    pub timeout: Option<Duration>,
}

impl CallPolicy {
    /// Create a policy from attempts and base backoff in milliseconds.
    pub fn new(attempts: u32, backoff_ms: u64) -> Self {
        Self {
            retry: RetryPolicy::new(attempts, Duration::from_millis(backoff_ms)),
            timeout: None,
        }
    }

    /// Set a per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Run a model call under `policy`, recording one cost entry per attempt.
///
/// A model already degraded in this run is not called at all.
///
/// # Errors
///
/// Returns the last [`LlmError`], or [`LlmError::Cancelled`] if `cancel` fired.
pub async fn call_model<T, F, Fut>(
    model: &ModelDescriptor,
    stage: Stage,
    policy: CallPolicy,
    recorder: &CostRecorder,
    cancel: &CancellationToken,
    fallback_triggered: bool,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(T, TokenUsage), LlmError>>,
{
    if recorder.is_degraded(&model.id) {
        return Err(LlmError::RateLimited(format!(
            "{} is degraded for this run",
            model.id
        )));
    }

    let outcome = retry_with_backoff(policy.retry, cancel, LlmError::is_retryable, |attempt| {
        let call = op();
        async move {
            let result = match policy.timeout {
                Some(deadline) => match tokio::time::timeout(deadline, call).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::TimeoutError(format!(
                        "{} exceeded {}ms",
                        model.id,
                        deadline.as_millis()
                    ))),
                },
                None => call.await,
            };
            match &result {
                Ok((_, usage)) => recorder.record_call(
                    &model.id,
                    model.tier,
                    stage.as_str(),
                    true,
                    model.pricing.cost_usd(usage),
                    fallback_triggered,
                ),
                Err(e) => {
                    tracing::debug!(model = %model.id, %stage, attempt, error = %e, "model call failed");
                    recorder.record_call(
                        &model.id,
                        model.tier,
                        stage.as_str(),
                        false,
                        0.0,
                        fallback_triggered,
                    );
                }
            }
            result
        }
    })
    .await;

    match outcome {
        Ok((value, _)) => Ok(value),
        Err(RetryError::Failed(e)) => {
            if e.is_rate_limited() {
                recorder.mark_degraded(&model.id, e.message());
            }
            Err(e)
        }
        Err(RetryError::Cancelled) => Err(LlmError::Cancelled(format!(
            "{stage} call to {} cancelled",
            model.id
        ))),
    }
}

/// Primary completion model with an optional paid fallback.
#[derive(Clone)]
pub struct CompletionRouter {
    primary: Arc<dyn CompletionClient>,
    fallback: Option<Arc<dyn CompletionClient>>,
}

impl std::fmt::Debug for CompletionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRouter")
            .field("primary", &self.primary.descriptor().id)
            .field("fallback", &self.fallback.as_ref().map(|c| &c.descriptor().id))
            .finish()
    }
}

impl CompletionRouter {
    /// Route every call to `primary`.
    pub fn new(primary: Arc<dyn CompletionClient>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    /// Register the paid model used once the primary is rate limited.
    pub fn with_fallback(mut self, fallback: Arc<dyn CompletionClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// The primary model.
    pub fn primary(&self) -> &ModelDescriptor {
        self.primary.descriptor()
    }

    /// Complete `request`, rerouting to the fallback on a rate limit.
    ///
    /// # Errors
    ///
    /// Returns the primary's error when it fails for any other reason, the
    /// fallback's error when the fallback also fails, or
    /// [`LlmError::Cancelled`].
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        stage: Stage,
        policy: CallPolicy,
        recorder: &CostRecorder,
        cancel: &CancellationToken,
    ) -> Result<Completion, LlmError> {
        let primary_degraded = recorder.is_degraded(&self.primary.descriptor().id);
        if !primary_degraded {
            match self
                .call(&self.primary, request, stage, policy, recorder, cancel, false)
                .await
            {
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!(
                        model = %self.primary.descriptor().id,
                        %stage,
                        "model rate limited, rerouting to fallback"
                    );
                    if self.fallback.is_none() {
                        return Err(e);
                    }
                }
                other => return other,
            }
        }

        match &self.fallback {
            Some(fallback) => {
                self.call(fallback, request, stage, policy, recorder, cancel, true)
                    .await
            }
            None => Err(LlmError::RateLimited(format!(
                "{} is degraded and no fallback is configured",
                self.primary.descriptor().id
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn call(
        &self,
        client: &Arc<dyn CompletionClient>,
        request: &CompletionRequest,
        stage: Stage,
        policy: CallPolicy,
        recorder: &CostRecorder,
        cancel: &CancellationToken,
        fallback_triggered: bool,
    ) -> Result<Completion, LlmError> {
        call_model(
            client.descriptor(),
            stage,
            policy,
            recorder,
            cancel,
            fallback_triggered,
            || async move {
                let completion = client.complete(request).await?;
                if completion.text.trim().is_empty() {
                    return Err(LlmError::InvalidResponse(format!(
                        "{} returned an empty completion",
                        client.descriptor().id
                    )));
                }
                let usage = completion.usage;
                Ok((completion, usage))
            },
        )
        .await
    }
}
