//! Per-run state threaded through every stage.

use topicforge_search::CostRecorder;
use tokio_util::sync::CancellationToken;

use crate::error::{ResearchError, Result, Stage};
use crate::types::Degradation;

/// Topic, cost recorder, cancellation token, and the degradation log of a
/// single research run. Never shared between runs.
#[derive(Debug)]
pub struct RunContext {
    topic: String,
    recorder: CostRecorder,
    cancel: CancellationToken,
    degradations: Vec<Degradation>,
}

impl RunContext {
    /// Start a run.
    pub fn new(topic: impl Into<String>, recorder: CostRecorder, cancel: CancellationToken) -> Self {
        Self {
            topic: topic.into(),
            recorder,
            cancel,
            degradations: Vec::new(),
        }
    }

    /// Topic text.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The run's cost recorder.
    pub fn recorder(&self) -> &CostRecorder {
        &self.recorder
    }

    /// The run's cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The error returned when cancellation is observed in `stage`.
    pub fn cancelled(&self, stage: Stage) -> ResearchError {
        ResearchError::Cancelled {
            topic: self.topic.clone(),
            stage,
        }
    }

    /// Fail with [`ResearchError::Cancelled`] if the token has fired.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error for `stage`.
    pub fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!(topic = %self.topic, %stage, "research cancelled");
            return Err(self.cancelled(stage));
        }
        Ok(())
    }

    /// Record a non-fatal outcome.
    pub fn degrade(&mut self, degradation: Degradation) {
        tracing::warn!(topic = %self.topic, ?degradation, "run degraded");
        self.degradations.push(degradation);
    }

    /// Degradations so far, in order.
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// Consume the context, returning the degradation log.
    pub fn into_degradations(self) -> Vec<Degradation> {
        self.degradations
    }
}
