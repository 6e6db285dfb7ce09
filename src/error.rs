//! Error types for the research pipeline.
//!
//! [`ResearchError`] covers the outcomes that end a run. Each variant names
//! the topic and, where relevant, the [`Stage`] it failed in, so a batch
//! caller can decide whether to retry, skip, or alert. Non-fatal outcomes
//! are not errors: they are collected as [`crate::types::Degradation`]
//! values on the returned article.

use serde::{Deserialize, Serialize};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Topic pre-flight checks.
    Validate,
    /// Backend fan-out.
    Search,
    /// Rank fusion.
    Fusion,
    /// Page fetch and near-duplicate removal.
    Dedup,
    /// Three-stage reranking.
    Rerank,
    /// Passage extraction.
    Extract,
    /// Article synthesis.
    Synthesis,
}

impl Stage {
    /// Stable lowercase name used in logs and cost records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Search => "search",
            Self::Fusion => "fusion",
            Self::Dedup => "dedup",
            Self::Rerank => "rerank",
            Self::Extract => "extract",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors for a single research run.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// Empty or whitespace-only topic text, rejected before any network call.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Search, fusion, and dedup produced no usable documents.
    #[error("no sources found for topic {topic:?}: {detail}")]
    NoSourcesFound {
        /// Topic text.
        topic: String,
        /// What the search layer reported.
        detail: String,
    },

    /// The synthesis call failed after its retry budget.
    #[error("synthesis failed for topic {topic:?}: {cause}")]
    SynthesisFailed {
        /// Topic text.
        topic: String,
        /// Underlying cause.
        cause: String,
    },

    /// The run was cancelled; no partial article is returned.
    #[error("research for topic {topic:?} cancelled during {stage}")]
    Cancelled {
        /// Topic text.
        topic: String,
        /// Stage that was running when cancellation was observed.
        stage: Stage,
    },

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error (config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResearchError {
    /// The stage this error belongs to, when it is stage-specific.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidTopic(_) => Some(Stage::Validate),
            Self::NoSourcesFound { .. } => Some(Stage::Dedup),
            Self::SynthesisFailed { .. } => Some(Stage::Synthesis),
            Self::Cancelled { stage, .. } => Some(*stage),
            Self::Config(_) | Self::Io(_) => None,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ResearchError>;
