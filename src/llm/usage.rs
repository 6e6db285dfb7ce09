//! Token usage and per-call pricing.
//!
//! ```
//! use topicforge::llm::usage::{TokenPricing, TokenUsage};
//!
//! let usage = TokenUsage::new(1_000_000, 500_000);
//! let pricing = TokenPricing::new(3.0, 15.0);
//! assert!((pricing.cost_usd(&usage) - 10.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens.
    pub prompt_tokens: u64,
    /// Output tokens (zero for embeddings).
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Create a usage record.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Prompt plus completion tokens.
    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Accumulate another record into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
    }
}

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    /// Input rate.
    pub input_per_1m: f64,
    /// Output rate.
    pub output_per_1m: f64,
}

impl TokenPricing {
    /// Create a pricing record.
    pub fn new(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self {
            input_per_1m,
            output_per_1m,
        }
    }

    /// Pricing for self-hosted or free-tier models.
    pub fn free() -> Self {
        Self::default()
    }

    /// Whether every call at this pricing costs nothing.
    pub fn is_free(&self) -> bool {
        self.input_per_1m == 0.0 && self.output_per_1m == 0.0
    }

    /// USD cost of `usage`.
    pub fn cost_usd(&self, usage: &TokenUsage) -> f64 {
        // Multiply before dividing to keep precision on small counts
        (usage.prompt_tokens as f64 * self.input_per_1m
            + usage.completion_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}
