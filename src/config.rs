//! Engine configuration with sensible defaults.
//!
//! [`EngineConfig`] is a TOML document; every section and field is
//! optional and falls back to its default. Credentials are not part of the
//! config: backends and model clients receive keys at construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use topicforge_search::SearchConfig;

use crate::error::{ResearchError, Result};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend fan-out and fusion.
    pub search: SearchConfig,
    /// Page fetch and near-duplicate removal.
    pub dedup: DedupConfig,
    /// Three-stage reranker.
    pub rerank: RerankConfig,
    /// Passage extraction.
    pub extract: ExtractConfig,
    /// Article synthesis.
    pub synth: SynthConfig,
    /// Topic validator.
    pub validator: ValidatorConfig,
    /// Cost reporting and batch scheduling.
    pub cost: CostConfig,
}

/// Deduplicator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// MinHash permutations.
    pub num_perm: usize,
    /// LSH bands; must divide `num_perm`.
    pub bands: usize,
    /// Tokens per shingle.
    pub shingle_size: usize,
    /// Estimated Jaccard at or above which two documents are duplicates.
    pub threshold: f64,
    /// Fused candidates carried into dedup (pages fetched).
    pub max_candidates: usize,
    /// Concurrent page fetches.
    pub fetch_concurrency: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            num_perm: 128,
            bands: 32,
            shingle_size: 5,
            threshold: 0.8,
            max_candidates: 50,
            fetch_concurrency: 4,
        }
    }
}

/// Stage-3 metric weights. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWeights {
    /// Full embedding similarity.
    pub semantic: f64,
    /// Domain authority.
    pub authority: f64,
    /// Freshness.
    pub freshness: f64,
    /// Information density.
    pub density: f64,
    /// Source diversity.
    pub diversity: f64,
    /// Citation-worthiness.
    pub citation_worthiness: f64,
    /// Length adequacy.
    pub length_adequacy: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            semantic: 0.40,
            authority: 0.15,
            freshness: 0.10,
            density: 0.10,
            diversity: 0.10,
            citation_worthiness: 0.10,
            length_adequacy: 0.05,
        }
    }
}

impl MetricWeights {
    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.semantic
            + self.authority
            + self.freshness
            + self.density
            + self.diversity
            + self.citation_worthiness
            + self.length_adequacy
    }

    fn all(&self) -> [f64; 7] {
        [
            self.semantic,
            self.authority,
            self.freshness,
            self.density,
            self.diversity,
            self.citation_worthiness,
            self.length_adequacy,
        ]
    }
}

/// Reranker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Stage-1 survivors (K1).
    pub lexical_keep: usize,
    /// Stage-2 survivors (K2).
    pub semantic_lite_keep: usize,
    /// Final source count (N).
    pub final_top_n: usize,
    /// Deadline for one embedding call, in milliseconds.
    pub embedding_timeout_ms: u64,
    /// Attempts per embedding call (1..=3).
    pub retry_attempts: u32,
    /// Base retry backoff in milliseconds.
    pub retry_backoff_ms: u64,
    /// Characters of each document sent to the lite embedder.
    pub lite_max_chars: usize,
    /// Characters of each document sent to the full embedder.
    pub full_max_chars: usize,
    /// Stage-3 metric weights.
    pub weights: MetricWeights,
    /// Domains treated as highly authoritative (suffix match).
    pub authority_domains: Vec<String>,
    /// Freshness decay constant in days.
    pub freshness_decay_days: f64,
    /// Below this word count, length adequacy falls off linearly.
    pub min_words: usize,
    /// Above this word count, length adequacy falls off.
    pub max_words: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            lexical_keep: 15,
            semantic_lite_keep: 10,
            final_top_n: 25,
            embedding_timeout_ms: 3_000,
            retry_attempts: 2,
            retry_backoff_ms: 200,
            lite_max_chars: 1_000,
            full_max_chars: 6_000,
            weights: MetricWeights::default(),
            authority_domains: [
                "wikipedia.org",
                "nature.com",
                "science.org",
                "reuters.com",
                "apnews.com",
                "bbc.co.uk",
                "who.int",
                "europa.eu",
                "nih.gov",
                "arxiv.org",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            freshness_decay_days: 30.0,
            min_words: 300,
            max_words: 5_000,
        }
    }
}

/// Passage extractor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Paragraphs are merged until a passage reaches this many words.
    pub passage_min_words: usize,
    /// Passages longer than this are split.
    pub passage_max_words: usize,
    /// Lexical candidates kept per document.
    pub candidates_per_document: usize,
    /// Total lexical candidates offered to the selection call.
    pub max_candidates: usize,
    /// Passages kept for synthesis.
    pub max_passages: usize,
    /// Documents fed to the LLM-only strategy.
    pub llm_only_documents: usize,
    /// Characters of each document fed to the LLM-only strategy.
    pub llm_only_chars_per_document: usize,
    /// Completion token cap for selection calls.
    pub max_tokens: u32,
    /// Attempts per LLM call (1..=3).
    pub retry_attempts: u32,
    /// Base retry backoff in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            passage_min_words: 40,
            passage_max_words: 180,
            candidates_per_document: 4,
            max_candidates: 40,
            max_passages: 12,
            llm_only_documents: 5,
            llm_only_chars_per_document: 6_000,
            max_tokens: 2_000,
            retry_attempts: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Synthesizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Advisory article length.
    pub target_words: usize,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Attempts for the synthesis call (1..=3).
    pub retry_attempts: u32,
    /// Base retry backoff in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            target_words: 2_000,
            max_tokens: 4_096,
            temperature: 0.4,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Validator metric weights. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorWeights {
    /// Keyword relevance.
    pub relevance: f64,
    /// Source diversity.
    pub diversity: f64,
    /// Freshness.
    pub freshness: f64,
    /// Search-intent signal.
    pub intent: f64,
    /// Novelty.
    pub novelty: f64,
}

impl Default for ValidatorWeights {
    fn default() -> Self {
        Self {
            relevance: 0.30,
            diversity: 0.25,
            freshness: 0.20,
            intent: 0.15,
            novelty: 0.10,
        }
    }
}

impl ValidatorWeights {
    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.relevance + self.diversity + self.freshness + self.intent + self.novelty
    }
}

/// Topic validator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Metric weights.
    pub weights: ValidatorWeights,
    /// Minimum score to pass.
    pub threshold: f64,
    /// Maximum topics returned.
    pub top_n: usize,
    /// Number of discovery collectors in the deployment.
    pub total_collectors: usize,
    /// Freshness decay constant in days (`e^(-days/decay)`).
    pub freshness_decay_days: f64,
    /// Word count at which the query-length penalty saturates.
    pub max_query_words: usize,
    /// Estimated Jaccard at or above which two topics are "similar".
    pub novelty_threshold: f64,
    /// MinHash permutations for topic text.
    pub num_perm: usize,
    /// Tokens per shingle for topic text.
    pub shingle_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            weights: ValidatorWeights::default(),
            threshold: 0.6,
            top_n: 20,
            total_collectors: 5,
            freshness_decay_days: 7.0,
            max_query_words: 12,
            novelty_threshold: 0.5,
            num_perm: 64,
            shingle_size: 2,
        }
    }
}

/// Cost reporting and batch scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// A run costing more than this logs a warning. `0` disables the check.
    pub warn_run_cost_usd: f64,
    /// Topics researched concurrently by `research_batch`.
    pub batch_concurrency: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            warn_run_cost_usd: 0.50,
            batch_concurrency: 2,
        }
    }
}

fn check(ok: bool, message: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(ResearchError::Config(message.to_owned()))
    }
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl EngineConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.search
            .validate()
            .map_err(|e| ResearchError::Config(e.to_string()))?;

        let d = &self.dedup;
        check(d.num_perm > 0, "dedup.num_perm must be greater than 0")?;
        check(
            d.bands > 0 && d.num_perm % d.bands == 0,
            "dedup.bands must divide dedup.num_perm",
        )?;
        check(d.shingle_size > 0, "dedup.shingle_size must be greater than 0")?;
        check(unit_interval(d.threshold), "dedup.threshold must be within [0, 1]")?;
        check(d.max_candidates > 0, "dedup.max_candidates must be greater than 0")?;
        check(d.fetch_concurrency > 0, "dedup.fetch_concurrency must be greater than 0")?;

        let r = &self.rerank;
        check(r.final_top_n > 0, "rerank.final_top_n must be greater than 0")?;
        check(r.semantic_lite_keep > 0, "rerank.semantic_lite_keep must be greater than 0")?;
        check(
            r.lexical_keep >= r.semantic_lite_keep,
            "rerank.lexical_keep must be at least rerank.semantic_lite_keep",
        )?;
        check(
            (1..=3).contains(&r.retry_attempts),
            "rerank.retry_attempts must be between 1 and 3",
        )?;
        check(r.embedding_timeout_ms > 0, "rerank.embedding_timeout_ms must be greater than 0")?;
        check(
            r.weights.all().iter().all(|w| *w >= 0.0)
                && (r.weights.sum() - 1.0).abs() <= WEIGHT_TOLERANCE,
            "rerank.weights must be non-negative and sum to 1.0",
        )?;
        check(r.freshness_decay_days > 0.0, "rerank.freshness_decay_days must be positive")?;
        check(
            r.min_words > 0 && r.max_words > r.min_words,
            "rerank.max_words must exceed rerank.min_words",
        )?;

        let e = &self.extract;
        check(e.passage_min_words > 0, "extract.passage_min_words must be greater than 0")?;
        check(
            e.passage_max_words >= e.passage_min_words,
            "extract.passage_max_words must be at least extract.passage_min_words",
        )?;
        check(e.max_passages > 0, "extract.max_passages must be greater than 0")?;
        check(e.max_candidates > 0, "extract.max_candidates must be greater than 0")?;
        check(e.llm_only_documents > 0, "extract.llm_only_documents must be greater than 0")?;
        check(
            (1..=3).contains(&e.retry_attempts),
            "extract.retry_attempts must be between 1 and 3",
        )?;

        let s = &self.synth;
        check(s.target_words > 0, "synth.target_words must be greater than 0")?;
        check(
            (1..=3).contains(&s.retry_attempts),
            "synth.retry_attempts must be between 1 and 3",
        )?;

        let v = &self.validator;
        let weights = [
            v.weights.relevance,
            v.weights.diversity,
            v.weights.freshness,
            v.weights.intent,
            v.weights.novelty,
        ];
        check(
            weights.iter().all(|w| *w >= 0.0) && (v.weights.sum() - 1.0).abs() <= WEIGHT_TOLERANCE,
            "validator.weights must be non-negative and sum to 1.0",
        )?;
        check(unit_interval(v.threshold), "validator.threshold must be within [0, 1]")?;
        check(v.top_n > 0, "validator.top_n must be greater than 0")?;
        check(v.total_collectors > 0, "validator.total_collectors must be greater than 0")?;
        check(v.freshness_decay_days > 0.0, "validator.freshness_decay_days must be positive")?;
        check(v.max_query_words > 0, "validator.max_query_words must be greater than 0")?;
        check(
            unit_interval(v.novelty_threshold),
            "validator.novelty_threshold must be within [0, 1]",
        )?;
        check(v.num_perm > 0, "validator.num_perm must be greater than 0")?;

        check(self.cost.batch_concurrency > 0, "cost.batch_concurrency must be greater than 0")?;
        check(self.cost.warn_run_cost_usd >= 0.0, "cost.warn_run_cost_usd must not be negative")?;
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ResearchError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ResearchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/topicforge/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("topicforge").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("topicforge")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/topicforge-config/config.toml")
        }
    }
}
