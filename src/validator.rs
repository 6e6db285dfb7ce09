//! Pre-flight topic scoring.
//!
//! Pure and CPU-only: topics are scored on keyword relevance, collector
//! diversity, freshness, a search-intent proxy, and novelty within the
//! batch, then filtered by threshold and truncated to the top N. Novelty
//! compares MinHash signatures from [`crate::dedup::minhash`] over topic
//! text.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ValidatorConfig, ValidatorWeights};
use crate::dedup::minhash::{MinHasher, Signature};
use crate::text;
use crate::types::{MarketConfig, Topic};

/// Relevance used when the market declares no seed keywords.
const NEUTRAL_RELEVANCE: f64 = 0.5;

/// Lower bound for the diversity metric.
const MIN_DIVERSITY: f64 = 0.2;

/// Per-metric topic scores, each in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicScoreBreakdown {
    /// Jaccard overlap with the seed keywords.
    pub relevance: f64,
    /// Share of collectors that surfaced the topic.
    pub diversity: f64,
    /// Age decay since discovery.
    pub freshness: f64,
    /// Position and query-length proxy for search intent.
    pub intent: f64,
    /// One minus the share of similar topics in the batch.
    pub novelty: f64,
    /// Weighted total.
    pub score: f64,
}

impl TopicScoreBreakdown {
    /// Weighted sum of the five metrics.
    pub fn weighted(&self, weights: &ValidatorWeights) -> f64 {
        self.relevance * weights.relevance
            + self.diversity * weights.diversity
            + self.freshness * weights.freshness
            + self.intent * weights.intent
            + self.novelty * weights.novelty
    }
}

/// A topic with its scores and pass/fail verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTopic {
    /// The scored topic, with `score` and `keyword_overlap` filled in.
    pub topic: Topic,
    /// Metric breakdown.
    pub breakdown: TopicScoreBreakdown,
    /// Whether `breakdown.score` reached the threshold.
    pub passed: bool,
}

/// Scores and filters candidate topics.
#[derive(Debug, Clone)]
pub struct TopicValidator {
    config: ValidatorConfig,
    hasher: MinHasher,
}

impl TopicValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let hasher = MinHasher::new(config.num_perm, config.shingle_size);
        Self { config, hasher }
    }

    /// Score every topic, in input order. Empty topics score zero and fail.
    pub fn score_all(
        &self,
        topics: &[Topic],
        market: &MarketConfig,
        now: DateTime<Utc>,
    ) -> Vec<ScoredTopic> {
        let seeds: HashSet<String> = market
            .seed_keywords
            .iter()
            .flat_map(|k| text::content_tokens(k))
            .collect();
        let similar = self.similar_counts(topics);
        let total = topics.len();

        topics
            .iter()
            .enumerate()
            .map(|(position, topic)| {
                let mut topic = topic.clone();
                if topic.text.trim().is_empty() {
                    tracing::debug!(position, "empty topic rejected");
                    topic.score = Some(0.0);
                    return ScoredTopic {
                        topic,
                        breakdown: TopicScoreBreakdown::default(),
                        passed: false,
                    };
                }

                let relevance = if seeds.is_empty() {
                    NEUTRAL_RELEVANCE
                } else {
                    text::jaccard(&text::token_set(&topic.text), &seeds)
                };
                let mut breakdown = TopicScoreBreakdown {
                    relevance,
                    diversity: self.diversity(topic.source_collectors.len()),
                    freshness: self.freshness(topic.discovered_at, now),
                    intent: self.intent(position, total, text::word_count(&topic.text)),
                    novelty: 1.0 - similar[position] as f64 / total as f64,
                    score: 0.0,
                };
                breakdown.score = breakdown.weighted(&self.config.weights).clamp(0.0, 1.0);
                let passed = breakdown.score >= self.config.threshold;

                topic.keyword_overlap = relevance;
                topic.score = Some(breakdown.score);
                if passed {
                    tracing::debug!(topic = %topic.text, score = breakdown.score, "topic validated");
                } else {
                    tracing::debug!(topic = %topic.text, score = breakdown.score, "topic rejected");
                }
                ScoredTopic {
                    topic,
                    breakdown,
                    passed,
                }
            })
            .collect()
    }

    /// Surviving topics scored against the current time.
    pub fn validate(&self, topics: &[Topic], market: &MarketConfig) -> Vec<ScoredTopic> {
        self.validate_at(topics, market, Utc::now())
    }

    /// Surviving topics ordered by descending score, ties broken by the
    /// earliest discovery time, truncated to `top_n`.
    pub fn validate_at(
        &self,
        topics: &[Topic],
        market: &MarketConfig,
        now: DateTime<Utc>,
    ) -> Vec<ScoredTopic> {
        let scored = self.score_all(topics, market, now);
        let survivors = rank(scored, self.config.top_n);
        tracing::info!(
            considered = topics.len(),
            passed = survivors.len(),
            threshold = self.config.threshold,
            "topics validated"
        );
        survivors
    }

    fn diversity(&self, collectors: usize) -> f64 {
        let total = self.config.total_collectors.max(1);
        (collectors as f64 / total as f64).clamp(MIN_DIVERSITY, 1.0)
    }

    fn freshness(&self, discovered_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let days = (now - discovered_at).num_seconds().max(0) as f64 / 86_400.0;
        (-days / self.config.freshness_decay_days).exp()
    }

    fn intent(&self, position: usize, total: usize, words: usize) -> f64 {
        let position_score = 1.0 - position as f64 / total.max(1) as f64;
        let length = (words as f64 / self.config.max_query_words.max(1) as f64).min(1.0);
        0.7 * position_score + 0.3 * (1.0 - length)
    }

    /// For each topic, how many other topics in the batch are similar to it.
    ///
    /// Every pair is compared: batches are small, and LSH banding would
    /// miss pairs near the novelty threshold.
    fn similar_counts(&self, topics: &[Topic]) -> Vec<usize> {
        let signatures: Vec<Option<Signature>> = topics
            .iter()
            .map(|t| self.hasher.signature(&t.text))
            .collect();
        let mut counts = vec![0; topics.len()];
        for (i, a) in signatures.iter().enumerate() {
            let Some(a) = a else { continue };
            for (j, b) in signatures.iter().enumerate().skip(i + 1) {
                let Some(b) = b else { continue };
                if a.similarity(b) >= self.config.novelty_threshold {
                    counts[i] += 1;
                    counts[j] += 1;
                }
            }
        }
        counts
    }
}

/// Keep passing topics, best first, earliest discovery on ties.
pub fn rank(scored: Vec<ScoredTopic>, top_n: usize) -> Vec<ScoredTopic> {
    let mut survivors: Vec<ScoredTopic> = scored.into_iter().filter(|s| s.passed).collect();
    survivors.sort_by(|a, b| {
        b.breakdown
            .score
            .partial_cmp(&a.breakdown.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.topic.discovered_at.cmp(&b.topic.discovered_at))
    });
    survivors.truncate(top_n);
    survivors
}
