//! Stage-3 quality metrics and diversity-aware final selection.
//!
//! Every metric is in `[0, 1]`. Diversity depends on what has already been
//! selected, so the final list is built greedily: at each step the
//! candidate with the highest weighted total (given the current selection)
//! is appended.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::{MetricWeights, RerankConfig};
use crate::text;
use crate::types::{Document, MetricBreakdown};

/// Score used when a page declares no publication time.
const UNKNOWN_FRESHNESS: f64 = 0.5;

/// Authority for documents whose URL has no parseable host.
const UNKNOWN_AUTHORITY: f64 = 0.3;

/// Domain authority from the host name.
///
/// Government and academic suffixes score highest, then the configured
/// trusted list, then `.org`, then everything else.
pub fn authority(domain: Option<&str>, trusted: &[String]) -> f64 {
    let Some(domain) = domain else {
        return UNKNOWN_AUTHORITY;
    };
    let domain = domain.to_ascii_lowercase();
    let matches = |suffix: &str| domain == suffix || domain.ends_with(&format!(".{suffix}"));

    if ["gov", "edu", "mil", "gov.uk", "ac.uk", "gc.ca"]
        .iter()
        .any(|&s| matches(s))
    {
        1.0
    } else if trusted.iter().any(|t| matches(t.trim_start_matches('.'))) {
        0.9
    } else if matches("org") {
        0.7
    } else {
        0.5
    }
}

/// Exponential decay `e^(-age_days / decay_days)`; unknown dates score 0.5.
pub fn freshness(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>, decay_days: f64) -> f64 {
    match published_at {
        Some(published) => {
            let age_days = (now - published).num_seconds().max(0) as f64 / 86_400.0;
            (-age_days / decay_days).exp()
        }
        None => UNKNOWN_FRESHNESS,
    }
}

/// Share of tokens that are content words rather than stopwords.
pub fn density(text: &str) -> f64 {
    let all = text::tokens(text);
    if all.is_empty() {
        return 0.0;
    }
    let content = all.iter().filter(|t| !text::is_stopword(t)).count();
    content as f64 / all.len() as f64
}

/// Share of sentences carrying a figure or a direct quotation.
pub fn citation_worthiness(text: &str) -> f64 {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 3)
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    let citable = sentences
        .iter()
        .filter(|s| {
            s.chars()
                .any(|c| c.is_ascii_digit() || matches!(c, '"' | '\u{201c}' | '%'))
        })
        .count();
    citable as f64 / sentences.len() as f64
}

/// 1.0 inside `[min_words, max_words]`, falling off proportionally outside.
pub fn length_adequacy(words: usize, min_words: usize, max_words: usize) -> f64 {
    if words == 0 {
        0.0
    } else if words < min_words {
        words as f64 / min_words as f64
    } else if words > max_words {
        max_words as f64 / words as f64
    } else {
        1.0
    }
}

/// Weighted sum of the metrics in `breakdown`.
pub fn weighted_total(breakdown: &MetricBreakdown, weights: &MetricWeights) -> f64 {
    breakdown.semantic * weights.semantic
        + breakdown.authority * weights.authority
        + breakdown.freshness * weights.freshness
        + breakdown.density * weights.density
        + breakdown.diversity * weights.diversity
        + breakdown.citation_worthiness * weights.citation_worthiness
        + breakdown.length_adequacy * weights.length_adequacy
}

/// Selection-independent metrics for one document; diversity is left at 0.
pub fn static_metrics(
    document: &Document,
    semantic_full: f64,
    now: DateTime<Utc>,
    config: &RerankConfig,
) -> MetricBreakdown {
    let body = if document.full_text.is_empty() {
        document.snippet.as_str()
    } else {
        document.full_text.as_str()
    };
    MetricBreakdown {
        semantic: semantic_full.clamp(0.0, 1.0),
        authority: authority(document.domain().as_deref(), &config.authority_domains),
        freshness: freshness(document.published_at, now, config.freshness_decay_days),
        density: density(body),
        diversity: 0.0,
        citation_worthiness: citation_worthiness(body),
        length_adequacy: length_adequacy(
            text::word_count(&document.full_text),
            config.min_words,
            config.max_words,
        ),
        weighted_total: 0.0,
    }
}

/// Greedy diversity-aware selection of up to `top_n` candidates.
///
/// `candidates` pairs each document's domain with its static metrics, in
/// stage-2 order. Returns `(candidate index, final breakdown)` in selection
/// order. Ties go to the earlier candidate.
pub fn select(
    candidates: &[(Option<String>, MetricBreakdown)],
    weights: &MetricWeights,
    top_n: usize,
) -> Vec<(usize, MetricBreakdown)> {
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut domain_counts: HashMap<Option<&str>, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(top_n.min(candidates.len()));

    while selected.len() < top_n && !remaining.is_empty() {
        let mut best: Option<(usize, MetricBreakdown)> = None;
        for (pos, &i) in remaining.iter().enumerate() {
            let (domain, base) = &candidates[i];
            let seen = domain_counts.get(&domain.as_deref()).copied().unwrap_or(0);
            let mut breakdown = base.clone();
            breakdown.diversity = 1.0 / (1.0 + seen as f64);
            breakdown.weighted_total = weighted_total(&breakdown, weights);
            let better = match &best {
                Some((_, current)) => breakdown.weighted_total > current.weighted_total,
                None => true,
            };
            if better {
                best = Some((pos, breakdown));
            }
        }
        let Some((pos, breakdown)) = best else {
            break;
        };
        let i = remaining.remove(pos);
        *domain_counts.entry(candidates[i].0.as_deref()).or_insert(0) += 1;
        selected.push((i, breakdown));
    }
    selected
}
