//! Reciprocal Rank Fusion over per-backend ranked lists.
//!
//! Each result contributes `1 / (k + rank)`; results sharing a normalised
//! URL sum their contributions. Output is sorted by descending fusion score
//! with a fully deterministic tie-break:
//!
//! 1. rank at first appearance (backends processed in the order given),
//! 2. normalised URL, lexically.
//!
//! Contributions are summed in ascending-rank order so that candidates with
//! the same multiset of ranks produce bit-identical scores.

use std::collections::{BTreeSet, HashMap};

use crate::types::{BackendId, FusedCandidate, SearchResult};
use crate::url_normalize::normalize_url;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Per-URL accumulation state.
struct Accumulator {
    first: SearchResult,
    normalized_url: String,
    first_seen_rank: usize,
    best_rank_per_backend: HashMap<BackendId, usize>,
}

/// Contribution of a single 1-based rank.
pub fn rrf_contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuse ranked lists into one list ordered by descending RRF score.
///
/// `lists` are processed in order; a URL repeated within one backend's list
/// only counts at its best rank. Pure function: no I/O, no randomness.
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchResult>], k: f64) -> Vec<FusedCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Accumulator> = HashMap::new();

    for list in lists {
        for result in list {
            let key = normalize_url(&result.url);
            match groups.get_mut(&key) {
                Some(acc) => {
                    acc.best_rank_per_backend
                        .entry(result.backend_id.clone())
                        .and_modify(|r| *r = (*r).min(result.rank))
                        .or_insert(result.rank);
                }
                None => {
                    let mut best = HashMap::new();
                    best.insert(result.backend_id.clone(), result.rank);
                    order.push(key.clone());
                    groups.insert(
                        key.clone(),
                        Accumulator {
                            first: result.clone(),
                            normalized_url: key,
                            first_seen_rank: result.rank,
                            best_rank_per_backend: best,
                        },
                    );
                }
            }
        }
    }

    let mut fused: Vec<(usize, FusedCandidate)> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|acc| {
            let mut ranks: Vec<usize> = acc.best_rank_per_backend.values().copied().collect();
            ranks.sort_unstable();
            let fusion_score = ranks.iter().map(|&r| rrf_contribution(r, k)).sum();
            let contributing_backends: BTreeSet<BackendId> =
                acc.best_rank_per_backend.into_keys().collect();
            (
                acc.first_seen_rank,
                FusedCandidate {
                    url: acc.first.url,
                    normalized_url: acc.normalized_url,
                    title: acc.first.title,
                    snippet: acc.first.snippet,
                    fusion_score,
                    contributing_backends,
                },
            )
        })
        .collect();

    fused.sort_by(|(rank_a, a), (rank_b, b)| {
        b.fusion_score
            .total_cmp(&a.fusion_score)
            .then_with(|| rank_a.cmp(rank_b))
            .then_with(|| a.normalized_url.cmp(&b.normalized_url))
    });

    fused.into_iter().map(|(_, candidate)| candidate).collect()
}
