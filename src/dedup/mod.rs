//! Page fetch and near-duplicate removal.
//!
//! Fused candidates are fetched in fusion order with bounded concurrency.
//! Fetch failures fail open: the candidate stays in the pool as a unique
//! document with no signature. Fetched pages get a MinHash signature, and
//! documents are then walked greedily in descending fusion order; a
//! document whose estimated Jaccard against an already kept document is at
//! or above the threshold is dropped in favour of the earlier one.

pub mod minhash;

use std::collections::BTreeMap;

use futures_util::stream::{self, StreamExt};
use topicforge_search::{FusedCandidate, PageFetcher};

use crate::config::DedupConfig;
use crate::error::{Result, Stage};
use crate::run::RunContext;
use crate::types::{Degradation, Document, DocumentId, DroppedDuplicate};

use self::minhash::{LshIndex, MinHasher};

/// Documents that survived dedup, plus the ones dropped.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Unique documents in fusion order.
    pub kept: Vec<Document>,
    /// Near-duplicates removed, in the order they were found.
    pub dropped: Vec<DroppedDuplicate>,
}

/// Fetches candidate pages and removes near-duplicates.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    config: DedupConfig,
    hasher: MinHasher,
}

impl Deduplicator {
    /// Create a deduplicator.
    pub fn new(config: DedupConfig) -> Self {
        let hasher = MinHasher::new(config.num_perm, config.shingle_size);
        Self { config, hasher }
    }

    /// Fetch up to `max_candidates` pages and build documents, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResearchError::Cancelled`] if the run is cancelled
    /// while pages are in flight. Individual fetch failures are recorded as
    /// [`Degradation::FetchFailed`] and never fail the call.
    pub async fn fetch_documents(
        &self,
        candidates: Vec<FusedCandidate>,
        fetcher: &dyn PageFetcher,
        run: &mut RunContext,
    ) -> Result<Vec<Document>> {
        let concurrency = self.config.fetch_concurrency.max(1);
        let fetches = stream::iter(candidates.into_iter().take(self.config.max_candidates))
            .map(|candidate| async move {
                let page = fetcher.fetch_page(&candidate.url).await;
                (candidate, page)
            })
            .buffered(concurrency)
            .collect::<Vec<_>>();

        let cancel = run.cancel_token().clone();
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(run.cancelled(Stage::Dedup)),
            fetched = fetches => fetched,
        };

        let mut documents = Vec::with_capacity(fetched.len());
        for (candidate, page) in fetched {
            match page {
                Ok(page) => {
                    let signature = self.hasher.signature(&page.text);
                    documents.push(Document::from_candidate(candidate, Some(page), signature));
                }
                Err(e) => {
                    run.degrade(Degradation::FetchFailed {
                        url: candidate.url.clone(),
                        error: e.to_string(),
                    });
                    documents.push(Document::from_candidate(candidate, None, None));
                }
            }
        }
        Ok(documents)
    }

    /// Greedy near-duplicate removal over `documents` in the given order.
    ///
    /// Documents without a signature are always kept. Running this on its
    /// own output drops nothing.
    pub fn deduplicate(&self, documents: Vec<Document>) -> DedupOutcome {
        let mut index = LshIndex::new(self.config.num_perm, self.config.bands);
        let mut outcome = DedupOutcome::default();
        let mut clusters: BTreeMap<DocumentId, usize> = BTreeMap::new();

        for document in documents {
            let Some(signature) = document.shingle_signature.as_ref() else {
                outcome.kept.push(document);
                continue;
            };

            let best = index
                .candidates(signature)
                .into_iter()
                .filter_map(|i| {
                    let kept = outcome.kept.get(i)?;
                    let similarity = kept.shingle_signature.as_ref()?.similarity(signature);
                    Some((i, similarity))
                })
                .filter(|(_, similarity)| *similarity >= self.config.threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

            match best {
                Some((i, similarity)) => {
                    let keeper = &outcome.kept[i];
                    *clusters.entry(keeper.id.clone()).or_insert(1) += 1;
                    tracing::debug!(
                        dropped = %document.url,
                        kept = %keeper.url,
                        similarity,
                        "near-duplicate dropped"
                    );
                    outcome.dropped.push(DroppedDuplicate {
                        document_id: document.id.clone(),
                        url: document.url.clone(),
                        duplicate_of: keeper.id.clone(),
                        similarity,
                    });
                }
                None => {
                    index.insert(outcome.kept.len(), signature);
                    outcome.kept.push(document);
                }
            }
        }

        for (keeper, size) in &clusters {
            tracing::debug!(document = %keeper, size, "duplicate cluster");
        }
        tracing::info!(
            kept = outcome.kept.len(),
            dropped = outcome.dropped.len(),
            clusters = clusters.len(),
            "dedup complete"
        );
        outcome
    }
}
