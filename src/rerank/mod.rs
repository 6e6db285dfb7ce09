//! Three-stage reranker: BM25, lightweight embeddings, then full embeddings
//! blended with quality metrics.
//!
//! Each stage narrows the candidate set (`K1` → `K2` → `N`). Stages 2 and 3
//! fail open: when an embedding call fails, the previous stage's ordering is
//! carried forward and one [`Degradation::RerankDegraded`] is recorded for
//! the stage. Only cancellation aborts the reranker.

pub mod lexical;
pub mod metrics;
pub mod semantic;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::RerankConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Result, Stage};
use crate::llm::{CallPolicy, LlmError};
use crate::run::RunContext;
use crate::text;
use crate::types::{Degradation, Document, RankedSource, RerankStage, StageScores};

/// A document with the scores accumulated so far.
#[derive(Debug, Clone)]
pub struct RankedDocument {
    /// The document.
    pub document: Document,
    /// Per-stage scores.
    pub scores: StageScores,
}

/// Final ranking entries for the article, 1-based.
pub fn to_sources(ranked: &[RankedDocument]) -> Vec<RankedSource> {
    ranked
        .iter()
        .enumerate()
        .map(|(i, r)| RankedSource {
            document_id: r.document.id.clone(),
            url: r.document.url.clone(),
            stage_scores: r.scores.clone(),
            final_rank: i + 1,
        })
        .collect()
}

/// The reranker with its two embedders.
#[derive(Clone)]
pub struct Reranker {
    config: RerankConfig,
    lite: Option<Arc<dyn EmbeddingClient>>,
    full: Option<Arc<dyn EmbeddingClient>>,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("config", &self.config)
            .field("lite", &self.lite.as_ref().map(|c| &c.descriptor().id))
            .field("full", &self.full.as_ref().map(|c| &c.descriptor().id))
            .finish()
    }
}

impl Reranker {
    /// Create a reranker with no embedders; stages 2 and 3 will degrade.
    pub fn new(config: RerankConfig) -> Self {
        Self {
            config,
            lite: None,
            full: None,
        }
    }

    /// Set the stage-2 and stage-3 embedders.
    pub fn with_embedders(
        mut self,
        lite: Arc<dyn EmbeddingClient>,
        full: Arc<dyn EmbeddingClient>,
    ) -> Self {
        self.lite = Some(lite);
        self.full = Some(full);
        self
    }

    fn policy(&self) -> CallPolicy {
        CallPolicy::new(self.config.retry_attempts, self.config.retry_backoff_ms)
            .with_timeout(Duration::from_millis(self.config.embedding_timeout_ms))
    }

    /// Rerank `documents` for `query`, returning at most `final_top_n`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResearchError::Cancelled`] if the run is cancelled.
    pub async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        run: &mut RunContext,
    ) -> Result<Vec<RankedDocument>> {
        self.rerank_at(query, documents, Utc::now(), run).await
    }

    /// [`Reranker::rerank`] with an explicit clock for freshness.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResearchError::Cancelled`] if the run is cancelled.
    pub async fn rerank_at(
        &self,
        query: &str,
        documents: Vec<Document>,
        now: DateTime<Utc>,
        run: &mut RunContext,
    ) -> Result<Vec<RankedDocument>> {
        let input = documents.len();
        let stage1 = lexical::rank(query, documents, self.config.lexical_keep);
        run.checkpoint(Stage::Rerank)?;

        let stage2 = match self.semantic_lite(query, &stage1, run).await {
            Ok(order) => reorder(stage1, order),
            Err(e) => {
                self.degrade(RerankStage::SemanticLite, e, run)?;
                stage1
            }
        };
        run.checkpoint(Stage::Rerank)?;

        let stage2_len = stage2.len();
        let final_list = match self.semantic_full(query, &stage2, now, run).await {
            Ok(selection) => selection
                .into_iter()
                .filter_map(|(i, cosine, breakdown)| {
                    let mut ranked = stage2.get(i)?.clone();
                    ranked.scores.semantic_full = Some(cosine);
                    ranked.scores.metric_breakdown = Some(breakdown);
                    Some(ranked)
                })
                .collect(),
            Err(e) => {
                self.degrade(RerankStage::SemanticFull, e, run)?;
                let mut carried = stage2;
                carried.truncate(self.config.final_top_n);
                carried
            }
        };

        tracing::info!(
            input,
            stage2 = stage2_len,
            output = final_list.len(),
            "rerank complete"
        );
        Ok(final_list)
    }

    fn degrade(
        &self,
        stage: RerankStage,
        error: LlmError,
        run: &mut RunContext,
    ) -> Result<()> {
        if matches!(error, LlmError::Cancelled(_)) {
            return Err(run.cancelled(Stage::Rerank));
        }
        run.degrade(Degradation::RerankDegraded {
            stage,
            error: error.to_string(),
        });
        Ok(())
    }

    /// Stage 2: `(stage-1 index, cosine)` for the best `K2`, best first.
    async fn semantic_lite(
        &self,
        query: &str,
        candidates: &[RankedDocument],
        run: &RunContext,
    ) -> std::result::Result<Vec<(usize, f64)>, LlmError> {
        let client = self
            .lite
            .as_deref()
            .ok_or_else(|| LlmError::ConfigError("no lightweight embedder configured".into()))?;
        let texts = candidates
            .iter()
            .map(|r| {
                text::truncate_chars(&r.document.scoring_text(), self.config.lite_max_chars)
                    .to_owned()
            })
            .collect();
        let scores = semantic::similarities(client, query, texts, self.policy(), run).await?;

        let mut order: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        order.truncate(self.config.semantic_lite_keep);
        Ok(order)
    }

    /// Stage 3: `(stage-2 index, cosine, breakdown)` in final order.
    async fn semantic_full(
        &self,
        query: &str,
        candidates: &[RankedDocument],
        now: DateTime<Utc>,
        run: &RunContext,
    ) -> std::result::Result<Vec<(usize, f64, crate::types::MetricBreakdown)>, LlmError> {
        let client = self
            .full
            .as_deref()
            .ok_or_else(|| LlmError::ConfigError("no full embedder configured".into()))?;
        let texts = candidates
            .iter()
            .map(|r| {
                text::truncate_chars(&r.document.scoring_text(), self.config.full_max_chars)
                    .to_owned()
            })
            .collect();
        let cosines = semantic::similarities(client, query, texts, self.policy(), run).await?;

        let scored: Vec<_> = candidates
            .iter()
            .zip(&cosines)
            .map(|(r, &cosine)| {
                (
                    r.document.domain(),
                    metrics::static_metrics(&r.document, cosine, now, &self.config),
                )
            })
            .collect();
        Ok(
            metrics::select(&scored, &self.config.weights, self.config.final_top_n)
                .into_iter()
                .map(|(i, breakdown)| (i, cosines[i], breakdown))
                .collect(),
        )
    }
}

fn reorder(stage1: Vec<RankedDocument>, order: Vec<(usize, f64)>) -> Vec<RankedDocument> {
    let mut slots: Vec<Option<RankedDocument>> = stage1.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|(i, cosine)| {
            let mut ranked = slots.get_mut(i)?.take()?;
            ranked.scores.semantic_lite = Some(cosine);
            Some(ranked)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::collections::BTreeSet;

    use topicforge_search::{BackendId, CostRecorder, FusedCandidate, PageContent};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::embedding::testing::HashEmbedder;
    use crate::types::DocumentId;

    fn doc(i: usize, text: &str) -> Document {
        let url = format!("https://site{i}.com/page");
        let candidate = FusedCandidate {
            url: url.clone(),
            normalized_url: url.clone(),
            title: String::new(),
            snippet: String::new(),
            fusion_score: 1.0 / (60.0 + i as f64),
            contributing_backends: BTreeSet::from([BackendId::from("a")]),
        };
        let page = PageContent {
            url,
            title: String::new(),
            text: text.into(),
            word_count: 0,
            published_at: None,
        };
        Document::from_candidate(candidate, Some(page), None)
    }

    fn corpus(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    doc(i, &format!("offshore wind turbine auction round {i} capacity"))
                } else {
                    doc(i, &format!("wind farm supply chain note {i}"))
                }
            })
            .collect()
    }

    fn run() -> RunContext {
        RunContext::new("offshore wind", CostRecorder::new(), CancellationToken::new())
    }

    fn config() -> RerankConfig {
        RerankConfig {
            retry_backoff_ms: 0,
            ..RerankConfig::default()
        }
    }

    #[tokio::test]
    async fn narrows_through_all_three_stages() {
        let reranker = Reranker::new(config()).with_embedders(
            Arc::new(HashEmbedder::new("lite")),
            Arc::new(HashEmbedder::new("full")),
        );
        let mut run = run();
        let ranked = reranker
            .rerank("offshore wind turbine", corpus(30), &mut run)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 10, "min(N, K2)");
        assert!(run.degradations().is_empty());
        for r in &ranked {
            assert!(r.scores.semantic_lite.is_some());
            assert!(r.scores.semantic_full.is_some());
            let breakdown = r.scores.metric_breakdown.as_ref().unwrap();
            assert!((0.0..=1.0).contains(&breakdown.weighted_total));
        }
        let sources = to_sources(&ranked);
        assert_eq!(sources[0].final_rank, 1);
        assert_eq!(sources[9].final_rank, 10);
        assert_eq!(run.recorder().records().len(), 2);
    }

    #[tokio::test]
    async fn stage_two_failure_carries_stage_one_forward() {
        let reranker = Reranker::new(config()).with_embedders(
            Arc::new(HashEmbedder::failing(
                "lite",
                LlmError::TimeoutError("3000ms".into()),
            )),
            Arc::new(HashEmbedder::new("full")),
        );
        let mut run = run();
        let ranked = reranker
            .rerank("offshore wind turbine", corpus(30), &mut run)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 15, "all K1 survivors reach stage 3");
        assert!(ranked.iter().all(|r| r.scores.semantic_lite.is_none()));
        assert!(ranked.iter().all(|r| r.scores.semantic_full.is_some()));
        assert_eq!(
            run.degradations(),
            &[Degradation::RerankDegraded {
                stage: RerankStage::SemanticLite,
                error: "[TIMEOUT_ERROR] 3000ms".into(),
            }]
        );
    }

    #[tokio::test]
    async fn failed_lite_stage_passes_stage_one_order_through_unchanged() {
        let reranker = Reranker::new(config()).with_embedders(
            Arc::new(HashEmbedder::failing(
                "lite",
                LlmError::ProviderError("HTTP 503".into()),
            )),
            Arc::new(HashEmbedder::failing(
                "full",
                LlmError::ProviderError("HTTP 503".into()),
            )),
        );
        let query = "offshore wind turbine";
        let mut run = run();
        let ranked = reranker.rerank(query, corpus(30), &mut run).await.unwrap();

        let lexical_order: Vec<DocumentId> =
            lexical::rank(query, corpus(30), config().lexical_keep)
                .into_iter()
                .map(|r| r.document.id)
                .collect();
        let ids: Vec<DocumentId> = ranked.iter().map(|r| r.document.id.clone()).collect();
        assert_eq!(ids.len(), 15);
        assert_eq!(ids, lexical_order);

        let lite_events = run
            .degradations()
            .iter()
            .filter(|d| {
                matches!(
                    d,
                    Degradation::RerankDegraded {
                        stage: RerankStage::SemanticLite,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(lite_events, 1);
    }

    #[tokio::test]
    async fn stage_three_failure_keeps_stage_two_order() {
        let reranker = Reranker::new(RerankConfig {
            final_top_n: 5,
            ..config()
        })
        .with_embedders(
            Arc::new(HashEmbedder::new("lite")),
            Arc::new(HashEmbedder::failing(
                "full",
                LlmError::ProviderError("HTTP 500".into()),
            )),
        );
        let mut run = run();
        let ranked = reranker
            .rerank("offshore wind turbine", corpus(30), &mut run)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 5);
        let lite: Vec<f64> = ranked
            .iter()
            .map(|r| r.scores.semantic_lite.unwrap())
            .collect();
        assert!(lite.windows(2).all(|w| w[0] >= w[1]));
        assert!(ranked.iter().all(|r| r.scores.metric_breakdown.is_none()));
        assert!(matches!(
            run.degradations(),
            [Degradation::RerankDegraded { stage: RerankStage::SemanticFull, .. }]
        ));
    }

    #[tokio::test]
    async fn without_embedders_both_stages_degrade() {
        let reranker = Reranker::new(config());
        let mut run = run();
        let ranked = reranker
            .rerank("offshore wind", corpus(4), &mut run)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 4);
        assert_eq!(run.degradations().len(), 2);
    }

    #[tokio::test]
    async fn fewer_documents_than_every_cutoff() {
        let reranker = Reranker::new(config()).with_embedders(
            Arc::new(HashEmbedder::new("lite")),
            Arc::new(HashEmbedder::new("full")),
        );
        let ranked = reranker
            .rerank("offshore wind", corpus(3), &mut run())
            .await
            .unwrap();
        assert_eq!(ranked.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts() {
        let reranker = Reranker::new(config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut run = RunContext::new("t", CostRecorder::new(), cancel);
        let err = reranker
            .rerank("offshore wind", corpus(4), &mut run)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Rerank));
    }
}
