//! Research orchestrator that wires every stage together.
//!
//! One [`ResearchEngine::research`] call is one run: search fan-out and
//! fusion, page fetch and dedup, three-stage rerank, passage extraction,
//! and synthesis. Each run owns its [`topicforge_search::CostRecorder`] and
//! degradation log, so concurrent runs share no mutable state.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use topicforge_search::{
    search_and_fuse, BackendPool, FanoutReport, FusedCandidate, PageFetcher, SearchError,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dedup::Deduplicator;
use crate::embedding::EmbeddingClient;
use crate::error::{ResearchError, Result, Stage};
use crate::extract::PassageExtractor;
use crate::llm::CompletionRouter;
use crate::rerank::{self, Reranker};
use crate::run::RunContext;
use crate::synth::Synthesizer;
use crate::types::{Article, Degradation, MarketConfig, Topic};

/// The research engine. Cheap to share behind an `Arc`; holds no per-run state.
#[derive(Clone)]
pub struct ResearchEngine {
    config: EngineConfig,
    pool: BackendPool,
    fetcher: Arc<dyn PageFetcher>,
    dedup: Deduplicator,
    reranker: Reranker,
    selector: CompletionRouter,
    long_context: CompletionRouter,
    synthesis: CompletionRouter,
}

impl std::fmt::Debug for ResearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchEngine")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("reranker", &self.reranker)
            .field("selector", &self.selector)
            .field("long_context", &self.long_context)
            .field("synthesis", &self.synthesis)
            .finish_non_exhaustive()
    }
}

impl ResearchEngine {
    /// Build an engine. `llm` serves passage selection, the long-context
    /// fallback, and synthesis until overridden with the `with_*` methods.
    /// Without embedders, rerank stages 2 and 3 degrade on every run.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::Config`] if `config` is invalid.
    pub fn new(
        config: EngineConfig,
        pool: BackendPool,
        fetcher: Arc<dyn PageFetcher>,
        llm: CompletionRouter,
    ) -> Result<Self> {
        config.validate()?;
        if pool.is_empty() {
            return Err(ResearchError::Config(
                "at least one search backend is required".into(),
            ));
        }
        Ok(Self {
            dedup: Deduplicator::new(config.dedup.clone()),
            reranker: Reranker::new(config.rerank.clone()),
            selector: llm.clone(),
            long_context: llm.clone(),
            synthesis: llm,
            config,
            pool,
            fetcher,
        })
    }

    /// Set the stage-2 and stage-3 embedders.
    pub fn with_embedders(
        mut self,
        lite: Arc<dyn EmbeddingClient>,
        full: Arc<dyn EmbeddingClient>,
    ) -> Self {
        self.reranker = self.reranker.with_embedders(lite, full);
        self
    }

    /// Use a separate larger-context model for the LLM-only extraction fallback.
    pub fn with_long_context(mut self, router: CompletionRouter) -> Self {
        self.long_context = router;
        self
    }

    /// Use a separate model for synthesis.
    pub fn with_synthesis(mut self, router: CompletionRouter) -> Self {
        self.synthesis = router;
        self
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Research one topic and write an article.
    ///
    /// # Errors
    ///
    /// - [`ResearchError::InvalidTopic`] for empty topic text, before any call
    /// - [`ResearchError::NoSourcesFound`] when search and dedup leave nothing
    /// - [`ResearchError::SynthesisFailed`] when the article cannot be written
    /// - [`ResearchError::Cancelled`] if `cancel` fires; no partial article
    pub async fn research(
        &self,
        topic: &Topic,
        market: &MarketConfig,
        cancel: &CancellationToken,
    ) -> Result<Article> {
        let text = topic.text.trim();
        if text.is_empty() {
            return Err(ResearchError::InvalidTopic(
                "topic text is empty or whitespace".into(),
            ));
        }

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut run = RunContext::new(text, self.pool.new_recorder(), cancel.clone());
        info!(%run_id, topic = text, "research started");

        let candidates = self.search(text, market, &mut run).await?;
        let fetched = self
            .dedup
            .fetch_documents(candidates, self.fetcher.as_ref(), &mut run)
            .await?;
        let deduped = self.dedup.deduplicate(fetched);
        if deduped.kept.is_empty() {
            return Err(ResearchError::NoSourcesFound {
                topic: text.to_owned(),
                detail: "no documents survived dedup".into(),
            });
        }
        run.checkpoint(Stage::Dedup)?;

        let ranked = self.reranker.rerank(text, deduped.kept, &mut run).await?;

        let extractor = PassageExtractor::new(
            self.config.extract.clone(),
            self.selector.clone(),
            self.long_context.clone(),
        );
        let extraction = extractor.extract(text, &ranked, &mut run).await?;

        let synthesizer = Synthesizer::new(self.config.synth.clone(), self.synthesis.clone());
        let output = synthesizer
            .synthesize(text, market, &extraction.passages, &ranked, &run)
            .await?;

        let cost_summary = run.recorder().summary();
        let cost_usd = cost_summary.total_cost_usd;
        let warn_at = self.config.cost.warn_run_cost_usd;
        if warn_at > 0.0 && cost_usd > warn_at {
            warn!(%run_id, topic = text, cost_usd, budget_usd = warn_at, "run cost over budget");
        }
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            %run_id,
            topic = text,
            words = output.word_count,
            citations = output.citations.len(),
            sources = ranked.len(),
            cost_usd,
            duration_ms,
            "article ready"
        );

        Ok(Article {
            run_id,
            topic: text.to_owned(),
            body_text: output.body_text,
            citations: output.citations,
            word_count: output.word_count,
            strategy_used: extraction.strategy,
            cost_usd,
            duration_ms,
            sources: rerank::to_sources(&ranked),
            degradations: run.into_degradations(),
            dropped_duplicates: deduped.dropped,
            cost_summary,
        })
    }

    /// Research several topics with bounded concurrency.
    ///
    /// Results are returned in input order; one topic failing never
    /// affects the others.
    pub async fn research_batch(
        &self,
        topics: &[Topic],
        market: &MarketConfig,
        cancel: &CancellationToken,
    ) -> Vec<Result<Article>> {
        let concurrency = self.config.cost.batch_concurrency.max(1);
        let results: Vec<Result<Article>> = stream::iter(topics)
            .map(|topic| self.research(topic, market, cancel))
            .buffered(concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(topics = topics.len(), failed, "batch complete");
        results
    }

    async fn search(
        &self,
        text: &str,
        market: &MarketConfig,
        run: &mut RunContext,
    ) -> Result<Vec<FusedCandidate>> {
        let query = market.search_query(text, self.config.search.max_results_per_backend);
        let searched = search_and_fuse(
            &self.pool,
            &query,
            &self.config.search,
            run.recorder(),
            run.cancel_token(),
        )
        .await;

        let (candidates, report) = match searched {
            Ok(found) => found,
            Err(SearchError::Cancelled(_)) => return Err(run.cancelled(Stage::Search)),
            Err(SearchError::Config(e)) => return Err(ResearchError::Config(e)),
            Err(e) => {
                return Err(ResearchError::NoSourcesFound {
                    topic: text.to_owned(),
                    detail: e.to_string(),
                })
            }
        };
        record_backend_outcomes(&report, run);
        info!(
            topic = text,
            backends = report.contributing_backends(),
            candidates = candidates.len(),
            "search fused"
        );
        Ok(candidates)
    }
}

/// Turn per-backend failures into run degradations.
fn record_backend_outcomes(report: &FanoutReport, run: &mut RunContext) {
    for outcome in &report.outcomes {
        if outcome.fell_back || outcome.errors.iter().any(SearchError::is_rate_limited) {
            run.degrade(Degradation::RateLimited {
                backend: outcome.backend_id.clone(),
                fallback: outcome
                    .served_by
                    .clone()
                    .filter(|served| outcome.fell_back && *served != outcome.backend_id),
            });
        } else if outcome.results.is_empty() {
            if let Some(error) = outcome.errors.last() {
                run.degrade(Degradation::BackendUnavailable {
                    backend: outcome.backend_id.clone(),
                    error: error.to_string(),
                });
            }
        }
    }
}
