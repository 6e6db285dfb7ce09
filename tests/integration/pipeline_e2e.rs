//! End-to-end research runs over in-process mock backends, pages, embedders,
//! and completion models.
//!
//! Model output is canned, so these tests assert structural properties of
//! the article (citation validity, source counts, degradations) rather than
//! exact text.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use topicforge::llm::LlmError;
use topicforge::types::{Degradation, ExtractionStrategy, RerankStage};
use topicforge::{MarketConfig, ResearchError, Stage, Topic};
use topicforge_search::{BackendId, BackendPool, SearchError, Tier};

use crate::helpers::{
    config, embedders, engine_with, fixture, three_backend_pool, FixedBackend, ARTICLE, TOPIC,
};

#[tokio::test]
async fn smoke_run_produces_a_cited_article() {
    let fixture = fixture();
    let (lite, full) = embedders();
    let engine = engine_with(three_backend_pool(&fixture), &fixture, Ok(ARTICLE.into()))
        .with_embedders(lite, full);

    let article = engine
        .research(
            &Topic::new(TOPIC, chrono::Utc::now()),
            &MarketConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // 15 results, one shared URL, one near-duplicate page
    let fused_and_deduped = 13;
    assert_eq!(article.dropped_duplicates.len(), 1);
    assert_eq!(article.dropped_duplicates[0].url, fixture.gamma[4]);
    assert!(fused_and_deduped + article.dropped_duplicates.len() <= 15);

    let config = config();
    let expected = config
        .rerank
        .final_top_n
        .min(config.rerank.semantic_lite_keep)
        .min(fused_and_deduped);
    assert_eq!(article.sources.len(), expected);
    let ranks: Vec<usize> = article.sources.iter().map(|s| s.final_rank).collect();
    assert_eq!(ranks, (1..=expected).collect::<Vec<_>>());

    assert!(!article.body_text.trim().is_empty());
    assert!(!article.body_text.contains("99"));
    assert_eq!(article.strategy_used, ExtractionStrategy::LexicalLlm);
    assert!(article.degradations.is_empty(), "{:?}", article.degradations);

    // Citations are contiguous from 1 and each names a distinct reranked source.
    assert!(!article.citations.is_empty());
    let source_ids: BTreeSet<_> = article.sources.iter().map(|s| &s.document_id).collect();
    let cited: BTreeSet<_> = article.citations.iter().map(|c| &c.document_id).collect();
    assert_eq!(cited.len(), article.citations.len());
    for (i, citation) in article.citations.iter().enumerate() {
        assert_eq!(citation.index, i + 1);
        assert!(source_ids.contains(&citation.document_id));
        assert!(article.body_text.contains(&format!("[{}", citation.index)));
    }

    assert!(article.cost_usd > 0.0);
    assert_eq!(article.cost_usd, article.cost_summary.total_cost_usd);
    assert!(!article.cost_summary.fallback_triggered);
}

#[tokio::test]
async fn reranker_fails_open_without_embedders() {
    let fixture = fixture();
    let engine = engine_with(three_backend_pool(&fixture), &fixture, Ok(ARTICLE.into()));

    let article = engine
        .research(
            &Topic::new(TOPIC, chrono::Utc::now()),
            &MarketConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let degraded: Vec<RerankStage> = article
        .degradations
        .iter()
        .filter_map(|d| match d {
            Degradation::RerankDegraded { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(degraded, vec![RerankStage::SemanticLite, RerankStage::SemanticFull]);
    // Stage 1 keeps all 13 (under K1 = 15) and the degraded stages carry them forward.
    assert_eq!(article.sources.len(), 13);
    assert!(article.sources.iter().all(|s| s.stage_scores.semantic_lite.is_none()));
}

#[tokio::test]
async fn rate_limited_backend_is_served_by_paid_fallback() {
    let fixture = fixture();
    let pool = BackendPool::new()
        .with_backend(Arc::new(FixedBackend::failing(
            "alpha",
            SearchError::RateLimited("HTTP 429".into()),
        )))
        .with_backend(Arc::new(FixedBackend::new("beta", Tier::Free, fixture.beta.clone())))
        .with_fallback(
            "web",
            Arc::new(FixedBackend::new("paid-web", Tier::Paid, fixture.alpha.clone())),
        );
    let engine = engine_with(pool, &fixture, Ok(ARTICLE.into()));

    let article = engine
        .research(
            &Topic::new(TOPIC, chrono::Utc::now()),
            &MarketConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(article.degradations.contains(&Degradation::RateLimited {
        backend: BackendId::from("alpha"),
        fallback: Some(BackendId::from("paid-web")),
    }));
    assert!(article.cost_summary.fallback_triggered);
    assert!(article.cost_summary.fallback_stages.contains("search"));
    assert!(article.cost_summary.degraded_backends.contains(&BackendId::from("alpha")));
}

#[tokio::test]
async fn cancelled_run_returns_no_article() {
    let fixture = fixture();
    let engine = engine_with(three_backend_pool(&fixture), &fixture, Ok(ARTICLE.into()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .research(&Topic::new(TOPIC, chrono::Utc::now()), &MarketConfig::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::Cancelled { stage: Stage::Search, .. }));
}

#[tokio::test]
async fn empty_topic_is_rejected_before_any_backend_call() {
    let fixture = fixture();
    let backend = Arc::new(FixedBackend::new("alpha", Tier::Free, fixture.alpha.clone()));
    let pool = BackendPool::new().with_backend(backend.clone());
    let engine = engine_with(pool, &fixture, Ok(ARTICLE.into()));

    let err = engine
        .research(
            &Topic::new("   ", chrono::Utc::now()),
            &MarketConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::InvalidTopic(_)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn all_backends_failing_is_no_sources_found() {
    let fixture = fixture();
    let pool = BackendPool::new()
        .with_backend(Arc::new(FixedBackend::failing(
            "alpha",
            SearchError::BackendUnavailable("HTTP 502".into()),
        )))
        .with_backend(Arc::new(FixedBackend::failing(
            "beta",
            SearchError::Timeout("5000ms".into()),
        )));
    let engine = engine_with(pool, &fixture, Ok(ARTICLE.into()));

    let err = engine
        .research(
            &Topic::new(TOPIC, chrono::Utc::now()),
            &MarketConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::NoSourcesFound { .. }));
}

#[tokio::test]
async fn synthesis_failure_is_fatal_for_the_run() {
    let fixture = fixture();
    let engine = engine_with(
        three_backend_pool(&fixture),
        &fixture,
        Err(LlmError::ProviderError("HTTP 500: upstream error".into())),
    );

    let err = engine
        .research(
            &Topic::new(TOPIC, chrono::Utc::now()),
            &MarketConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::SynthesisFailed { .. }));
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let fixture = fixture();
    let engine = engine_with(three_backend_pool(&fixture), &fixture, Ok(ARTICLE.into()));
    let topics = vec![
        Topic::new("", chrono::Utc::now()),
        Topic::new(TOPIC, chrono::Utc::now()),
        Topic::new("grid battery storage", chrono::Utc::now()),
    ];

    let results = engine
        .research_batch(&topics, &MarketConfig::default(), &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 3);
    assert!(matches!(results[0], Err(ResearchError::InvalidTopic(_))));
    let second = results[1].as_ref().unwrap();
    let third = results[2].as_ref().unwrap();
    assert_eq!(second.topic, TOPIC);
    assert_eq!(third.topic, "grid battery storage");
    assert_ne!(second.run_id, third.run_id);
}
