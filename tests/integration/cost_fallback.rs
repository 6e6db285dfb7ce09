//! Free-first routing: rate-limited free services are rerouted to paid
//! fallbacks, and degradation never outlives the run that observed it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use topicforge::llm::{CompletionRouter, LlmError};
use topicforge::types::{Degradation, ExtractionStrategy};
use topicforge::{MarketConfig, ResearchEngine, Topic};
use topicforge_search::{BackendId, BackendPool, SearchError, Tier};

use crate::helpers::{
    config, engine_with, fixture, selector, three_backend_pool, CannedModel, FixedBackend,
    MapFetcher, ARTICLE, TOPIC,
};

fn topic() -> Topic {
    Topic::new(TOPIC, chrono::Utc::now())
}

#[tokio::test]
async fn search_degradation_resets_between_runs() {
    let fixture = fixture();
    let free = Arc::new(FixedBackend::flaky(
        "alpha",
        fixture.alpha.clone(),
        SearchError::RateLimited("HTTP 429".into()),
        1,
    ));
    let paid = Arc::new(FixedBackend::new("paid-web", Tier::Paid, fixture.alpha.clone()));
    let pool = BackendPool::new()
        .with_backend(free.clone())
        .with_backend(Arc::new(FixedBackend::new("beta", Tier::Free, fixture.beta.clone())))
        .with_fallback("web", paid.clone());
    let engine = engine_with(pool, &fixture, Ok(ARTICLE.into()));
    let market = MarketConfig::default();
    let cancel = CancellationToken::new();

    let first = engine.research(&topic(), &market, &cancel).await.unwrap();
    assert!(first.degradations.contains(&Degradation::RateLimited {
        backend: BackendId::from("alpha"),
        fallback: Some(BackendId::from("paid-web")),
    }));
    assert!(first.cost_summary.fallback_triggered);
    assert_eq!(free.calls(), 1);
    assert_eq!(paid.calls(), 1);

    // A fresh run starts with every free backend healthy again.
    let second = engine.research(&topic(), &market, &cancel).await.unwrap();
    assert_eq!(free.calls(), 2);
    assert_eq!(paid.calls(), 1);
    assert!(!second.cost_summary.fallback_triggered);
    assert!(second.cost_summary.degraded_backends.is_empty());
    assert!(!second
        .degradations
        .iter()
        .any(|d| matches!(d, Degradation::RateLimited { .. })));
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn rate_limited_selector_model_reroutes_to_paid_model() {
    let fixture = fixture();
    let free_selector = CannedModel::new(
        "free-selector",
        Tier::Free,
        Err(LlmError::RateLimited("HTTP 429: quota exhausted".into())),
    );
    let paid_selector = selector();
    let writer = CannedModel::new("writer", Tier::Paid, Ok(ARTICLE.into()));

    let engine = ResearchEngine::new(
        config(),
        three_backend_pool(&fixture),
        Arc::new(MapFetcher(fixture.pages.clone())),
        CompletionRouter::new(free_selector.clone()).with_fallback(paid_selector.clone()),
    )
    .unwrap()
    .with_synthesis(CompletionRouter::new(writer.clone()));

    let article = engine
        .research(&topic(), &MarketConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(article.strategy_used, ExtractionStrategy::LexicalLlm);
    assert_eq!(free_selector.calls(), 1);
    assert_eq!(paid_selector.calls(), 1);
    assert_eq!(writer.calls(), 1);

    let summary = &article.cost_summary;
    assert!(summary.fallback_triggered);
    assert!(summary.fallback_stages.contains("extract"));
    assert!(!summary.fallback_stages.contains("synthesis"));
    assert!(summary
        .degraded_backends
        .contains(&BackendId::from("free-selector")));
    assert!(summary.total_cost_usd > 0.0);
}

#[tokio::test]
async fn free_run_reports_no_fallback() {
    let fixture = fixture();
    let engine = engine_with(three_backend_pool(&fixture), &fixture, Ok(ARTICLE.into()));

    let article = engine
        .research(&topic(), &MarketConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let summary = &article.cost_summary;
    assert!(!summary.fallback_triggered);
    assert!(summary.fallback_stages.is_empty());
    // Three free search calls, then one paid selector and one paid writer call.
    assert_eq!(summary.free_calls, 3);
    assert_eq!(summary.paid_calls, 2);
}
