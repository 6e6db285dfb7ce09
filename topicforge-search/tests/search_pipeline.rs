//! Integration tests for fan-out → fusion over real adapters talking to
//! mock HTTP servers.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use topicforge_search::backends::{NewsApiBackend, SearxngBackend, SerperBackend, ROLE_WEB};
use topicforge_search::{
    search_and_fuse, BackendId, BackendPool, SearchConfig, SearchError, SearchQuery, Tier,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> SearchConfig {
    SearchConfig {
        retry_attempts: 1,
        retry_backoff_ms: 0,
        backend_timeout_ms: 2_000,
        ..Default::default()
    }
}

async fn searxng_server(urls: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    let results: Vec<_> = urls
        .iter()
        .map(|u| json!({"url": u, "title": format!("title {u}"), "content": "snippet"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
        .mount(&server)
        .await;
    server
}

async fn serper_server(urls: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    let organic: Vec<_> = urls
        .iter()
        .map(|u| json!({"link": u, "title": format!("title {u}"), "snippet": "snippet"}))
        .collect();
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic": organic })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn three_backends_fuse_shared_urls() {
    let cfg = config();
    let searx = searxng_server(&["https://a.org/x", "https://b.org/y", "https://c.org/z"]).await;
    let serper = serper_server(&["https://www.b.org/y/", "https://a.org/x", "https://d.org/w"]).await;
    let news = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/everything"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "articles": [{"url": "https://e.org/n", "title": "n", "description": "n"}]
        })))
        .mount(&news)
        .await;

    let pool = BackendPool::new()
        .with_backend(Arc::new(SearxngBackend::new(searx.uri(), &cfg).expect("searxng")))
        .with_backend(Arc::new(
            SerperBackend::new("k", &cfg).expect("serper").with_base_url(serper.uri()),
        ))
        .with_backend(Arc::new(
            NewsApiBackend::new("k", Tier::Free, &cfg)
                .expect("news")
                .with_base_url(news.uri()),
        ));
    let recorder = pool.new_recorder();

    let (fused, report) = search_and_fuse(
        &pool,
        &SearchQuery::new("grid storage"),
        &cfg,
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .expect("search");

    assert_eq!(report.contributing_backends(), 3);
    assert_eq!(fused.len(), 5);
    assert_eq!(fused[0].normalized_url, "https://a.org/x");
    assert_eq!(fused[1].normalized_url, "https://b.org/y");
    assert_eq!(fused[0].contributing_backends.len(), 2);
    for pair in fused.windows(2) {
        assert!(pair[0].fusion_score >= pair[1].fusion_score);
    }

    let summary = recorder.summary();
    assert_eq!(summary.free_calls, 2);
    assert_eq!(summary.paid_calls, 1);
    assert!(!summary.fallback_triggered);
}

#[tokio::test]
async fn rate_limited_free_backend_falls_back_to_paid() {
    let cfg = config();
    let limited = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .expect(1)
        .mount(&limited)
        .await;
    let serper = serper_server(&["https://p.org/1", "https://p.org/2"]).await;

    let paid = SerperBackend::new("k", &cfg).expect("serper").with_base_url(serper.uri());
    let pool = BackendPool::new()
        .with_backend(Arc::new(SearxngBackend::new(limited.uri(), &cfg).expect("searxng")))
        .with_fallback(ROLE_WEB, Arc::new(paid));
    let recorder = pool.new_recorder();
    let query = SearchQuery::new("heat pumps");

    for _ in 0..2 {
        let (fused, report) = search_and_fuse(&pool, &query, &cfg, &recorder, &CancellationToken::new())
            .await
            .expect("search");
        assert_eq!(fused.len(), 2);
        assert!(report.outcomes[0].fell_back);
        assert_eq!(report.outcomes[0].served_by, Some(BackendId::from("serper")));
    }

    let summary = recorder.summary();
    assert!(summary.fallback_triggered);
    assert!(summary.degraded_backends.contains(&BackendId::from("searxng")));
    assert_eq!(summary.by_backend[&BackendId::from("searxng")].calls, 1);
    assert_eq!(summary.by_backend[&BackendId::from("serper")].calls, 2);
    assert!(summary.total_cost_usd > 0.0);
}

#[tokio::test]
async fn every_backend_failing_is_all_backends_failed() {
    let cfg = config();
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;

    let pool = BackendPool::new()
        .with_backend(Arc::new(SearxngBackend::new(down.uri(), &cfg).expect("searxng")));
    let err = search_and_fuse(
        &pool,
        &SearchQuery::new("q"),
        &cfg,
        &pool.new_recorder(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SearchError::AllBackendsFailed(_)));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_call() {
    let cfg = SearchConfig {
        retry_attempts: 9,
        ..Default::default()
    };
    let pool = BackendPool::new();
    let err = search_and_fuse(
        &pool,
        &SearchQuery::new("q"),
        &cfg,
        &pool.new_recorder(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
}
