//! OpenAI-compatible client contract tests.
//!
//! These tests pin the HTTP request format and the mapping of responses
//! and error statuses for the completion and embedding clients, including
//! rerouting to a paid fallback when the primary answers 429.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use topicforge::llm::{
    CallPolicy, CompletionClient, CompletionRequest, CompletionRouter, OpenAiCompletionClient,
    OpenAiConfig, OpenAiEmbeddingClient, TokenPricing,
};
use topicforge::embedding::EmbeddingClient;
use topicforge::Stage;
use topicforge_search::{CostRecorder, Tier};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
    })
}

fn completion_client(server: &MockServer, model: &str) -> OpenAiCompletionClient {
    OpenAiCompletionClient::new(
        OpenAiConfig::new("test-key", model).with_base_url(server.uri()),
    )
    .unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Chat completions
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn completion_request_carries_model_messages_and_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Summarise grid storage"}
            ],
            "max_tokens": 256
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Storage doubled.")))
        .expect(1)
        .mount(&server)
        .await;

    let client = completion_client(&server, "gpt-4o-mini");
    let request =
        CompletionRequest::new("be brief", "Summarise grid storage").with_max_tokens(256);
    let completion = client.complete(&request).await.unwrap();

    assert_eq!(completion.text, "Storage doubled.");
    assert_eq!(completion.usage.prompt_tokens, 120);
    assert_eq!(completion.usage.completion_tokens, 30);
    assert_eq!(completion.model.as_str(), "openai:gpt-4o-mini");
}

#[tokio::test]
async fn status_429_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Too many requests", "type": "requests"}
        })))
        .mount(&server)
        .await;

    let err = completion_client(&server, "gpt-4o-mini")
        .complete(&CompletionRequest::new("s", "p"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RATE_LIMITED");
    assert!(err.is_rate_limited());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn status_401_maps_to_auth_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let err = completion_client(&server, "gpt-4o-mini")
        .complete(&CompletionRequest::new("s", "p"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AUTH_FAILED");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn quota_message_on_server_error_is_a_rate_limit_signal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"message": "Monthly quota exhausted for this key"}
        })))
        .mount(&server)
        .await;

    let err = completion_client(&server, "gpt-4o-mini")
        .complete(&CompletionRequest::new("s", "p"))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn plain_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = completion_client(&server, "gpt-4o-mini")
        .complete(&CompletionRequest::new("s", "p"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PROVIDER_ERROR");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = completion_client(&server, "gpt-4o-mini")
        .complete(&CompletionRequest::new("s", "p"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RESPONSE_INVALID");
}

// ────────────────────────────────────────────────────────────────────────────
// Embeddings
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn embeddings_are_returned_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(
        OpenAiConfig::new("test-key", "text-embedding-3-small").with_base_url(server.uri()),
    )
    .unwrap();
    let embeddings = client
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(embeddings.vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    assert_eq!(embeddings.usage.prompt_tokens, 4);
}

// ────────────────────────────────────────────────────────────────────────────
// Fallback routing over HTTP
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limited_free_model_reroutes_to_paid_fallback() {
    let free_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&free_server)
        .await;

    let paid_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("From the paid model.")))
        .expect(2)
        .mount(&paid_server)
        .await;

    let free = OpenAiCompletionClient::new(
        OpenAiConfig::new("k", "free-model")
            .with_base_url(free_server.uri())
            .with_tier(Tier::Free),
    )
    .unwrap();
    let paid = OpenAiCompletionClient::new(
        OpenAiConfig::new("k", "paid-model")
            .with_base_url(paid_server.uri())
            .with_pricing(TokenPricing::new(1.0, 4.0)),
    )
    .unwrap();
    let router = CompletionRouter::new(Arc::new(free)).with_fallback(Arc::new(paid));

    let recorder = CostRecorder::new();
    let cancel = CancellationToken::new();
    let policy = CallPolicy::new(3, 0);
    let request = CompletionRequest::new("s", "p");

    let first = router
        .complete(&request, Stage::Synthesis, policy, &recorder, &cancel)
        .await
        .unwrap();
    assert_eq!(first.text, "From the paid model.");

    // The free model stays degraded for the rest of the run and is skipped.
    let second = router
        .complete(&request, Stage::Extract, policy, &recorder, &cancel)
        .await
        .unwrap();
    assert_eq!(second.model.as_str(), "openai:paid-model");

    let summary = recorder.summary();
    assert!(summary.fallback_triggered);
    assert!(summary.fallback_stages.contains("synthesis"));
    assert!(summary.fallback_stages.contains("extract"));
    assert_eq!(summary.free_calls, 1);
    assert_eq!(summary.paid_calls, 2);
    // 120 input + 30 output tokens at $1 / $4 per million, twice
    assert!((summary.total_cost_usd - 2.0 * 0.00024).abs() < 1e-12);
}
