//! TOML config files: save, reload, partial documents, and rejection of
//! invalid settings at engine construction.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use topicforge::llm::CompletionRouter;
use topicforge::{EngineConfig, ResearchEngine, ResearchError};
use topicforge_search::{BackendPool, Tier};

use crate::helpers::{fixture, selector, FixedBackend, MapFetcher};

fn setup_config(toml: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("config.toml");
    fs::write(&path, toml).expect("failed to write config");
    (dir, path)
}

fn engine(config: EngineConfig) -> Result<ResearchEngine, ResearchError> {
    let fixture = fixture();
    let pool = BackendPool::new().with_backend(Arc::new(FixedBackend::new(
        "alpha",
        Tier::Free,
        fixture.alpha.clone(),
    )));
    ResearchEngine::new(
        config,
        pool,
        Arc::new(MapFetcher(fixture.pages)),
        CompletionRouter::new(selector()),
    )
}

#[test]
fn saved_config_reloads_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("topicforge").join("config.toml");

    let mut config = EngineConfig::default();
    config.search.rrf_k = 30.0;
    config.dedup.threshold = 0.85;
    config.rerank.final_top_n = 12;
    config.validator.top_n = 5;
    config.rerank.authority_domains = vec!["example.org".into()];
    config.save_to_file(&path).unwrap();

    let loaded = EngineConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.validate().is_ok());
}

#[test]
fn partial_file_fills_in_defaults() {
    let (_dir, path) = setup_config(
        r#"
# Only override what differs from the defaults
[search]
retry_attempts = 3

[validator]
threshold = 0.7
"#,
    );

    let config = EngineConfig::from_file(&path).unwrap();
    assert_eq!(config.search.retry_attempts, 3);
    assert_eq!(config.search.rrf_k, 60.0);
    assert_eq!(config.validator.threshold, 0.7);
    assert_eq!(config.validator.top_n, 20);
    assert_eq!(config.rerank, EngineConfig::default().rerank);
    assert!(engine(config).is_ok());
}

#[test]
fn malformed_file_is_a_config_error() {
    let (_dir, path) = setup_config("[dedup\nthreshold = ");
    let err = EngineConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ResearchError::Config(_)));
}

#[test]
fn engine_rejects_invalid_weights_from_file() {
    let (_dir, path) = setup_config(
        r#"
[rerank.weights]
semantic = 0.90
"#,
    );

    // Parsing succeeds; the weights no longer sum to 1.0.
    let config = EngineConfig::from_file(&path).unwrap();
    let err = engine(config).unwrap_err();
    assert!(matches!(err, ResearchError::Config(ref m) if m.contains("rerank.weights")));
}

#[test]
fn engine_rejects_out_of_range_retry_budget() {
    let mut config = EngineConfig::default();
    config.extract.retry_attempts = 4;
    assert!(matches!(engine(config), Err(ResearchError::Config(_))));
}

#[test]
fn engine_requires_a_backend() {
    let fixture = fixture();
    let err = ResearchEngine::new(
        EngineConfig::default(),
        BackendPool::new(),
        Arc::new(MapFetcher(fixture.pages)),
        CompletionRouter::new(selector()),
    )
    .unwrap_err();
    assert!(matches!(err, ResearchError::Config(_)));
}

#[test]
fn default_path_is_under_topicforge_dir() {
    let path = EngineConfig::default_config_path();
    assert!(path.ends_with("topicforge/config.toml"));
}
