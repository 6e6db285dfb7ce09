//! Shared mocks and fixtures for integration tests.
//!
//! Search backends, the page fetcher, embedders, and completion models are
//! in-process fakes with canned output, so a full research run is
//! deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use topicforge::embedding::{EmbeddingClient, Embeddings};
use topicforge::llm::{
    Completion, CompletionClient, CompletionRequest, CompletionRouter, LlmError, ModelDescriptor,
    TokenPricing, TokenUsage,
};
use topicforge::{EngineConfig, ResearchEngine};
use topicforge_search::backend::rank_results;
use topicforge_search::{
    BackendDescriptor, BackendPool, PageContent, PageFetcher, SearchBackend, SearchConfig,
    SearchError, SearchQuery, SearchResult, Tier,
};

pub(crate) const TOPIC: &str = "single-topic-smoke-test";

/// Canned synthesis reply; `99` names no source and must be removed.
pub(crate) const ARTICLE: &str = "Grid storage capacity keeps growing [1]. Operators cite \
    falling prices [2][3]. Analysts expect more auctions [4, 99].";

/// Search backend returning a fixed URL list, optionally failing its first
/// `fail_times` calls.
pub(crate) struct FixedBackend {
    descriptor: BackendDescriptor,
    urls: Vec<String>,
    fail_with: Option<SearchError>,
    fail_times: usize,
    calls: AtomicUsize,
}

impl FixedBackend {
    pub(crate) fn new(id: &str, tier: Tier, urls: Vec<String>) -> Self {
        Self {
            descriptor: BackendDescriptor::new(id, tier, "web"),
            urls,
            fail_with: None,
            fail_times: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails on every call.
    pub(crate) fn failing(id: &str, error: SearchError) -> Self {
        Self::flaky(id, Vec::new(), error, usize::MAX)
    }

    /// Free backend that fails its first `times` calls, then serves `urls`.
    pub(crate) fn flaky(id: &str, urls: Vec<String>, error: SearchError, times: usize) -> Self {
        Self {
            fail_with: Some(error),
            fail_times: times,
            ..Self::new(id, Tier::Free, urls)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for FixedBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.fail_with {
            if call < self.fail_times {
                return Err(error.clone());
            }
        }
        let rows = self
            .urls
            .iter()
            .map(|u| (u.clone(), format!("Title for {u}"), "Grid storage snippet".to_string()));
        Ok(rank_results(self.id(), rows, query.max_results))
    }
}

/// Serves page text from a map; unknown URLs are a 404.
pub(crate) struct MapFetcher(pub(crate) HashMap<String, String>);

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch_page(&self, url: &str) -> Result<PageContent, SearchError> {
        let text = self
            .0
            .get(url)
            .ok_or_else(|| SearchError::BackendUnavailable(format!("HTTP 404 for {url}")))?;
        Ok(PageContent {
            url: url.to_owned(),
            title: String::new(),
            text: text.clone(),
            word_count: text.split_whitespace().count(),
            published_at: None,
        })
    }
}

const VOCABULARY: &[&str] = &[
    "grid", "battery", "storage", "capacity", "megawatts", "prices", "policy", "operators",
];

/// Bag-of-words embedder over a small fixed vocabulary.
pub(crate) struct VocabularyEmbedder {
    descriptor: ModelDescriptor,
}

impl VocabularyEmbedder {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            descriptor: ModelDescriptor::new(id, Tier::Paid, TokenPricing::new(0.02, 0.0)),
        }
    }
}

#[async_trait]
impl EmbeddingClient for VocabularyEmbedder {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn embed(&self, inputs: &[String]) -> Result<Embeddings, LlmError> {
        let vectors = inputs
            .iter()
            .map(|input| {
                let lower = input.to_lowercase();
                let mut v: Vec<f32> = VOCABULARY
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect();
                v.push(1.0);
                v
            })
            .collect();
        Ok(Embeddings {
            vectors,
            usage: TokenUsage::new(10 * inputs.len() as u64, 0),
        })
    }
}

/// Completion model that always gives the same reply.
pub(crate) struct CannedModel {
    descriptor: ModelDescriptor,
    reply: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl CannedModel {
    pub(crate) fn new(id: &str, tier: Tier, reply: Result<String, LlmError>) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ModelDescriptor::new(id, tier, TokenPricing::new(0.15, 0.60)),
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for CannedModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map(|text| Completion {
            text,
            usage: TokenUsage::new(2_000, 400),
            model: self.descriptor.id.clone(),
        })
    }
}

pub(crate) fn urls(prefix: &str, n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("https://{prefix}.example.com/article/{i}"))
        .collect()
}

/// Page text whose shingles are mostly unique to `seed`.
pub(crate) fn page_text(seed: usize) -> String {
    let mut paragraphs = Vec::new();
    for p in 0..3 {
        let n = seed * 10 + p;
        paragraphs.push(format!(
            "Operators in district{n} reported that grid battery storage capacity reached {a} \
             megawatts in quarter{n} according to survey{n} published by agency{n}. \
             Analysts{n} said prices{n} for cells fell while policy{n} in region{n} shifted \
             toward storage{n} auctions and contracts{n} for capacity{n} services.",
            a = n * 7
        ));
    }
    paragraphs.join("\n\n")
}

pub(crate) struct Fixture {
    pub(crate) alpha: Vec<String>,
    pub(crate) beta: Vec<String>,
    pub(crate) gamma: Vec<String>,
    pub(crate) pages: HashMap<String, String>,
}

/// Three backends with five results each. One URL is shared by alpha and
/// beta, and gamma's last page is a near-copy of alpha's second.
pub(crate) fn fixture() -> Fixture {
    let alpha = urls("alpha", 5);
    let mut beta = urls("beta", 4);
    beta.push(alpha[0].clone());
    let gamma = urls("gamma", 5);

    let mut pages = HashMap::new();
    for (i, url) in alpha.iter().chain(&beta).chain(&gamma).enumerate() {
        pages.entry(url.clone()).or_insert_with(|| page_text(i + 1));
    }
    let copy = format!("{} Updated.", pages[&alpha[1]]);
    pages.insert(gamma[4].clone(), copy);

    Fixture {
        alpha,
        beta,
        gamma,
        pages,
    }
}

/// Engine config with single attempts and no backoff.
pub(crate) fn config() -> EngineConfig {
    let mut config = EngineConfig {
        search: SearchConfig {
            retry_attempts: 1,
            retry_backoff_ms: 0,
            ..SearchConfig::default()
        },
        ..EngineConfig::default()
    };
    config.rerank.retry_attempts = 1;
    config.rerank.retry_backoff_ms = 0;
    config.extract.retry_attempts = 1;
    config.extract.retry_backoff_ms = 0;
    config.synth.retry_attempts = 1;
    config.synth.retry_backoff_ms = 0;
    config
}

/// Selector model that picks passages 1 to 6.
pub(crate) fn selector() -> Arc<CannedModel> {
    CannedModel::new(
        "selector",
        Tier::Paid,
        Ok(r#"{"selected": [1, 2, 3, 4, 5, 6]}"#.into()),
    )
}

pub(crate) fn engine_with(
    pool: BackendPool,
    fixture: &Fixture,
    synth_reply: Result<String, LlmError>,
) -> ResearchEngine {
    let writer = CannedModel::new("writer", Tier::Paid, synth_reply);
    ResearchEngine::new(
        config(),
        pool,
        Arc::new(MapFetcher(fixture.pages.clone())),
        CompletionRouter::new(selector()),
    )
    .unwrap()
    .with_synthesis(CompletionRouter::new(writer))
}

pub(crate) fn three_backend_pool(fixture: &Fixture) -> BackendPool {
    BackendPool::new()
        .with_backend(Arc::new(FixedBackend::new("alpha", Tier::Free, fixture.alpha.clone())))
        .with_backend(Arc::new(FixedBackend::new("beta", Tier::Free, fixture.beta.clone())))
        .with_backend(Arc::new(FixedBackend::new("gamma", Tier::Free, fixture.gamma.clone())))
}

pub(crate) fn embedders() -> (Arc<dyn EmbeddingClient>, Arc<dyn EmbeddingClient>) {
    (
        Arc::new(VocabularyEmbedder::new("embed-lite")),
        Arc::new(VocabularyEmbedder::new("embed-full")),
    )
}
