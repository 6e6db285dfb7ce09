//! Data model shared by every pipeline stage.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topicforge_search::url_normalize::domain_of;
use topicforge_search::{BackendId, CostSummary, FusedCandidate, PageContent, SearchQuery};
use uuid::Uuid;

use crate::dedup::minhash::Signature;

/// Market context threaded read-only through every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Site or publication domain the article is written for.
    pub domain: String,
    /// Market/region code passed to backends (e.g. `"us"`).
    pub market: String,
    /// Language code (e.g. `"en"`).
    pub language: String,
    /// Content vertical (e.g. `"energy"`); appended to queries.
    pub vertical: String,
    /// Seed keywords for topic relevance scoring.
    pub seed_keywords: Vec<String>,
}

impl MarketConfig {
    /// Create a market context with no vertical or seed keywords.
    pub fn new(market: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            domain: String::new(),
            market: market.into(),
            language: language.into(),
            vertical: String::new(),
            seed_keywords: Vec::new(),
        }
    }

    /// Set the publication domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the vertical.
    pub fn with_vertical(mut self, vertical: impl Into<String>) -> Self {
        self.vertical = vertical.into();
        self
    }

    /// Set the seed keywords.
    pub fn with_seed_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Build the backend query for a topic.
    ///
    /// The vertical is appended unless the topic already mentions it.
    pub fn search_query(&self, topic_text: &str, max_results: usize) -> SearchQuery {
        let topic_text = topic_text.trim();
        let vertical = self.vertical.trim();
        let text = if vertical.is_empty()
            || topic_text
                .to_lowercase()
                .contains(&vertical.to_lowercase())
        {
            topic_text.to_owned()
        } else {
            format!("{topic_text} {vertical}")
        };
        SearchQuery::new(text)
            .with_locale(self.market.clone(), self.language.clone())
            .with_max_results(max_results)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::new("us", "en")
    }
}

/// A candidate topic from upstream discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Topic text.
    pub text: String,
    /// Discovery collectors that surfaced this topic.
    #[serde(default)]
    pub source_collectors: BTreeSet<String>,
    /// When the topic was first discovered.
    pub discovered_at: DateTime<Utc>,
    /// Keyword relevance against the market's seed keywords, set by the validator.
    #[serde(default)]
    pub keyword_overlap: f64,
    /// Validator score, set on the copies the validator returns.
    #[serde(default)]
    pub score: Option<f64>,
}

impl Topic {
    /// Create an unscored topic.
    pub fn new(text: impl Into<String>, discovered_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            source_collectors: BTreeSet::new(),
            discovered_at,
            keyword_overlap: 0.0,
            score: None,
        }
    }

    /// Set the collectors that found this topic.
    pub fn with_collectors<I, S>(mut self, collectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_collectors = collectors.into_iter().map(Into::into).collect();
        self
    }
}

/// Stable document identifier derived from the normalised URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// `doc-` followed by the first 12 hex characters of the URL's blake3 hash.
    pub fn from_normalized_url(normalized_url: &str) -> Self {
        let hex = blake3::hash(normalized_url.as_bytes()).to_hex();
        Self(format!("doc-{}", &hex[..12]))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fused candidate that made it into the dedup/rerank stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Identifier derived from `normalized_url`.
    pub id: DocumentId,
    /// URL as returned by the first backend.
    pub url: String,
    /// Identity key from fusion.
    pub normalized_url: String,
    /// Page title (fetched title when available, else the backend's).
    pub title: String,
    /// Backend snippet.
    pub snippet: String,
    /// Extracted page text; empty when the fetch failed.
    pub full_text: String,
    /// MinHash signature of `full_text`; `None` when unfetched or empty.
    #[serde(skip)]
    pub shingle_signature: Option<Signature>,
    /// When the page was fetched; `None` when the fetch failed.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Publication time declared by the page.
    pub published_at: Option<DateTime<Utc>>,
    /// RRF score carried from fusion.
    pub fusion_score: f64,
    /// Backends that returned this URL.
    pub contributing_backends: BTreeSet<BackendId>,
}

impl Document {
    /// Build a document from a fused candidate and its fetched page, if any.
    pub fn from_candidate(
        candidate: FusedCandidate,
        page: Option<PageContent>,
        signature: Option<Signature>,
    ) -> Self {
        let (title, full_text, fetched_at, published_at) = match page {
            Some(page) => {
                let title = if page.title.is_empty() {
                    candidate.title.clone()
                } else {
                    page.title
                };
                (title, page.text, Some(Utc::now()), page.published_at)
            }
            None => (candidate.title.clone(), String::new(), None, None),
        };
        Self {
            id: DocumentId::from_normalized_url(&candidate.normalized_url),
            url: candidate.url,
            normalized_url: candidate.normalized_url,
            title,
            snippet: candidate.snippet,
            full_text,
            shingle_signature: signature,
            fetched_at,
            published_at,
            fusion_score: candidate.fusion_score,
            contributing_backends: candidate.contributing_backends,
        }
    }

    /// Whether page content was fetched.
    pub fn is_fetched(&self) -> bool {
        self.fetched_at.is_some() && !self.full_text.is_empty()
    }

    /// Text used for scoring: the page text, or title plus snippet when unfetched.
    pub fn scoring_text(&self) -> String {
        if self.full_text.is_empty() {
            format!("{}\n\n{}", self.title, self.snippet)
        } else {
            format!("{}\n\n{}", self.title, self.full_text)
        }
    }

    /// Bare host of the document URL.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.url)
    }
}

/// Per-metric values from stage 3, each in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBreakdown {
    /// Full-fidelity embedding similarity, clamped to `[0, 1]`.
    pub semantic: f64,
    /// Domain authority/trust.
    pub authority: f64,
    /// Content freshness.
    pub freshness: f64,
    /// Information density.
    pub density: f64,
    /// Source diversity relative to sources already selected.
    pub diversity: f64,
    /// Citation-worthiness (figures, dates, quotations).
    pub citation_worthiness: f64,
    /// Length adequacy.
    pub length_adequacy: f64,
    /// Weighted blend of the metrics above.
    pub weighted_total: f64,
}

/// Scores accumulated across reranker stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageScores {
    /// Stage-1 BM25 score.
    pub lexical: f64,
    /// Stage-2 cosine similarity; `None` if the stage degraded.
    pub semantic_lite: Option<f64>,
    /// Stage-3 cosine similarity; `None` if the stage degraded.
    pub semantic_full: Option<f64>,
    /// Stage-3 metric blend.
    pub metric_breakdown: Option<MetricBreakdown>,
}

/// A document's position in the final reranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSource {
    /// The ranked document.
    pub document_id: DocumentId,
    /// Document URL, for convenience.
    pub url: String,
    /// Scores from each stage.
    pub stage_scores: StageScores,
    /// 1-based final rank.
    pub final_rank: usize,
}

/// Byte range of a passage within its document's `full_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

/// A passage selected for synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Source document.
    pub document_id: DocumentId,
    /// Passage text.
    pub text: String,
    /// Location in the document text, when known.
    pub text_span: Option<TextSpan>,
    /// Relevance in `[0, 1]`, higher is better.
    pub relevance_score: f64,
}

/// How passages were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// BM25 pre-filter, then LLM selection from the bounded set.
    LexicalLlm,
    /// Raw top documents fed to a larger-context completion.
    LlmOnly,
    /// BM25 passages only; used when both LLM strategies fail.
    LexicalOnly,
}

impl ExtractionStrategy {
    /// Stable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LexicalLlm => "lexical_llm",
            Self::LlmOnly => "llm_only",
            Self::LexicalOnly => "lexical_only",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reranker stages that can degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStage {
    /// BM25.
    Lexical,
    /// Lightweight embeddings.
    SemanticLite,
    /// Full embeddings plus metrics.
    SemanticFull,
}

/// A non-fatal outcome recorded on the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// A backend failed or timed out; its contribution was empty.
    BackendUnavailable {
        /// Failed backend.
        backend: BackendId,
        /// Error text.
        error: String,
    },
    /// A backend was rate limited.
    RateLimited {
        /// Degraded backend.
        backend: BackendId,
        /// Paid fallback that served instead, if any.
        fallback: Option<BackendId>,
    },
    /// A page could not be fetched; the candidate was kept as unique.
    FetchFailed {
        /// Page URL.
        url: String,
        /// Error text.
        error: String,
    },
    /// A reranker stage carried the previous ordering forward.
    RerankDegraded {
        /// Degraded stage.
        stage: RerankStage,
        /// Error text.
        error: String,
    },
    /// Passage extraction moved to a fallback strategy.
    ExtractionFallback {
        /// Strategy that failed.
        from: ExtractionStrategy,
        /// Strategy used instead.
        to: ExtractionStrategy,
        /// Error text.
        error: String,
    },
}

/// A near-duplicate dropped by the deduplicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedDuplicate {
    /// Dropped document.
    pub document_id: DocumentId,
    /// Dropped URL.
    pub url: String,
    /// Kept document it duplicated.
    pub duplicate_of: DocumentId,
    /// Estimated Jaccard similarity.
    pub similarity: f64,
}

/// One numbered citation in the article body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based marker number as it appears in the body (`[index]`).
    pub index: usize,
    /// Cited document.
    pub document_id: DocumentId,
    /// Cited URL.
    pub url: String,
}

/// The finished research output. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Topic text.
    pub topic: String,
    /// Body with inline `[n]` markers.
    pub body_text: String,
    /// Citations ordered by index, contiguous from 1.
    pub citations: Vec<Citation>,
    /// Words in `body_text`.
    pub word_count: usize,
    /// Extraction strategy that produced the passages.
    pub strategy_used: ExtractionStrategy,
    /// Total USD spent on the run.
    pub cost_usd: f64,
    /// Wall-clock run time.
    pub duration_ms: u64,
    /// Final reranked sources.
    pub sources: Vec<RankedSource>,
    /// Non-fatal outcomes, in the order they happened.
    pub degradations: Vec<Degradation>,
    /// Near-duplicates dropped during dedup.
    pub dropped_duplicates: Vec<DroppedDuplicate>,
    /// Cost breakdown for the run.
    pub cost_summary: CostSummary,
}
