//! topicforge: topic research and article synthesis.
//!
//! Given a topic and its market context, the engine gathers sources from
//! several search backends and writes a cited article from them:
//! Topic → Search fan-out → RRF fusion → Dedup → Rerank → Extract → Synthesize
//!
//! # Architecture
//!
//! - **Validator**: scores candidate topics before any network call ([`validator`])
//! - **Search**: concurrent backend fan-out and Reciprocal Rank Fusion, in the
//!   `topicforge-search` crate
//! - **Dedup**: page fetch plus MinHash/LSH near-duplicate removal ([`dedup`])
//! - **Rerank**: BM25, then lightweight embeddings, then full embeddings with
//!   quality metrics; later stages fail open ([`rerank`])
//! - **Extract**: BM25 passage pre-filter and LLM selection, with LLM-only and
//!   lexical-only fallbacks ([`extract`])
//! - **Synthesize**: one completion with numbered citations ([`synth`])
//!
//! Every external call is recorded on the run's cost recorder, which also
//! reroutes a rate-limited free backend to its paid fallback for the rest of
//! the run. Non-fatal failures are collected as [`Degradation`]s on the
//! returned [`Article`].

pub mod bm25;
pub mod config;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod rerank;
pub mod run;
pub mod synth;
pub mod text;
pub mod types;
pub mod validator;

pub use config::EngineConfig;
pub use error::{ResearchError, Result, Stage};
pub use pipeline::ResearchEngine;
pub use types::{
    Article, Citation, Degradation, Document, DocumentId, ExtractionStrategy, MarketConfig,
    Passage, RankedSource, Topic,
};
pub use validator::{ScoredTopic, TopicValidator};
