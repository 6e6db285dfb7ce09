//! Passage extraction from the final ranked sources.
//!
//! The primary strategy is lexical-then-LLM: every document is chunked into
//! paragraph-aligned passages, BM25 picks a bounded candidate set, and a
//! completion call chooses the passages worth citing. If that fails the
//! extractor falls back to LLM-only (raw top documents fed to a
//! larger-context model that quotes passages verbatim), and if that also
//! fails it keeps the best BM25 passages. Every fallback is recorded on the
//! run; the strategy that produced the passages is returned with them.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::bm25::Bm25Index;
use crate::config::ExtractConfig;
use crate::error::{Result, Stage};
use crate::llm::{CallPolicy, CompletionRequest, CompletionRouter, LlmError};
use crate::rerank::RankedDocument;
use crate::run::RunContext;
use crate::text;
use crate::types::{Degradation, ExtractionStrategy, Passage, TextSpan};

const SELECT_SYSTEM: &str = "You choose source passages for a factual research article. \
    Judge each passage on how much concrete, checkable information it adds about the topic. \
    Reply with JSON only.";

const QUOTE_SYSTEM: &str = "You extract source passages for a factual research article. \
    Copy passages exactly as they appear in the documents, without edits or ellipses. \
    Reply with JSON only.";

/// Passages and the strategy that produced them.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Selected passages, most relevant first.
    pub passages: Vec<Passage>,
    /// Strategy that produced `passages`.
    pub strategy: ExtractionStrategy,
}

/// Selects passages for synthesis.
#[derive(Debug, Clone)]
pub struct PassageExtractor {
    config: ExtractConfig,
    selector: CompletionRouter,
    long_context: CompletionRouter,
}

impl PassageExtractor {
    /// Create an extractor. `long_context` serves the LLM-only fallback.
    pub fn new(
        config: ExtractConfig,
        selector: CompletionRouter,
        long_context: CompletionRouter,
    ) -> Self {
        Self {
            config,
            selector,
            long_context,
        }
    }

    fn policy(&self) -> CallPolicy {
        CallPolicy::new(self.config.retry_attempts, self.config.retry_backoff_ms)
    }

    /// Extract passages about `topic` from `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResearchError::Cancelled`] if the run is cancelled.
    /// Strategy failures never fail the call.
    pub async fn extract(
        &self,
        topic: &str,
        sources: &[RankedDocument],
        run: &mut RunContext,
    ) -> Result<ExtractionOutcome> {
        let candidates = self.lexical_candidates(topic, sources);

        match self.select_with_llm(topic, sources, &candidates, run).await {
            Ok(passages) => {
                return Ok(self.finish(passages, ExtractionStrategy::LexicalLlm));
            }
            Err(e) => self.fall_back(
                ExtractionStrategy::LexicalLlm,
                ExtractionStrategy::LlmOnly,
                e,
                run,
            )?,
        }

        match self.quote_with_llm(topic, sources, run).await {
            Ok(passages) => {
                return Ok(self.finish(passages, ExtractionStrategy::LlmOnly));
            }
            Err(e) => self.fall_back(
                ExtractionStrategy::LlmOnly,
                ExtractionStrategy::LexicalOnly,
                e,
                run,
            )?,
        }

        let mut passages = candidates;
        passages.truncate(self.config.max_passages);
        Ok(self.finish(passages, ExtractionStrategy::LexicalOnly))
    }

    fn finish(&self, passages: Vec<Passage>, strategy: ExtractionStrategy) -> ExtractionOutcome {
        let documents: BTreeSet<_> = passages.iter().map(|p| &p.document_id).collect();
        tracing::info!(
            strategy = strategy.as_str(),
            passages = passages.len(),
            documents = documents.len(),
            "passages extracted"
        );
        ExtractionOutcome { passages, strategy }
    }

    fn fall_back(
        &self,
        from: ExtractionStrategy,
        to: ExtractionStrategy,
        error: LlmError,
        run: &mut RunContext,
    ) -> Result<()> {
        if matches!(error, LlmError::Cancelled(_)) {
            return Err(run.cancelled(Stage::Extract));
        }
        run.degrade(Degradation::ExtractionFallback {
            from,
            to,
            error: error.to_string(),
        });
        Ok(())
    }

    /// BM25 candidates across all sources, best first, with relevance
    /// normalised to the best score.
    pub fn lexical_candidates(&self, topic: &str, sources: &[RankedDocument]) -> Vec<Passage> {
        let mut pool: Vec<(usize, String, Option<TextSpan>)> = Vec::new();
        for (doc_idx, ranked) in sources.iter().enumerate() {
            let document = &ranked.document;
            if document.full_text.trim().is_empty() {
                let fallback = format!("{}. {}", document.title.trim(), document.snippet.trim());
                if !fallback.trim_matches(|c: char| c == '.' || c.is_whitespace()).is_empty() {
                    pool.push((doc_idx, fallback, None));
                }
                continue;
            }
            for span in chunk_spans(
                &document.full_text,
                self.config.passage_min_words,
                self.config.passage_max_words,
            ) {
                pool.push((
                    doc_idx,
                    document.full_text[span.start..span.end].to_owned(),
                    Some(span),
                ));
            }
        }

        let texts: Vec<&str> = pool.iter().map(|(_, t, _)| t.as_str()).collect();
        let index = Bm25Index::new(&texts);
        let ranked = index.rank(topic);
        let best = ranked.first().map_or(0.0, |(_, s)| *s);

        let mut per_doc = vec![0usize; sources.len()];
        let mut out = Vec::new();
        for (i, score) in ranked {
            let (doc_idx, ref passage_text, span) = pool[i];
            if per_doc[doc_idx] >= self.config.candidates_per_document {
                continue;
            }
            per_doc[doc_idx] += 1;
            out.push(Passage {
                document_id: sources[doc_idx].document.id.clone(),
                text: passage_text.clone(),
                text_span: span,
                relevance_score: if best > 0.0 { score / best } else { 0.0 },
            });
            if out.len() >= self.config.max_candidates {
                break;
            }
        }
        out
    }

    async fn select_with_llm(
        &self,
        topic: &str,
        sources: &[RankedDocument],
        candidates: &[Passage],
        run: &RunContext,
    ) -> std::result::Result<Vec<Passage>, LlmError> {
        if candidates.is_empty() {
            return Err(LlmError::InvalidResponse("no passages to choose from".into()));
        }

        let mut prompt = format!("Topic: {topic}\n\nPassages:\n");
        for (i, passage) in candidates.iter().enumerate() {
            let url = sources
                .iter()
                .find(|s| s.document.id == passage.document_id)
                .map_or("", |s| s.document.url.as_str());
            prompt.push_str(&format!("\n[{}] (source: {url})\n{}\n", i + 1, passage.text));
        }
        prompt.push_str(&format!(
            "\nChoose up to {} passages that best support an informative article on the topic. \
             Reply as {{\"selected\": [passage numbers, most useful first]}}.",
            self.config.max_passages
        ));

        let request = CompletionRequest::new(SELECT_SYSTEM, prompt)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(0.0);
        let completion = self
            .selector
            .complete(&request, Stage::Extract, self.policy(), run.recorder(), run.cancel_token())
            .await?;

        let indices = parse_selection(&completion.text, candidates.len()).ok_or_else(|| {
            LlmError::InvalidResponse("selection did not name any listed passage".into())
        })?;
        let count = indices.len().min(self.config.max_passages);
        Ok(indices
            .into_iter()
            .take(count)
            .enumerate()
            .map(|(pos, i)| Passage {
                relevance_score: 1.0 - pos as f64 / count as f64,
                ..candidates[i].clone()
            })
            .collect())
    }

    async fn quote_with_llm(
        &self,
        topic: &str,
        sources: &[RankedDocument],
        run: &RunContext,
    ) -> std::result::Result<Vec<Passage>, LlmError> {
        let documents: Vec<&RankedDocument> = sources
            .iter()
            .filter(|s| !s.document.full_text.trim().is_empty())
            .take(self.config.llm_only_documents)
            .collect();
        if documents.is_empty() {
            return Err(LlmError::InvalidResponse("no fetched documents to quote from".into()));
        }

        let mut prompt = format!("Topic: {topic}\n");
        for (i, ranked) in documents.iter().enumerate() {
            prompt.push_str(&format!(
                "\nDocument {} ({}):\n{}\n",
                i + 1,
                ranked.document.url,
                text::truncate_chars(
                    &ranked.document.full_text,
                    self.config.llm_only_chars_per_document
                )
            ));
        }
        prompt.push_str(&format!(
            "\nQuote up to {} passages, verbatim, that best support an informative article on \
             the topic. Reply as [{{\"doc\": document number, \"quote\": \"exact text\"}}].",
            self.config.max_passages
        ));

        let request = CompletionRequest::new(QUOTE_SYSTEM, prompt)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(0.0);
        let completion = self
            .long_context
            .complete(&request, Stage::Extract, self.policy(), run.recorder(), run.cancel_token())
            .await?;

        let quotes = parse_quotes(&completion.text)
            .ok_or_else(|| LlmError::InvalidResponse("quotes are not a JSON list".into()))?;

        let mut located = Vec::new();
        let mut rejected = 0usize;
        for quote in quotes {
            let Some(ranked) = quote.doc.checked_sub(1).and_then(|i| documents.get(i)) else {
                rejected += 1;
                continue;
            };
            match locate(&ranked.document.full_text, &quote.quote) {
                Some(span) => located.push((ranked, span)),
                None => rejected += 1,
            }
        }
        if rejected > 0 {
            tracing::warn!(rejected, "quotes not found in their source document");
        }
        if located.is_empty() {
            return Err(LlmError::InvalidResponse(
                "no quote matched its source document".into(),
            ));
        }

        located.truncate(self.config.max_passages);
        let count = located.len();
        Ok(located
            .into_iter()
            .enumerate()
            .map(|(pos, (ranked, span))| Passage {
                document_id: ranked.document.id.clone(),
                text: ranked.document.full_text[span.start..span.end].to_owned(),
                text_span: Some(span),
                relevance_score: 1.0 - pos as f64 / count as f64,
            })
            .collect())
    }
}

/// Paragraph-aligned passage spans.
///
/// Words accumulate until a paragraph break (`\n\n`) is reached with at
/// least `min_words` collected, or until `max_words` is hit mid-paragraph.
pub fn chunk_spans(text: &str, min_words: usize, max_words: usize) -> Vec<TextSpan> {
    let max_words = max_words.max(1);
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut count = 0;

    for (word_start, word_end) in word_bounds(text) {
        if count > 0 && count >= min_words && text[end..word_start].contains("\n\n") {
            if let Some(s) = start.take() {
                spans.push(TextSpan { start: s, end });
            }
            count = 0;
        }
        start.get_or_insert(word_start);
        end = word_end;
        count += 1;
        if count >= max_words {
            if let Some(s) = start.take() {
                spans.push(TextSpan { start: s, end });
            }
            count = 0;
        }
    }
    if let Some(s) = start {
        spans.push(TextSpan { start: s, end });
    }
    spans
}

fn word_bounds(text: &str) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut current: Option<usize> = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), current) {
            (true, Some(s)) => {
                bounds.push((s, i));
                current = None;
            }
            (false, None) => current = Some(i),
            _ => {}
        }
    }
    if let Some(s) = current {
        bounds.push((s, text.len()));
    }
    bounds
}

/// Byte span of `quote` in `text`, trying an exact match first and then a
/// whitespace-insensitive one.
fn locate(text: &str, quote: &str) -> Option<TextSpan> {
    let quote = quote.trim().trim_matches('"').trim();
    if quote.is_empty() {
        return None;
    }
    if let Some(start) = text.find(quote) {
        return Some(TextSpan {
            start,
            end: start + quote.len(),
        });
    }

    let wanted: Vec<&str> = quote.split_whitespace().collect();
    let words = word_bounds(text);
    words
        .windows(wanted.len())
        .find(|window| {
            window
                .iter()
                .zip(&wanted)
                .all(|(&(s, e), w)| &text[s..e] == *w)
        })
        .map(|window| TextSpan {
            start: window[0].0,
            end: window[window.len() - 1].1,
        })
}

/// Strip code fences and return the outermost JSON array or object.
fn json_payload(reply: &str) -> Option<serde_json::Value> {
    let start = reply.find(['{', '['])?;
    let end = reply.rfind(['}', ']'])?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// 1-based passage numbers from a selection reply, as 0-based indices.
/// Out-of-range and repeated numbers are skipped.
fn parse_selection(reply: &str, available: usize) -> Option<Vec<usize>> {
    let value = json_payload(reply)?;
    let list = match &value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.get("selected")?.as_array()?,
        _ => return None,
    };
    let mut seen = BTreeSet::new();
    let indices: Vec<usize> = list
        .iter()
        .filter_map(serde_json::Value::as_u64)
        .filter_map(|n| usize::try_from(n).ok()?.checked_sub(1))
        .filter(|&i| i < available && seen.insert(i))
        .collect();
    (!indices.is_empty()).then_some(indices)
}

#[derive(Debug, Deserialize)]
struct Quote {
    doc: usize,
    #[serde(alias = "text")]
    quote: String,
}

fn parse_quotes(reply: &str) -> Option<Vec<Quote>> {
    let value = json_payload(reply)?;
    let list = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("passages")? {
            serde_json::Value::Array(items) => items,
            _ => return None,
        },
        _ => return None,
    };
    Some(
        list.into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    )
}
