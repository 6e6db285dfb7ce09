//! Article synthesis with inline numbered citations.
//!
//! Sources are numbered in the order their first passage appears, and the
//! model is asked to cite them as `[n]`. The reply is then repaired: markers
//! pointing at sources that were never offered are removed, and the
//! surviving markers are renumbered by first appearance in the body so the
//! article's citations run contiguously from 1.

use std::collections::HashMap;

use crate::config::SynthConfig;
use crate::error::{ResearchError, Result, Stage};
use crate::llm::{CallPolicy, CompletionRequest, CompletionRouter, LlmError};
use crate::rerank::RankedDocument;
use crate::run::RunContext;
use crate::text;
use crate::types::{Citation, DocumentId, MarketConfig, Passage};

const SYSTEM: &str = "You are a careful research writer. Write clear, well-structured articles \
    grounded only in the sources provided. Every factual claim must carry a numbered citation \
    like [1] or [2, 3] that refers to the source list. Never invent sources or citation numbers.";

/// Article body with its citation list.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    /// Body text with contiguous `[n]` markers.
    pub body_text: String,
    /// One entry per distinct cited source, ordered by index.
    pub citations: Vec<Citation>,
    /// Words in `body_text`.
    pub word_count: usize,
}

/// Writes the article from extracted passages.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: SynthConfig,
    model: CompletionRouter,
}

impl Synthesizer {
    /// Create a synthesizer.
    pub fn new(config: SynthConfig, model: CompletionRouter) -> Self {
        Self { config, model }
    }

    /// Write an article on `topic` from `passages`.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::SynthesisFailed`] when there is nothing to
    /// write from, the model fails after its retry budget, or the reply is
    /// empty; [`ResearchError::Cancelled`] if the run is cancelled.
    pub async fn synthesize(
        &self,
        topic: &str,
        market: &MarketConfig,
        passages: &[Passage],
        sources: &[RankedDocument],
        run: &RunContext,
    ) -> Result<SynthesisOutput> {
        let failed = |cause: String| ResearchError::SynthesisFailed {
            topic: topic.to_owned(),
            cause,
        };
        if passages.is_empty() {
            return Err(failed("no passages to write from".into()));
        }

        let urls: HashMap<&DocumentId, &str> = sources
            .iter()
            .map(|s| (&s.document.id, s.document.url.as_str()))
            .collect();
        let mut numbered: Vec<&DocumentId> = Vec::new();
        for passage in passages {
            if !numbered.contains(&&passage.document_id) {
                numbered.push(&passage.document_id);
            }
        }

        let prompt = self.prompt(topic, market, passages, &numbered, &urls);
        let request = CompletionRequest::new(SYSTEM, prompt)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let policy = CallPolicy::new(self.config.retry_attempts, self.config.retry_backoff_ms);
        let completion = self
            .model
            .complete(&request, Stage::Synthesis, policy, run.recorder(), run.cancel_token())
            .await
            .map_err(|e| match e {
                LlmError::Cancelled(_) => run.cancelled(Stage::Synthesis),
                other => failed(other.to_string()),
            })?;

        let repaired = renumber_citations(completion.text.trim(), numbered.len());
        if repaired.removed > 0 {
            tracing::warn!(
                topic,
                removed = repaired.removed,
                "removed citation markers with no matching source"
            );
        }
        let body_text = repaired.body.trim().to_owned();
        if body_text.is_empty() {
            return Err(failed("model returned an empty article".into()));
        }
        if repaired.order.is_empty() {
            tracing::warn!(topic, "article has no citations");
        }

        let citations = repaired
            .order
            .iter()
            .enumerate()
            .map(|(i, &source)| {
                let document_id = numbered[source].clone();
                let url = urls.get(&document_id).copied().unwrap_or_default().to_owned();
                Citation {
                    index: i + 1,
                    document_id,
                    url,
                }
            })
            .collect();
        let word_count = text::word_count(&body_text);
        tracing::info!(topic, word_count, "article synthesized");

        Ok(SynthesisOutput {
            body_text,
            citations,
            word_count,
        })
    }

    fn prompt(
        &self,
        topic: &str,
        market: &MarketConfig,
        passages: &[Passage],
        numbered: &[&DocumentId],
        urls: &HashMap<&DocumentId, &str>,
    ) -> String {
        let mut prompt = format!(
            "Write an article of about {} words on the topic: {topic}\n\
             Audience: market {}, language {}",
            self.config.target_words, market.market, market.language
        );
        if !market.vertical.is_empty() {
            prompt.push_str(&format!(", vertical {}", market.vertical));
        }
        if !market.domain.is_empty() {
            prompt.push_str(&format!(", publication {}", market.domain));
        }
        prompt.push_str("\n\nSources:\n");
        for (i, id) in numbered.iter().enumerate() {
            let url = urls.get(id).copied().unwrap_or_default();
            prompt.push_str(&format!("\n[{}] {url}\n", i + 1));
            for passage in passages.iter().filter(|p| &p.document_id == *id) {
                prompt.push_str(&format!("- {}\n", passage.text.trim()));
            }
        }
        prompt.push_str(&format!(
            "\nCite sources inline as [n] using only the numbers 1 to {}. \
             Do not add a reference list.",
            numbered.len()
        ));
        prompt
    }
}

/// Body text after citation repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbered {
    /// Body with markers rewritten.
    pub body: String,
    /// 0-based source numbers in their new citation order.
    pub order: Vec<usize>,
    /// Marker numbers removed because they named no source.
    pub removed: usize,
}

/// Rewrite citation markers so only sources `1..=sources` remain and
/// numbering is contiguous by first appearance.
///
/// A marker is a bracket holding numbers separated by commas, semicolons,
/// or spaces, with `a-b` ranges (hyphen, en or em dash) expanded. Bracketed
/// text that is anything else is left alone. A marker whose every number is
/// invalid is deleted along with the space before it.
pub fn renumber_citations(body: &str, sources: usize) -> Renumbered {
    let mut out = String::with_capacity(body.len());
    let mut order: Vec<usize> = Vec::new();
    let mut removed = 0;
    let mut rest = body;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let ranges = after
            .find(']')
            .and_then(|close| parse_marker(&after[..close]).map(|r| (close, r)));
        let Some((close, ranges)) = ranges else {
            out.push('[');
            rest = after;
            continue;
        };

        let mut mapped: Vec<usize> = Vec::new();
        for (lo, hi) in ranges {
            let first = lo.max(1);
            let last = hi.min(sources);
            let valid = if last >= first { last - first + 1 } else { 0 };
            removed += (hi - lo).saturating_add(1) - valid;
            for n in first..=last {
                let source = n - 1;
                let index = match order.iter().position(|&s| s == source) {
                    Some(pos) => pos + 1,
                    None => {
                        order.push(source);
                        order.len()
                    }
                };
                if !mapped.contains(&index) {
                    mapped.push(index);
                }
            }
        }

        if mapped.is_empty() {
            while out.ends_with(' ') {
                out.pop();
            }
        } else {
            let list: Vec<String> = mapped.iter().map(ToString::to_string).collect();
            out.push('[');
            out.push_str(&list.join(", "));
            out.push(']');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Renumbered {
        body: out,
        order,
        removed,
    }
}

/// Inclusive number ranges in a marker body such as `2`, `1, 3`, `2 1` or
/// `1-3`; `None` if it is not a marker.
fn parse_marker(inner: &str) -> Option<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    let mut pending: Option<usize> = None;
    let mut in_range = false;
    let mut chars = inner.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '0'..='9' => {
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                // Only digits, so a parse failure is overflow: out of range.
                let n = inner[start..end].parse().unwrap_or(usize::MAX);
                if in_range {
                    let lo = pending.take()?;
                    ranges.push((lo.min(n), lo.max(n)));
                    in_range = false;
                } else if let Some(previous) = pending.replace(n) {
                    ranges.push((previous, previous));
                }
            }
            '-' | '\u{2013}' | '\u{2014}' => {
                if pending.is_none() || in_range {
                    return None;
                }
                in_range = true;
            }
            ',' | ';' => {
                if in_range {
                    return None;
                }
                if let Some(previous) = pending.take() {
                    ranges.push((previous, previous));
                }
            }
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }

    if in_range {
        return None;
    }
    if let Some(previous) = pending {
        ranges.push((previous, previous));
    }
    (!ranges.is_empty()).then_some(ranges)
}
