//! In-memory Okapi BM25 over small corpora.
//!
//! Used twice: stage-1 reranking at document granularity and the passage
//! pre-filter at paragraph granularity. Corpora are tens to a few hundred
//! entries, so the index is rebuilt per call.

use std::collections::HashMap;

use crate::text;

/// Term-frequency saturation.
pub const K1: f64 = 1.2;
/// Length normalisation.
pub const B: f64 = 0.75;

/// A BM25 index over a fixed set of documents.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    /// Index `docs`; tokens are lowercased and stopwords dropped.
    pub fn new<S: AsRef<str>>(docs: &[S]) -> Self {
        let mut term_freqs = Vec::with_capacity(docs.len());
        let mut doc_lens = Vec::with_capacity(docs.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let tokens = text::content_tokens(doc.as_ref());
            doc_lens.push(tokens.len());
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(tf);
        }

        let total: usize = doc_lens.iter().sum();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            term_freqs,
            doc_lens,
            doc_freq,
            avg_len,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Non-negative IDF (Lucene variant).
    fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of document `idx` for `query`.
    pub fn score(&self, query: &str, idx: usize) -> f64 {
        let Some(tf) = self.term_freqs.get(idx) else {
            return 0.0;
        };
        let len = self.doc_lens[idx] as f64;
        let norm = if self.avg_len > 0.0 {
            1.0 - B + B * len / self.avg_len
        } else {
            1.0
        };

        let mut query_terms = text::content_tokens(query);
        query_terms.sort();
        query_terms.dedup();

        query_terms
            .iter()
            .filter_map(|term| tf.get(term).map(|&f| (term, f as f64)))
            .map(|(term, f)| self.idf(term) * f * (K1 + 1.0) / (f + K1 * norm))
            .sum()
    }

    /// `(index, score)` for every document, best first. Ties keep input order.
    pub fn rank(&self, query: &str) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> =
            (0..self.len()).map(|i| (i, self.score(query, i))).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored
    }
}
