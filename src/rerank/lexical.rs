//! Stage 1: BM25 over every deduplicated document.

use crate::bm25::Bm25Index;
use crate::types::{Document, StageScores};

use super::RankedDocument;

/// Score `documents` against `query` and keep the best `keep`.
///
/// Unfetched documents are scored on title and snippet. Ties keep the
/// incoming (fusion) order.
pub fn rank(query: &str, documents: Vec<Document>, keep: usize) -> Vec<RankedDocument> {
    let texts: Vec<String> = documents.iter().map(Document::scoring_text).collect();
    let index = Bm25Index::new(&texts);
    let ranked = index.rank(query);

    let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
    ranked
        .into_iter()
        .take(keep)
        .filter_map(|(i, score)| {
            let document = slots.get_mut(i)?.take()?;
            Some(RankedDocument {
                document,
                scores: StageScores {
                    lexical: score,
                    ..StageScores::default()
                },
            })
        })
        .collect()
}
