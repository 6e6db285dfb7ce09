//! Query-to-document embedding similarity, shared by stages 2 and 3.

use crate::embedding::{cosine_similarity, embed_texts, EmbeddingClient};
use crate::error::Stage;
use crate::llm::{CallPolicy, LlmError};
use crate::run::RunContext;

/// Cosine similarity of `query` against each of `texts`, in order.
///
/// The query and the texts are embedded in one batch so a single call is
/// recorded per stage.
///
/// # Errors
///
/// Returns the embedding error; the caller decides whether to degrade.
pub async fn similarities(
    client: &dyn EmbeddingClient,
    query: &str,
    texts: Vec<String>,
    policy: CallPolicy,
    run: &RunContext,
) -> Result<Vec<f64>, LlmError> {
    let mut inputs = Vec::with_capacity(texts.len() + 1);
    inputs.push(query.to_owned());
    inputs.extend(texts);

    let vectors = embed_texts(
        client,
        &inputs,
        Stage::Rerank,
        policy,
        run.recorder(),
        run.cancel_token(),
    )
    .await?;

    let Some((query_vec, doc_vecs)) = vectors.split_first() else {
        return Err(LlmError::InvalidResponse("no query embedding".into()));
    };
    Ok(doc_vecs
        .iter()
        .map(|v| cosine_similarity(query_vec, v))
        .collect())
}
