//! Embedding provider seam and vector similarity.
//!
//! The reranker uses two embedders: a cheap "lite" model over truncated
//! text for stage 2 and a higher-fidelity model over longer text for
//! stage 3. Both are reached through [`EmbeddingClient`] and called via
//! [`embed_texts`], which validates the response shape and records cost.

use async_trait::async_trait;
use topicforge_search::CostRecorder;
use tokio_util::sync::CancellationToken;

use crate::error::Stage;
use crate::llm::{call_model, CallPolicy, LlmError, ModelDescriptor, TokenUsage};

/// Vectors for a batch of inputs, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
    /// One vector per input.
    pub vectors: Vec<Vec<f32>>,
    /// Token usage reported by the provider.
    pub usage: TokenUsage,
}

/// Batch embedding provider.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Identity and pricing.
    fn descriptor(&self) -> &ModelDescriptor;

    /// Embed every input. Implementations must not retry internally.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, provider, or parse failure.
    async fn embed(&self, inputs: &[String]) -> Result<Embeddings, LlmError>;
}

/// Embed `inputs` under `policy`, rejecting responses whose vector count or
/// dimensions do not line up.
///
/// # Errors
///
/// Returns [`LlmError::InvalidResponse`] for a malformed batch, or any
/// error from [`call_model`].
pub async fn embed_texts(
    client: &dyn EmbeddingClient,
    inputs: &[String],
    stage: Stage,
    policy: CallPolicy,
    recorder: &CostRecorder,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, LlmError> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    call_model(
        client.descriptor(),
        stage,
        policy,
        recorder,
        cancel,
        false,
        || async move {
            let embeddings = client.embed(inputs).await?;
            check_batch(&embeddings.vectors, inputs.len())?;
            Ok((embeddings.vectors, embeddings.usage))
        },
    )
    .await
}

fn check_batch(vectors: &[Vec<f32>], expected: usize) -> Result<(), LlmError> {
    if vectors.len() != expected {
        return Err(LlmError::InvalidResponse(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    let dim = vectors.first().map_or(0, Vec::len);
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return Err(LlmError::InvalidResponse(
            "embedding vectors have inconsistent dimensions".into(),
        ));
    }
    Ok(())
}

/// Cosine similarity in `[-1, 1]`; `0.0` for zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let denom = norm_a * norm_b;
    if denom < 1e-12 {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
