//! Question answering over the vector index.
//!
//! [`QueryEngine::query`] embeds the question, retrieves the `k` most similar
//! chunks, joins them into a context block, fills [`PROMPT_TEMPLATE`] and asks
//! the [`GenerationBackend`] for an answer. The chunk texts that went into the
//! prompt come back as the sources, in retrieval order.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::AnswerResponse;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationBackend;
use crate::vectorstore::VectorStore;

/// Largest `k` a caller may request.
pub const MAX_TOP_K: usize = 10;

/// Answer returned when the index holds nothing to retrieve.
pub const NO_INFORMATION_ANSWER: &str =
    "I don't have any information to answer that yet. Please add some documents first.";

/// Prompt sent to the generation backend. `{context}` and `{question}` are
/// replaced verbatim.
pub const PROMPT_TEMPLATE: &str = "Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say that you don't know, don't try to make up an answer.

Context:
{context}

Question: {question}

Answer:";

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Fill [`PROMPT_TEMPLATE`] with `context` and `question`.
pub fn build_prompt(context: &str, question: &str) -> String {
    // Question last so braces inside the context are never re-substituted.
    PROMPT_TEMPLATE.replacen("{context}", context, 1).replacen("{question}", question, 1)
}

/// Reject a `k` outside `1..=MAX_TOP_K` or a temperature outside `0.0..=1.0`.
pub fn validate_request(k: usize, temperature: f32) -> Result<()> {
    if !(1..=MAX_TOP_K).contains(&k) {
        return Err(RagError::InvalidRequest(format!("k must be between 1 and {MAX_TOP_K}, got {k}")));
    }
    if !(0.0..=1.0).contains(&temperature) {
        return Err(RagError::InvalidRequest(format!(
            "temperature must be between 0.0 and 1.0, got {temperature}"
        )));
    }
    Ok(())
}

/// Answers questions from the chunks stored in a [`VectorStore`].
///
/// Holds shared handles only; it never writes to the index, so dropping an
/// in-flight query is harmless.
#[derive(Clone)]
pub struct QueryEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    backend: Arc<dyn GenerationBackend>,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self { embedder, store, backend }
    }

    /// Answer `question` from the `k` most relevant chunks.
    ///
    /// An empty index yields [`NO_INFORMATION_ANSWER`] with no sources, and
    /// neither the embedder nor the backend is called.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidRequest`] for a blank question, or `k` / `temperature` out of range
    /// - [`RagError::EmbeddingError`] or [`RagError::DimensionMismatch`] from retrieval
    /// - [`RagError::GenerationBackendError`] if the backend fails or times out
    pub async fn query(&self, question: &str, k: usize, temperature: f32) -> Result<AnswerResponse> {
        validate_request(k, temperature)?;
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest("question must not be empty".to_string()));
        }

        if self.store.is_empty().await {
            info!("index is empty, answering without retrieval");
            return Ok(AnswerResponse { answer: NO_INFORMATION_ANSWER.to_string(), sources: Vec::new() });
        }

        let embedding = self.embedder.embed_query(question).await.map_err(|e| {
            error!(error = %e, "failed to embed question");
            e
        })?;
        let results = self.store.search(&embedding, k).await?;
        debug!(
            k,
            retrieved = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieved context"
        );

        let sources: Vec<String> = results.into_iter().map(|r| r.chunk.text).collect();
        let prompt = build_prompt(&sources.join(CONTEXT_SEPARATOR), question);

        let answer = self.backend.generate(&prompt, temperature).await.map_err(|e| {
            error!(backend = self.backend.name(), error = %e, "generation failed");
            e
        })?;
        info!(sources = sources.len(), answer_len = answer.len(), "answered question");

        Ok(AnswerResponse { answer, sources })
    }
}
