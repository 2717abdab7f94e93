//! Ollama embedding provider for locally served embedding models.
//!
//! Calls `POST /api/embed`, which accepts a batch of inputs and returns one
//! vector per input in order.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::DEFAULT_OLLAMA_URL;

/// The default Ollama embedding model (all-MiniLM-L6-v2).
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "all-minilm";

/// The dimensionality of `all-minilm`.
pub const DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS: usize = 384;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// An [`EmbeddingProvider`] backed by a local Ollama server.
///
/// The model is loaded by the server on first use and stays resident there,
/// so the first call is slow and later calls are cheap.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434", "all-minilm", 384, timeout)?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `model`, which must produce `dimensions`-long vectors.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::EmbeddingError {
                provider: "Ollama".into(),
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        })
    }

    /// A provider for the default model on the default local server.
    pub fn local(timeout: Duration) -> Result<Self> {
        Self::new(
            DEFAULT_OLLAMA_URL,
            DEFAULT_OLLAMA_EMBEDDING_MODEL,
            DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS,
            timeout,
        )
    }

    fn check_response(&self, expected: usize, embeddings: &[Vec<f32>]) -> Result<()> {
        if embeddings.len() != expected {
            return Err(RagError::EmbeddingError {
                provider: "Ollama".into(),
                message: format!("expected {expected} embeddings, got {}", embeddings.len()),
            });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(RagError::EmbeddingError {
                provider: "Ollama".into(),
                message: format!(
                    "model '{}' returned {} dimensions, configured {}",
                    self.model,
                    bad.len(),
                    self.dimensions
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_documents(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: "Ollama".into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "Ollama", batch_size = texts.len(), model = %self.model, "embedding batch");

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Ollama", error = %e, "request failed");
                RagError::EmbeddingError {
                    provider: "Ollama".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            error!(provider = "Ollama", %status, "API error");
            return Err(RagError::EmbeddingError {
                provider: "Ollama".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = "Ollama", error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: "Ollama".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        self.check_response(texts.len(), &parsed.embeddings)?;
        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(dimensions: usize) -> OllamaEmbeddingProvider {
        OllamaEmbeddingProvider::new("http://localhost:11434/", "all-minilm", dimensions, Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn request_batches_inputs() {
        let body = serde_json::to_value(EmbedRequest { model: "all-minilm", input: &["a", "b"] }).unwrap();
        assert_eq!(body, json!({"model": "all-minilm", "input": ["a", "b"]}));
    }

    #[test]
    fn response_dimension_is_validated() {
        let provider = provider(3);
        assert!(provider.check_response(1, &[vec![0.1, 0.2, 0.3]]).is_ok());
        assert!(provider.check_response(2, &[vec![0.1, 0.2, 0.3]]).is_err());
        assert!(provider.check_response(1, &[vec![0.1, 0.2]]).is_err());
    }

    #[test]
    fn model_id_names_the_backend() {
        let provider = provider(384);
        assert_eq!(provider.model_id(), "ollama/all-minilm");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }
}
