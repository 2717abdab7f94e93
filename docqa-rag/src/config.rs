//! Configuration for the RAG pipeline.
//!
//! [`RagConfig`] is plain serde data, so the same struct is built in code with
//! [`RagConfig::builder`] or loaded from a TOML file:
//!
//! ```toml
//! chunk_size = 1000
//! chunk_overlap = 200
//! top_k = 4
//! temperature = 0.7
//! index_dir = "./vector_index"
//!
//! [embedder]
//! provider = "ollama"
//! model = "all-minilm"
//! dimensions = 384
//!
//! [generator]
//! provider = "ollama"
//! model = "llama3"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{
    DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_CHAT_MODEL,
    GenerationBackend, OllamaBackend, OpenAIChatBackend,
};
use crate::hashing::HashingEmbeddingProvider;
use crate::ollama::{
    DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS, DEFAULT_OLLAMA_EMBEDDING_MODEL, OllamaEmbeddingProvider,
};
use crate::openai::{DEFAULT_OPENAI_EMBEDDING_MODEL, OpenAIEmbeddingProvider};
use crate::query::MAX_TOP_K;

/// Which embedding model turns text into vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbedderConfig {
    /// Offline FNV-1a bag-of-words vectors.
    Hashing {
        #[serde(default = "default_hashing_dimensions")]
        dimensions: usize,
    },
    /// A model served by a local Ollama instance.
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_embedding_model")]
        model: String,
        #[serde(default = "default_ollama_embedding_dimensions")]
        dimensions: usize,
    },
    /// The OpenAI embeddings API or a compatible server.
    OpenAI {
        #[serde(default = "default_openai_base_url")]
        base_url: String,
        #[serde(default = "default_openai_embedding_model")]
        model: String,
        /// Matryoshka truncation; the model's native size when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<usize>,
        /// Falls back to `OPENAI_API_KEY`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self::Hashing { dimensions: HashingEmbeddingProvider::DEFAULT_DIMENSIONS }
    }
}

/// Which language model writes the answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum GeneratorConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        model: String,
    },
    OpenAI {
        #[serde(default = "default_openai_base_url")]
        base_url: String,
        #[serde(default = "default_openai_chat_model")]
        model: String,
        /// Falls back to `OPENAI_API_KEY`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::Ollama { base_url: default_ollama_url(), model: default_ollama_model() }
    }
}

fn default_hashing_dimensions() -> usize {
    HashingEmbeddingProvider::DEFAULT_DIMENSIONS
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_ollama_embedding_model() -> String {
    DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string()
}

fn default_ollama_embedding_dimensions() -> usize {
    DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_openai_embedding_model() -> String {
    DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()
}

fn default_openai_chat_model() -> String {
    DEFAULT_OPENAI_CHAT_MODEL.to_string()
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question when the caller doesn't say.
    pub top_k: usize,
    /// Sampling temperature used when the caller doesn't say.
    pub temperature: f32,
    /// Directory holding the persistent vector index.
    pub index_dir: PathBuf,
    pub embedder: EmbedderConfig,
    pub generator: GeneratorConfig,
    /// Timeout applied to each embedding and generation HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            temperature: 0.7,
            index_dir: PathBuf::from("./vector_index"),
            embedder: EmbedderConfig::default(),
            generator: GeneratorConfig::default(),
            request_timeout_secs: 120,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| RagError::ConfigError(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Serialize to TOML. API keys are included if set.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RagError::ConfigError(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k` is outside `1..=10`
    /// - `temperature` is outside `0.0..=1.0`
    /// - `request_timeout_secs == 0`
    /// - the embedder is configured with zero dimensions
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(RagError::ConfigError(format!(
                "top_k ({}) must be between 1 and {MAX_TOP_K}",
                self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be between 0.0 and 1.0",
                self.temperature
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        let dims = match &self.embedder {
            EmbedderConfig::Hashing { dimensions } | EmbedderConfig::Ollama { dimensions, .. } => {
                Some(*dimensions)
            }
            EmbedderConfig::OpenAI { dimensions, .. } => *dimensions,
        };
        if dims == Some(0) {
            return Err(RagError::ConfigError(
                "embedder dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    pub fn embedder(mut self, embedder: EmbedderConfig) -> Self {
        self.config.embedder = embedder;
        self
    }

    pub fn generator(mut self, generator: GeneratorConfig) -> Self {
        self.config.generator = generator;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn resolve_api_key(explicit: Option<&str>) -> Result<String> {
    match explicit {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError(
                "OpenAI provider selected but no api_key configured and OPENAI_API_KEY is not set"
                    .to_string(),
            )
        }),
    }
}

/// Construct the embedding provider selected by `config`.
pub fn build_embedding_provider(
    config: &EmbedderConfig,
    timeout: Duration,
) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config {
        EmbedderConfig::Hashing { dimensions } => {
            Arc::new(HashingEmbeddingProvider::new(*dimensions))
        }
        EmbedderConfig::Ollama { base_url, model, dimensions } => {
            Arc::new(OllamaEmbeddingProvider::new(base_url, model, *dimensions, timeout)?)
        }
        EmbedderConfig::OpenAI { base_url, model, dimensions, api_key } => {
            let mut provider = OpenAIEmbeddingProvider::new(resolve_api_key(api_key.as_deref())?)?
                .with_base_url(base_url)
                .with_model(model)
                .with_timeout(timeout)?;
            if let Some(dims) = dimensions {
                provider = provider.with_dimensions(*dims);
            }
            Arc::new(provider)
        }
    })
}

/// Construct the generation backend selected by `config`.
pub fn build_generation_backend(
    config: &GeneratorConfig,
    timeout: Duration,
) -> Result<Arc<dyn GenerationBackend>> {
    Ok(match config {
        GeneratorConfig::Ollama { base_url, model } => {
            Arc::new(OllamaBackend::new(base_url, model, timeout)?)
        }
        GeneratorConfig::OpenAI { base_url, model, api_key } => Arc::new(OpenAIChatBackend::new(
            base_url,
            resolve_api_key(api_key.as_deref())?,
            model,
            timeout,
        )?),
    })
}
