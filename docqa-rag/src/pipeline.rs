//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] is the caller-facing surface: it loads documents
//! through a [`LoaderRegistry`], splits them with a [`Chunker`], embeds the
//! chunks with an [`EmbeddingProvider`], stores them in a [`VectorStore`] and
//! answers questions through a [`QueryEngine`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::from_config(RagConfig::default()).await?;
//! pipeline.process_document("notes/sky.txt").await?;
//! let response = pipeline.ask("What color is the sky?", 4, 0.7).await?;
//! println!("{}", response.answer);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::{RagConfig, build_embedding_provider, build_generation_backend};
use crate::document::{AnswerResponse, Document, IndexEntry};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::filestore::FileVectorStore;
use crate::generation::GenerationBackend;
use crate::loader::LoaderRegistry;
use crate::query::QueryEngine;
use crate::vectorstore::VectorStore;

/// Result of ingesting one file in a batch.
#[derive(Debug)]
pub struct IngestOutcome {
    pub path: PathBuf,
    /// Number of chunks stored, or why the file was skipped.
    pub result: Result<usize>,
}

impl IngestOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Snapshot of the index for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStatus {
    pub entries: usize,
    pub dimensions: Option<usize>,
    pub embedding_model: String,
}

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (load → chunk → embed → store) and
/// question answering (embed → search → prompt → generate). Construct one via
/// [`RagPipeline::builder()`] or [`RagPipeline::from_config`].
pub struct RagPipeline {
    config: RagConfig,
    loaders: LoaderRegistry,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    engine: QueryEngine,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Build the providers named in `config` and open the persistent index in
    /// `config.index_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for invalid settings,
    /// [`RagError::ModelMismatch`] if the index was built with a different
    /// embedding model, and [`RagError::IndexCorrupt`] if it cannot be read.
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.request_timeout();
        let embedder = build_embedding_provider(&config.embedder, timeout)?;
        let backend = build_generation_backend(&config.generator, timeout)?;
        let store =
            FileVectorStore::open_with_model(&config.index_dir, embedder.model_id()).await?;

        Self::builder()
            .config(config)
            .embedding_provider(embedder)
            .vector_store(Arc::new(store))
            .generation_backend(backend)
            .build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the loader registry.
    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Load the file at `path` and ingest it. Returns the number of chunks stored.
    ///
    /// # Errors
    ///
    /// [`RagError::UnsupportedFormat`] or [`RagError::DocumentLoad`] if the file
    /// cannot be decoded, plus the errors of [`ingest`](Self::ingest).
    pub async fn process_document(&self, path: impl AsRef<Path>) -> Result<usize> {
        let document = self.loaders.load_path(path.as_ref())?;
        self.ingest(&document).await
    }

    /// Ingest uploaded content named `name` without touching the filesystem.
    pub async fn process_bytes(&self, name: &str, bytes: &[u8]) -> Result<usize> {
        let document = self.loaders.load_bytes(name, bytes)?;
        self.ingest(&document).await
    }

    /// Ingest each file in turn. A failing file is reported in its outcome and
    /// never stops the rest.
    pub async fn process_documents<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let result = self.process_document(path).await;
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "skipping document");
            }
            outcomes.push(IngestOutcome { path: path.to_path_buf(), result });
        }
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(total = outcomes.len(), succeeded, "processed documents");
        outcomes
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Returns the number of chunks stored. A document with no text stores
    /// nothing and returns 0.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if embedding fails and
    /// [`RagError::DimensionMismatch`] if the vectors do not fit the index.
    /// Nothing is stored for the document in either case.
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let chunks = self.chunker.split(document);
        if chunks.is_empty() {
            info!(source = %document.source, chunk_count = 0, "ingested document (empty)");
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings =
            self.embedding_provider.embed_documents(&texts).await.map_err(|e| {
                error!(source = %document.source, error = %e, "embedding failed during ingestion");
                e
            })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.model_id(),
                message: format!(
                    "expected {} embeddings for '{}', got {}",
                    chunks.len(),
                    document.source,
                    embeddings.len()
                ),
            });
        }

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        self.vector_store.add(&entries).await.map_err(|e| {
            error!(source = %document.source, error = %e, "storing chunks failed during ingestion");
            e
        })?;

        let chunk_count = entries.len();
        info!(source = %document.source, format = %document.format, chunk_count, "ingested document");
        Ok(chunk_count)
    }

    /// Answer `question` from the `k` most relevant chunks.
    ///
    /// See [`QueryEngine::query`].
    pub async fn ask(&self, question: &str, k: usize, temperature: f32) -> Result<AnswerResponse> {
        self.engine.query(question, k, temperature).await
    }

    /// Answer `question` with the configured `top_k` and `temperature`.
    pub async fn ask_with_defaults(&self, question: &str) -> Result<AnswerResponse> {
        self.ask(question, self.config.top_k, self.config.temperature).await
    }

    /// Remove every stored chunk. The index stays usable.
    pub async fn reset(&self) -> Result<()> {
        self.vector_store.clear().await?;
        info!("vector index reset");
        Ok(())
    }

    pub async fn status(&self) -> IndexStatus {
        IndexStatus {
            entries: self.vector_store.len().await,
            dimensions: self.vector_store.dimensions().await,
            embedding_model: self.embedding_provider.model_id(),
        }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The chunker defaults to a [`RecursiveChunker`] sized from the config and
/// the loaders to [`LoaderRegistry::default()`]. Everything else is required.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
///     .vector_store(Arc::new(InMemoryVectorStore::new()))
///     .generation_backend(Arc::new(backend))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    loaders: Option<LoaderRegistry>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    generation_backend: Option<Arc<dyn GenerationBackend>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default loader registry.
    pub fn loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = Some(loaders);
        self
    }

    /// Replace the default document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the language model that writes answers.
    pub fn generation_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.generation_backend = Some(backend);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let generation_backend = self.generation_backend.ok_or_else(|| {
            RagError::ConfigError("generation_backend is required".to_string())
        })?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let engine = QueryEngine::new(
            embedding_provider.clone(),
            vector_store.clone(),
            generation_backend,
        );

        Ok(RagPipeline {
            config,
            loaders: self.loaders.unwrap_or_default(),
            chunker,
            embedding_provider,
            vector_store,
            engine,
        })
    }
}
