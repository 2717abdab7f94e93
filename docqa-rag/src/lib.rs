//! Retrieval-augmented question answering over local documents.
//!
//! This crate provides:
//! - Document loading for PDF, plain text and markdown
//! - Recursive, overlap-aware chunking
//! - Pluggable embedding providers (offline hashing, Ollama, OpenAI)
//! - An in-memory and a crash-safe on-disk vector store
//! - Prompt assembly and pluggable generation backends (Ollama, OpenAI)
//! - A [`RagPipeline`] tying ingestion and question answering together
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::from_config(RagConfig::default()).await?;
//! pipeline.process_document("a.txt").await?;
//! let response = pipeline.ask("What color is the sky?", 1, 0.0).await?;
//! for source in &response.sources {
//!     println!("- {source}");
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod generation;
pub mod hashing;
pub mod inmemory;
pub mod loader;
pub mod ollama;
pub mod openai;
pub mod pipeline;
pub mod query;
pub mod session;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{
    EmbedderConfig, GeneratorConfig, RagConfig, RagConfigBuilder, build_embedding_provider,
    build_generation_backend,
};
pub use document::{AnswerResponse, Chunk, Document, DocumentFormat, IndexEntry, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use filestore::{FileVectorStore, RepairReport};
pub use generation::{GenerationBackend, OllamaBackend, OpenAIChatBackend};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentLoader, LoaderRegistry, PdfLoader, TextLoader};
pub use ollama::OllamaEmbeddingProvider;
pub use openai::OpenAIEmbeddingProvider;
pub use pipeline::{IndexStatus, IngestOutcome, RagPipeline, RagPipelineBuilder};
pub use query::{MAX_TOP_K, NO_INFORMATION_ANSWER, QueryEngine};
pub use session::{ChatHistory, ChatMessage, Role};
pub use vectorstore::{VectorStore, cosine_similarity};
