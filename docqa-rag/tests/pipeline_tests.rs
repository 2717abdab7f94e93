//! End-to-end tests: ingest documents, ask questions, reset.
//!
//! Embeddings come from the offline hashing provider; generation is replaced
//! by in-process backends so no server is needed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa_rag::{
    EmbeddingProvider, FileVectorStore, GenerationBackend, HashingEmbeddingProvider,
    InMemoryVectorStore, NO_INFORMATION_ANSWER, RagConfig, RagError, RagPipeline, Result,
    VectorStore,
};

/// Answers with the context block of the prompt and records every call.
#[derive(Default)]
struct ContextEcho {
    calls: Mutex<Vec<(String, f32)>>,
}

impl ContextEcho {
    fn temperatures(&self) -> Vec<f32> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    fn last_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(p, _)| p.clone())
    }
}

#[async_trait]
impl GenerationBackend for ContextEcho {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.calls.lock().unwrap().push((prompt.to_string(), temperature));
        let context = prompt
            .split_once("Context:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nQuestion:"))
            .map(|(context, _)| context.to_string())
            .unwrap_or_default();
        Ok(format!("According to the documents: {context}"))
    }

    fn name(&self) -> &str {
        "context-echo"
    }
}

struct Unavailable;

#[async_trait]
impl GenerationBackend for Unavailable {
    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Err(RagError::GenerationBackendError {
            backend: "unavailable".into(),
            message: "request timed out".into(),
        })
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError { provider: "broken".into(), message: "offline".into() })
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn model_id(&self) -> String {
        "broken".into()
    }
}

fn pipeline_with(
    store: Arc<dyn VectorStore>,
    backend: Arc<dyn GenerationBackend>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .vector_store(store)
        .generation_backend(backend)
        .build()
        .unwrap()
}

fn in_memory(backend: Arc<dyn GenerationBackend>) -> RagPipeline {
    pipeline_with(Arc::new(InMemoryVectorStore::new()), backend)
}

#[tokio::test]
async fn answers_from_a_single_document() {
    let backend = Arc::new(ContextEcho::default());
    let pipeline = in_memory(backend.clone());

    assert_eq!(pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap(), 1);

    let response = pipeline.ask("What color is the sky?", 1, 0.0).await.unwrap();
    assert_eq!(response.sources, vec!["The sky is blue.".to_string()]);
    assert!(response.answer.contains("blue"));

    let prompt = backend.last_prompt().unwrap();
    assert!(prompt.contains("Question: What color is the sky?"));
    assert!(prompt.contains("don't know"));
}

#[tokio::test]
async fn reset_returns_no_information_response() {
    let backend = Arc::new(ContextEcho::default());
    let pipeline = in_memory(backend.clone());
    pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();

    pipeline.reset().await.unwrap();
    let response = pipeline.ask("What color is the sky?", 4, 0.7).await.unwrap();
    assert_eq!(response.answer, NO_INFORMATION_ANSWER);
    assert!(response.sources.is_empty());
    assert!(backend.last_prompt().is_none());

    // Reset twice is the same as once, and the index stays usable.
    pipeline.reset().await.unwrap();
    pipeline.process_bytes("b.txt", b"Grass is green.").await.unwrap();
    assert_eq!(pipeline.status().await.entries, 1);
}

#[tokio::test]
async fn two_documents_are_ordered_by_relevance() {
    let pipeline = in_memory(Arc::new(ContextEcho::default()));
    pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();
    pipeline.process_bytes("b.md", b"Bananas grow in bunches.").await.unwrap();

    let response = pipeline.ask("What color is the sky?", 2, 0.5).await.unwrap();
    assert_eq!(
        response.sources,
        vec!["The sky is blue.".to_string(), "Bananas grow in bunches.".to_string()]
    );

    let response = pipeline.ask("Which fruit grows in bunches?", 2, 0.5).await.unwrap();
    assert_eq!(response.sources[0], "Bananas grow in bunches.");

    // Context is joined in retrieval order.
    assert!(response.answer.ends_with("Bananas grow in bunches.\n\nThe sky is blue."));
}

#[tokio::test]
async fn k_larger_than_index_returns_everything() {
    let pipeline = in_memory(Arc::new(ContextEcho::default()));
    pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();
    let response = pipeline.ask("What color is the sky?", 10, 0.5).await.unwrap();
    assert_eq!(response.sources.len(), 1);
}

#[tokio::test]
async fn temperature_is_forwarded_per_call() {
    let backend = Arc::new(ContextEcho::default());
    let pipeline = in_memory(backend.clone());
    pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();

    pipeline.ask("sky?", 1, 0.0).await.unwrap();
    pipeline.ask("sky?", 1, 1.0).await.unwrap();
    pipeline.ask_with_defaults("sky?").await.unwrap();
    assert_eq!(backend.temperatures(), vec![0.0, 1.0, 0.7]);
}

#[tokio::test]
async fn out_of_range_requests_are_rejected() {
    let backend = Arc::new(ContextEcho::default());
    let pipeline = in_memory(backend.clone());
    pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();

    for (k, temperature) in [(0, 0.5), (11, 0.5), (3, -0.1), (3, 1.1)] {
        let err = pipeline.ask("sky?", k, temperature).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidRequest(_)), "k={k} t={temperature}: {err:?}");
    }
    assert!(backend.last_prompt().is_none());
}

#[tokio::test]
async fn backend_failure_is_reported_and_index_untouched() {
    let pipeline = in_memory(Arc::new(Unavailable));
    pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();

    let err = pipeline.ask("What color is the sky?", 1, 0.2).await.unwrap_err();
    assert!(matches!(err, RagError::GenerationBackendError { .. }));
    assert_eq!(pipeline.status().await.entries, 1);
}

#[tokio::test]
async fn embedding_failure_stores_nothing() {
    let pipeline = RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(BrokenEmbedder))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .generation_backend(Arc::new(ContextEcho::default()))
        .build()
        .unwrap();

    let err = pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert_eq!(pipeline.status().await.entries, 0);
}

#[tokio::test]
async fn batch_ingestion_isolates_failures() {
    let temp = tempfile::tempdir().unwrap();
    let good = temp.path().join("good.txt");
    let notes = temp.path().join("notes.md");
    let unsupported = temp.path().join("report.docx");
    let missing = temp.path().join("missing.txt");
    std::fs::write(&good, "The sky is blue.").unwrap();
    std::fs::write(&notes, "# Notes\n\nGrass is green.").unwrap();
    std::fs::write(&unsupported, "PK").unwrap();

    let pipeline = in_memory(Arc::new(ContextEcho::default()));
    let outcomes = pipeline.process_documents(&[&good, &unsupported, &missing, &notes]).await;

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0].path, good);
    assert!(matches!(outcomes[0].result, Ok(1)));
    assert!(matches!(outcomes[1].result, Err(RagError::UnsupportedFormat { .. })));
    assert!(matches!(outcomes[2].result, Err(RagError::DocumentLoad { .. })));
    assert!(matches!(outcomes[3].result, Ok(1)));
    assert_eq!(pipeline.status().await.entries, 2);
}

#[tokio::test]
async fn long_documents_are_chunked_with_metadata() {
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().chunk_size(60).chunk_overlap(10).build().unwrap())
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .generation_backend(Arc::new(ContextEcho::default()))
        .build()
        .unwrap();

    let text = "The sky is blue on clear days.\n\nGrass is green in spring.\n\n\
                Bananas grow in bunches on tall plants.\n\nSnow is white and cold.";
    let stored = pipeline.process_bytes("facts.txt", text.as_bytes()).await.unwrap();
    assert!(stored > 1);

    let query = HashingEmbeddingProvider::default().embed_query("bananas bunches").await.unwrap();
    let results = pipeline.vector_store().search(&query, 1).await.unwrap();
    assert!(results[0].chunk.text.contains("Bananas"));
    assert_eq!(results[0].chunk.source, "facts.txt");
    assert!(results[0].chunk.chunk_index < stored);
}

#[tokio::test]
async fn persistent_index_is_shared_across_pipelines() {
    let temp = tempfile::tempdir().unwrap();
    let model = HashingEmbeddingProvider::default().model_id();
    {
        let store = FileVectorStore::open_with_model(temp.path(), model.clone()).await.unwrap();
        let pipeline = pipeline_with(Arc::new(store), Arc::new(ContextEcho::default()));
        pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap();
    }

    let store = FileVectorStore::open_with_model(temp.path(), model).await.unwrap();
    let pipeline = pipeline_with(Arc::new(store), Arc::new(ContextEcho::default()));
    let status = pipeline.status().await;
    assert_eq!(status.entries, 1);
    assert_eq!(status.dimensions, Some(HashingEmbeddingProvider::DEFAULT_DIMENSIONS));

    let response = pipeline.ask("What color is the sky?", 1, 0.0).await.unwrap();
    assert_eq!(response.sources, vec!["The sky is blue.".to_string()]);

    // A different embedding model cannot reuse the index.
    let err = FileVectorStore::open_with_model(temp.path(), "ollama/all-minilm").await.unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { .. }));
}

#[tokio::test]
async fn from_config_opens_index_directory() {
    let temp = tempfile::tempdir().unwrap();
    let config = RagConfig::builder().index_dir(temp.path().join("index")).build().unwrap();
    let pipeline = RagPipeline::from_config(config).await.unwrap();

    assert_eq!(pipeline.process_bytes("a.txt", b"The sky is blue.").await.unwrap(), 1);
    assert!(temp.path().join("index").join("manifest.json").exists());
    assert!(temp.path().join("index").join("entries.jsonl").exists());
    assert_eq!(pipeline.status().await.embedding_model, "hashing-fnv1a-384");
}
