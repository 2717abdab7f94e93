//! Vector store trait for storing and searching vector embeddings.
//!
//! Every store ranks with [`cosine_similarity`]: results come back in
//! descending similarity, ties broken by insertion order (earlier first).

use async_trait::async_trait;

use crate::document::{IndexEntry, SearchResult};
use crate::error::{RagError, Result};

/// A storage backend for chunk embeddings with similarity search.
///
/// Mutations (`add`, `clear`) are mutually exclusive; searches may run
/// concurrently with each other and never observe a partially added entry.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("./vector_index").await?;
/// store.add(&entries).await?;
/// let results = store.search(&query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append entries. Never deduplicates: adding the same chunk twice stores it twice.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if any embedding's length differs
    /// from the stored vectors (or from the first entry of the batch on an
    /// empty store), and [`RagError::InvalidRequest`] if any embedding holds a
    /// NaN or infinite component. Nothing from the batch is stored in either case.
    async fn add(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return the `k` entries most similar to `embedding`, most similar first.
    ///
    /// Returns every entry when the store holds fewer than `k`.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Discard all entries, leaving an empty, usable store.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> usize;

    /// Whether the store holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Dimensionality of the stored vectors, `None` while empty.
    async fn dimensions(&self) -> Option<usize>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Check that every embedding in `entries` has the expected length and only
/// finite components.
///
/// With `expected == None` the first entry sets the dimensionality. Returns the
/// dimensionality of the batch (or `expected` for an empty batch).
pub(crate) fn check_dimensions(
    expected: Option<usize>,
    entries: &[IndexEntry],
) -> Result<Option<usize>> {
    let mut dims = expected;
    for entry in entries {
        if entry.embedding.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidRequest(format!(
                "embedding for chunk {} contains a non-finite value",
                entry.chunk.id
            )));
        }
        let actual = entry.embedding.len();
        match dims {
            Some(expected) if expected != actual => {
                return Err(RagError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => dims = Some(actual),
        }
    }
    Ok(dims)
}

/// Rank `entries` (in insertion order) against `query` and keep the top `k`.
pub(crate) fn rank<'a>(
    entries: impl Iterator<Item = &'a IndexEntry>,
    dimensions: Option<usize>,
    query: &[f32],
    k: usize,
) -> Result<Vec<SearchResult>> {
    if k == 0 {
        return Err(RagError::InvalidRequest("k must be at least 1".to_string()));
    }
    if let Some(expected) = dimensions {
        if expected != query.len() {
            return Err(RagError::DimensionMismatch { expected, actual: query.len() });
        }
    }
    if query.iter().any(|x| !x.is_finite()) {
        return Err(RagError::InvalidRequest("query embedding contains a non-finite value".to_string()));
    }

    let mut scored: Vec<SearchResult> = entries
        .map(|entry| SearchResult {
            chunk: entry.chunk.clone(),
            score: cosine_similarity(&entry.embedding, query),
        })
        .collect();

    // Stable sort keeps insertion order among equal scores.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    Ok(scored)
}
