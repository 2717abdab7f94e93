//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a non-persistent store backed
//! by a `Vec` protected by a `tokio::sync::RwLock`. It is suitable for tests
//! and throwaway sessions; use [`FileVectorStore`](crate::FileVectorStore) when
//! the index must survive restarts.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{IndexEntry, SearchResult};
use crate::error::Result;
use crate::vectorstore::{VectorStore, check_dimensions, rank};

#[derive(Debug, Default)]
struct State {
    dimensions: Option<usize>,
    entries: Vec<IndexEntry>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.add(&entries).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<State>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        state.dimensions = check_dimensions(state.dimensions, entries)?;
        state.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        rank(state.entries.iter(), state.dimensions, embedding, k)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = State::default();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.dimensions
    }
}
