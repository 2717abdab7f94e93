//! Offline lexical embeddings via feature hashing.
//!
//! [`HashingEmbeddingProvider`] needs no model download and no network: every
//! lower-cased alphanumeric token is hashed into one of `dimensions` buckets
//! and the resulting bag-of-words vector is L2-normalised. Texts that share
//! words end up close under cosine similarity, which is enough for tests and
//! for running the pipeline without an embedding server.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a hash. Stable across platforms and releases.
pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Words too common to carry meaning in a bag-of-words vector.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "the", "this", "to", "was", "what", "when", "where", "which",
    "who", "why", "with",
];

/// Deterministic bag-of-words embeddings using the hashing trick.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::HashingEmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::new(384);
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Default number of hash buckets.
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// Create a provider producing vectors of the given length (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            if STOP_WORDS.contains(&token) {
                continue;
            }
            let hash = fnv1a_64(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            // The top bit picks a sign so colliding tokens tend to cancel rather than add up.
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("hashing-fnv1a-{}", self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::cosine_similarity;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalised() {
        let provider = HashingEmbeddingProvider::new(64);
        let a = provider.embed_query("The sky is blue.").await.unwrap();
        let b = provider.embed_query("The sky is blue.").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_score_higher_than_unrelated_text() {
        let provider = HashingEmbeddingProvider::default();
        let query = provider.embed_query("What color is the sky?").await.unwrap();
        let docs = provider
            .embed_documents(&["The sky is blue.", "Bananas grow in bunches."])
            .await
            .unwrap();
        assert!(cosine_similarity(&query, &docs[0]) > cosine_similarity(&query, &docs[1]));
    }

    #[tokio::test]
    async fn text_without_tokens_is_the_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8);
        let v = provider.embed_query("  ?! ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
