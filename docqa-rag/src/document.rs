//! Data types for documents, chunks, index entries and answers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared format of a source document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// A PDF whose text is extracted page by page.
    Pdf,
    /// UTF-8 plain text.
    Text,
    /// UTF-8 markdown, treated as plain text.
    Markdown,
}

impl DocumentFormat {
    /// Whether documents of this format carry page numbers.
    pub fn is_paged(self) -> bool {
        matches!(self, DocumentFormat::Pdf)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
        };
        f.write_str(name)
    }
}

/// A decoded source document, alive only for the duration of one ingestion.
///
/// `segments` holds the text in reading order: one entry per page for PDFs,
/// a single entry for text and markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The file name the document was loaded from.
    pub source: String,
    /// The declared format, resolved by the loader registry.
    pub format: DocumentFormat,
    /// Decoded text, in page order.
    pub segments: Vec<String>,
}

impl Document {
    /// Create a single-segment text document.
    pub fn text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), format: DocumentFormat::Text, segments: vec![text.into()] }
    }

    /// Total length of the document in characters.
    pub fn char_len(&self) -> usize {
        self.segments.iter().map(|s| s.chars().count()).sum()
    }

    /// Whether the document has no text at all.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(String::is_empty)
    }
}

/// A contiguous span of one [`Document`], the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic identifier: `{source}#{chunk_index}-{content hash}`.
    pub id: String,
    /// The file name of the parent document.
    pub source: String,
    /// The text content of the chunk, including any overlap prefix.
    pub text: String,
    /// Position of the chunk within its document, counting from zero.
    pub chunk_index: usize,
    /// 1-based page number for paged formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Character offset of the chunk's first character within its page or segment.
    pub offset: usize,
}

/// A chunk paired with its embedding, as handed to a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// The stored chunk.
    pub chunk: Chunk,
    /// The vector embedding of the chunk's text.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// The answer to a question together with the exact context it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResponse {
    /// The raw text returned by the generation backend.
    pub answer: String,
    /// Chunk texts used as context, in retrieval order.
    pub sources: Vec<String>,
}

impl AnswerResponse {
    /// Whether the answer was produced without any retrieved context.
    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_len_counts_characters_not_bytes() {
        let doc = Document::text("a.txt", "héllo");
        assert_eq!(doc.char_len(), 5);
        assert!(!doc.is_empty());
        assert!(Document::text("b.txt", "").is_empty());
    }

    #[test]
    fn chunk_without_page_omits_field() {
        let chunk = Chunk {
            id: "a.txt#0-1".into(),
            source: "a.txt".into(),
            text: "hi".into(),
            chunk_index: 0,
            page: None,
            offset: 0,
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert!(json.get("page").is_none());
        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, chunk);
    }
}
