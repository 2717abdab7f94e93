//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text hierarchically by paragraphs, lines, sentences, words, then
//! single characters of scripts written without spaces, and prefixes every
//! chunk after the first with the tail of its predecessor.
//!
//! All lengths are measured in characters. Splitting never happens inside a
//! word: a word longer than `chunk_size` becomes its own oversized chunk.
//! Ideographic, kana and hangul characters count as words of their own.

use std::ops::Range;

use crate::document::{Chunk, Document};
use crate::hashing::fnv1a_64;

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document always yields the
/// same chunks, ids included.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no text.
    fn split(&self, document: &Document) -> Vec<Chunk>;
}

/// A separator level, tried in order from coarsest to finest.
#[derive(Debug, Clone, Copy)]
enum Separator {
    /// Split after any of the given literals.
    Literal(&'static [&'static str]),
    /// Split after every run of whitespace.
    Whitespace,
    /// Split around every character of a script written without spaces.
    Ideographic,
}

const SEPARATORS: &[Separator] = &[
    Separator::Literal(&["\n\n"]),
    Separator::Literal(&["\n"]),
    Separator::Literal(&[". ", "! ", "? ", "。", "！", "？"]),
    Separator::Whitespace,
    Separator::Ideographic,
];

impl Separator {
    /// Split `text[range]` into contiguous byte ranges, keeping each separator
    /// attached to the piece before it.
    fn split(self, text: &str, range: Range<usize>) -> Vec<Range<usize>> {
        match self {
            Separator::Literal(literals) => split_after_literals(text, range, literals),
            Separator::Whitespace => split_after_whitespace(text, range),
            Separator::Ideographic => split_around_ideographs(text, range),
        }
    }
}

fn split_after_literals(text: &str, range: Range<usize>, literals: &[&str]) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < slice.len() {
        let next = literals
            .iter()
            .filter_map(|sep| slice[start..].find(sep).map(|pos| start + pos + sep.len()))
            .min();
        let Some(end) = next else { break };
        pieces.push(range.start + start..range.start + end);
        start = end;
    }

    if start < slice.len() {
        pieces.push(range.start + start..range.end);
    }
    pieces
}

fn split_after_whitespace(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut prev_whitespace = false;

    for (i, c) in slice.char_indices() {
        let whitespace = c.is_whitespace();
        if prev_whitespace && !whitespace {
            pieces.push(range.start + start..range.start + i);
            start = i;
        }
        prev_whitespace = whitespace;
    }

    if start < slice.len() {
        pieces.push(range.start + start..range.end);
    }
    pieces
}

/// CJK ideographs and punctuation, kana, hangul and fullwidth forms.
fn is_ideographic(c: char) -> bool {
    matches!(
        c as u32,
        0x3000..=0x30FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xF900..=0xFAFF
            | 0xFF00..=0xFFEF
            | 0x20000..=0x2FA1F
    )
}

fn split_around_ideographs(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut prev_ideographic = false;

    for (i, c) in slice.char_indices() {
        let ideographic = is_ideographic(c);
        if i > start && (prev_ideographic || ideographic) {
            pieces.push(range.start + start..range.start + i);
            start = i;
        }
        prev_ideographic = ideographic;
    }

    if start < slice.len() {
        pieces.push(range.start + start..range.end);
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text hierarchically: paragraphs → lines → sentences → words →
/// ideographs.
///
/// Pieces at each level are greedily merged into bodies of at most
/// `chunk_size - chunk_overlap` characters; a piece that does not fit is split
/// with the next level. Every chunk after the first of a page then repeats the
/// last `chunk_overlap` characters of its predecessor, trimmed from the front
/// when that would push the chunk past `chunk_size`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{Chunker, Document, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(1000, 200);
/// let chunks = chunker.split(&Document::text("notes.txt", text));
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters repeated from the previous chunk
    ///
    /// `chunk_size` is clamped to at least 1 and `chunk_overlap` to below
    /// `chunk_size`; use [`RagConfig`](crate::RagConfig) to reject such values instead.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    /// Maximum body length of a chunk before its overlap prefix is added.
    fn body_budget(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Cover `text` with contiguous body ranges.
    fn bodies(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        if char_len(text) <= self.chunk_size {
            out.push(0..text.len());
        } else {
            self.split_level(text, 0..text.len(), 0, &mut out);
        }
        out
    }

    fn split_level(&self, text: &str, range: Range<usize>, level: usize, out: &mut Vec<Range<usize>>) {
        let Some(separator) = SEPARATORS.get(level) else {
            // A single unsplittable token.
            out.push(range);
            return;
        };

        let budget = self.body_budget();
        let mut pending: Option<Range<usize>> = None;
        let mut pending_len = 0;

        for piece in separator.split(text, range) {
            let len = char_len(&text[piece.clone()]);
            if len > budget {
                out.extend(pending.take());
                pending_len = 0;
                self.split_level(text, piece, level + 1, out);
                continue;
            }
            match pending.as_mut() {
                Some(current) if pending_len + len <= budget => {
                    current.end = piece.end;
                    pending_len += len;
                }
                _ => {
                    out.extend(pending.take());
                    pending = Some(piece);
                    pending_len = len;
                }
            }
        }
        out.extend(pending);
    }

    /// Split one page or segment, appending chunks to `chunks`.
    fn split_segment(&self, source: &str, page: Option<usize>, text: &str, chunks: &mut Vec<Chunk>) {
        let mut body_offset = 0;
        let mut prev_len = 0;

        for (i, body) in self.bodies(text).into_iter().enumerate() {
            let body_len = char_len(&text[body.clone()]);
            let overlap = if i == 0 {
                0
            } else {
                self.chunk_overlap.min(self.chunk_size.saturating_sub(body_len)).min(prev_len)
            };
            let start = if overlap == 0 {
                body.start
            } else {
                text[..body.start]
                    .char_indices()
                    .rev()
                    .nth(overlap - 1)
                    .map(|(idx, _)| idx)
                    .unwrap_or(0)
            };

            let chunk_text = text[start..body.end].to_string();
            let chunk_index = chunks.len();
            prev_len = body_len + overlap;
            chunks.push(Chunk {
                id: format!("{source}#{chunk_index}-{:016x}", fnv1a_64(chunk_text.as_bytes())),
                source: source.to_string(),
                text: chunk_text,
                chunk_index,
                page,
                offset: body_offset - overlap,
            });
            body_offset += body_len;
        }
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let paged = document.format.is_paged();

        for (i, segment) in document.segments.iter().enumerate() {
            if segment.is_empty() {
                continue;
            }
            let page = paged.then_some(i + 1);
            self.split_segment(&document.source, page, segment, &mut chunks);
        }

        chunks
    }
}
