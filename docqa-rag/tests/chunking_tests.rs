//! Property tests for recursive chunking.

use docqa_rag::chunking::{Chunker, RecursiveChunker};
use docqa_rag::document::{Document, DocumentFormat};
use proptest::prelude::*;

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Prose-like text: words, sentence ends, line and paragraph breaks, some
/// multibyte characters and the occasional very long token.
fn arb_text() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        6 => "[a-zé]{1,9}".prop_map(|w| format!("{w} ")),
        1 => Just(". ".to_string()),
        1 => Just("\n".to_string()),
        1 => Just("\n\n".to_string()),
        1 => "[a-z]{40,80}".prop_map(|w| format!("{w} ")),
    ];
    proptest::collection::vec(piece, 0..120).prop_map(|pieces| pieces.concat())
}

/// `(chunk_size, chunk_overlap)` with `overlap < size`.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (10usize..120).prop_flat_map(|size| (Just(size), 0..size))
}

/// *For any* document, chunks cover the whole text: their total length is at
/// least the document length, and stripping each chunk's overlap prefix
/// reconstructs the text exactly.
mod prop_chunking_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_document(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunker = RecursiveChunker::new(size, overlap);
            let document = Document::text("doc.txt", text.clone());
            let chunks = chunker.split(&document);

            if text.is_empty() {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }

            let total: usize = chunks.iter().map(|c| char_len(&c.text)).sum();
            prop_assert!(total >= char_len(&text));

            // Offsets are character positions; the part of each chunk past the
            // previous chunk's end is new text.
            let chars: Vec<char> = text.chars().collect();
            let mut rebuilt = String::new();
            let mut covered = 0;
            for chunk in &chunks {
                let len = char_len(&chunk.text);
                prop_assert!(chunk.offset <= covered);
                let expected: String = chars[chunk.offset..chunk.offset + len].iter().collect();
                prop_assert_eq!(&chunk.text, &expected);
                rebuilt.extend(chars[covered..chunk.offset + len].iter());
                covered = chunk.offset + len;
            }
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn chunks_respect_size_unless_single_token(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunks = RecursiveChunker::new(size, overlap).split(&Document::text("doc.txt", text));
            for chunk in &chunks {
                if char_len(&chunk.text) > size {
                    prop_assert!(
                        chunk.text.split_whitespace().count() <= 1,
                        "oversized chunk is not a single token: {:?}",
                        chunk.text
                    );
                }
            }
        }

        #[test]
        fn overlap_never_exceeds_configured_amount(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunks = RecursiveChunker::new(size, overlap).split(&Document::text("doc.txt", text));
            for pair in chunks.windows(2) {
                let prev_end = pair[0].offset + char_len(&pair[0].text);
                prop_assert!(pair[1].offset <= prev_end);
                prop_assert!(prev_end - pair[1].offset <= overlap);
            }
        }

        #[test]
        fn chunking_is_deterministic(text in arb_text(), (size, overlap) in arb_sizes()) {
            let chunker = RecursiveChunker::new(size, overlap);
            let document = Document::text("doc.txt", text);
            prop_assert_eq!(chunker.split(&document), chunker.split(&document));
        }
    }
}

#[test]
fn chunk_indices_are_contiguous_across_pages() {
    let document = Document {
        source: "book.pdf".to_string(),
        format: DocumentFormat::Pdf,
        segments: vec![
            "First page has a few short sentences. Another one here.".to_string(),
            String::new(),
            "Third page text.".to_string(),
        ],
    };
    let chunks = RecursiveChunker::new(30, 5).split(&document);

    let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    assert!(chunks.iter().all(|c| c.page != Some(2)));
    assert_eq!(chunks.last().unwrap().page, Some(3));
    assert_eq!(chunks.last().unwrap().offset, 0);
}

#[test]
fn ids_are_unique_within_a_document() {
    let text = "same words again. ".repeat(40);
    let chunks = RecursiveChunker::new(50, 10).split(&Document::text("r.txt", text));
    let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), chunks.len());
}
