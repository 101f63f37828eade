//! Adaptive Document Chunking
//!
//! Splits a raw text document into overlapping segments for embedding and
//! retrieval. Longer documents get proportionally larger chunks (capped),
//! so deeply structured documents keep more context per chunk while short
//! documents stay low-latency. Splitting prefers structural markdown
//! boundaries over blank lines, newlines, and finally spaces.

use serde::{Deserialize, Serialize};

/// Base chunk size in bytes for short documents.
pub const BASE_CHUNK_SIZE: usize = 250;

/// Hard ceiling on the chunk size.
pub const MAX_CHUNK_SIZE: usize = 1_000;

/// Overlap carried from the end of one chunk into the next.
pub const CHUNK_OVERLAP: usize = 50;

/// Every additional 2500 bytes of document grows the chunk size by 200.
const LENGTH_STEP: usize = 2_500;
const SIZE_STEP: usize = 200;

/// Split markers in priority order: section headers, code fences,
/// list/table markers, subsection headers, HTML tags, horizontal rules,
/// then progressively softer breaks.
const SEPARATORS: &[&str] = &[
    "\n# ", "\n## ",
    "```\n",
    "\n- ", "\n* ", "\n1. ", "\n| ",
    "\n### ", "\n#### ",
    "\n<", "\n</",
    "\n---\n", "\n***\n",
    "\n\n", "\n", " ",
];

/// A segment of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Chunk index within the document
    pub index: u32,
    /// Content of the chunk
    pub text: String,
    /// Byte offset of `text` within the original document
    pub offset: usize,
}

/// Chunk size for a document of `len` bytes.
///
/// `250 + floor((len - 2500) / 2500) * 200`, capped at 1000. Monotonic in
/// `len`.
pub fn target_chunk_size(len: usize) -> usize {
    if len <= LENGTH_STEP {
        return BASE_CHUNK_SIZE;
    }
    let grown = BASE_CHUNK_SIZE + ((len - LENGTH_STEP) / LENGTH_STEP) * SIZE_STEP;
    grown.min(MAX_CHUNK_SIZE)
}

/// Split a document into overlapping chunks.
///
/// Pure and deterministic; no I/O. An empty document yields no chunks; a
/// document shorter than one chunk size yields exactly one.
pub fn chunk(text: &str) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let size = target_chunk_size(text.len());
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u32;

    while start < text.len() {
        let window_end = floor_char_boundary(text, (start + size).min(text.len()));
        let end = if window_end >= text.len() {
            text.len()
        } else {
            match split_point(&text[start..window_end]) {
                Some(rel) => start + rel,
                None => window_end,
            }
        };

        chunks.push(Chunk {
            index,
            text: text[start..end].to_string(),
            offset: start,
        });
        index += 1;

        if end >= text.len() {
            break;
        }

        // Rewind for overlap, but always advance past the previous start.
        let rewound = floor_char_boundary(text, end.saturating_sub(CHUNK_OVERLAP));
        start = if rewound > start { rewound } else { end };
    }

    chunks
}

/// Best split position inside the window: the first separator class (in
/// priority order) with an occurrence, cut at its last occurrence. The
/// separator itself starts the next chunk. A match at position 0 would
/// produce an empty chunk and is skipped.
fn split_point(window: &str) -> Option<usize> {
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            if pos > 0 {
                return Some(pos);
            }
        }
    }
    None
}

/// Largest char boundary not exceeding `at`. Separator positions are
/// always boundaries (the markers are ASCII); only size-capped cuts and
/// overlap rewinds can land mid-character.
fn floor_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut pos = at;
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
