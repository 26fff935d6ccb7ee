//! Splits extracted document text into overlapping chunks for embedding and search.
//! Prefers paragraph boundaries; falls back to line breaks, sentences, words, then
//! character splits.
//!
//! Lengths and offsets are counted in characters, not bytes.

use serde::{Deserialize, Serialize};

/// Default maximum characters per chunk. Small enough for common embedding models.
pub const DEFAULT_MAX_CHARS: usize = 2_000;

/// Default number of characters shared between consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 200;

/// Boundaries tried in order when looking for a place to end a chunk.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A chunk of document text, with its position in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index of this chunk within the document (0, 1, 2, …).
    pub id: usize,
    pub text: String,
    /// Character offset of the first character of `text` in the source.
    pub source_offset: usize,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `text` into chunks of at most `max_chars` characters, each starting
/// `overlap` characters before the previous one ended.
///
/// Empty text yields no chunks; text no longer than `max_chars` yields one.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkError> {
    if max_chars == 0 || overlap >= max_chars {
        return Err(ChunkError::InvalidBounds { max_chars, overlap });
    }
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let hard_end = (start + max_chars).min(total);
        let end = if hard_end == total {
            total
        } else {
            find_boundary(&chars, start, hard_end, overlap, max_chars).unwrap_or(hard_end)
        };
        chunks.push(Chunk {
            id: chunks.len(),
            text: chars[start..end].iter().collect(),
            source_offset: start,
        });
        if end == total {
            break;
        }
        // find_boundary only returns ends past start + overlap, so this always advances.
        start = end - overlap;
    }
    Ok(chunks)
}

/// Chunks in source order with the prefix each shares with earlier chunks
/// removed. Chunks that add nothing new are dropped.
pub fn strip_overlap(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut covered = 0usize;
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.source_offset);
        covered = covered.max(chunk.source_offset + chunk.char_len());
        let text: String = chunk.text.chars().skip(skip).collect();
        if !text.is_empty() {
            out.push(Chunk {
                id: chunk.id,
                text,
                source_offset: chunk.source_offset + skip,
            });
        }
    }
    out
}

/// Rebuild the source text from chunks produced by [`chunk_text`].
pub fn reassemble(chunks: &[Chunk]) -> String {
    strip_overlap(chunks).into_iter().map(|c| c.text).collect()
}

/// Find the end (exclusive) of a chunk starting at `start`, looking backwards
/// from `hard_end` for the highest-priority separator.
///
/// Candidates must leave more than `overlap` characters in the chunk and must
/// not shrink it below half a window.
fn find_boundary(
    chars: &[char],
    start: usize,
    hard_end: usize,
    overlap: usize,
    max_chars: usize,
) -> Option<usize> {
    let min_end = (start + overlap + 1).max(start + max_chars / 2);
    for sep in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        let mut end = hard_end;
        while end >= min_end && end >= sep.len() {
            if chars[end - sep.len()..end] == sep[..] {
                return Some(end);
            }
            end -= 1;
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max_chars})")]
    InvalidBounds { max_chars: usize, overlap: usize },
}
