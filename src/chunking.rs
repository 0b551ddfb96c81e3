//! Discharge-summary chunking.
//!
//! This module provides the [`Chunker`] trait and [`SentenceChunker`], which
//! splits a record's text into overlapping fixed-size spans, snapping window
//! ends to sentence boundaries where one falls within a short lookback.

use crate::document::{Chunk, DischargeRecord};
use crate::error::{RagError, Result};

/// A strategy for splitting records into chunks.
///
/// Implementations produce [`Chunk`]s with text and span offsets but no
/// embeddings. Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a record's text into chunks.
    ///
    /// Returns an empty `Vec` if the record has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, record: &DischargeRecord) -> Vec<Chunk>;
}

/// Splits text into fixed-size overlapping chunks, preferring sentence ends.
///
/// Walks the text in windows of `chunk_size` bytes, advancing by
/// `chunk_size - chunk_overlap` per step. When a sentence-terminating
/// punctuation mark (followed by whitespace) falls within the last quarter of
/// a window, the window end snaps back to just after it so chunks avoid
/// mid-sentence cuts. The final window is truncated to the remaining text.
///
/// Every byte of the source text is covered by at least one chunk, and every
/// chunk spans at most `chunk_size` bytes, except when a single character is
/// wider than the window, in which case the chunk is exactly that character.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// How far back from a window end to look for a sentence boundary.
    fn lookback(&self) -> usize {
        (self.chunk_size / 4).max(8)
    }

    /// Find a sentence end within the lookback region of `[start, end)`.
    ///
    /// Returns the byte position just after the latest `.`, `!`, or `?`
    /// that is followed by whitespace (or the end of the text).
    fn snap_point(&self, text: &str, start: usize, end: usize) -> Option<usize> {
        let from = floor_char_boundary(text, end.saturating_sub(self.lookback()).max(start + 1));
        if from >= end {
            return None;
        }

        let mut snap = None;
        for (i, c) in text[from..end].char_indices() {
            if matches!(c, '.' | '!' | '?') {
                let after = from + i + c.len_utf8();
                let followed_by_space =
                    text[after..].chars().next().is_none_or(char::is_whitespace);
                if followed_by_space && after > start && after < end {
                    snap = Some(after);
                }
            }
        }
        snap
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, record: &DischargeRecord) -> Vec<Chunk> {
        let text = &record.text;
        if text.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let raw_end = floor_char_boundary(text, (start + self.chunk_size).min(text.len()));
            let mut end = if raw_end < text.len() {
                self.snap_point(text, start, raw_end).unwrap_or(raw_end)
            } else {
                raw_end
            };
            // A window narrower than the character at `start` rounds down to
            // an empty span; take that one character so the walk advances.
            if end <= start {
                end = ceil_char_boundary(text, start + 1);
            }

            chunks.push(Chunk {
                id: format!("{}_{chunk_index}", record.hadm_id),
                hadm_id: record.hadm_id,
                chunk_index,
                start,
                end,
                text: text[start..end].to_string(),
                embedding: Vec::new(),
            });
            chunk_index += 1;

            if end >= text.len() {
                break;
            }

            // Stepping back by the overlap keeps consecutive spans contiguous.
            let mut next = floor_char_boundary(text, end.saturating_sub(self.chunk_overlap));
            if next <= start {
                next = end;
            }
            start = next;
        }

        chunks
    }
}

/// Smallest char boundary at or above `i`.
fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i.min(text.len())
}

/// Largest char boundary at or below `i`.
fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
