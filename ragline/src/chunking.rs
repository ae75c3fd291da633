//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`TextChunker`] splits by character count with a fixed overlap
//! - [`RecursiveChunker`] splits at paragraph, sentence, then word boundaries
//!
//! Sizes are measured in characters (Unicode scalar values), never bytes, so
//! multi-byte text is never cut inside a character. Every chunk is a
//! contiguous slice of the input and records its byte offset.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// A strategy for splitting document content into chunks.
pub trait Chunker: Send + Sync {
    /// Split `content` into chunks, in document order.
    ///
    /// Returns an empty `Vec` for empty content.
    fn chunk(&self, content: &str) -> Vec<Chunk>;
}

/// Which [`Chunker`] the orchestrator builds from its configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Fixed-size sliding window, see [`TextChunker`].
    #[default]
    Fixed,
    /// Boundary-aware splitting, see [`RecursiveChunker`].
    Recursive,
}

impl ChunkingStrategy {
    /// Build the chunker for this strategy.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] for invalid sizes.
    pub fn build(self, chunk_size: usize, overlap: usize) -> Result<Arc<dyn Chunker>> {
        Ok(match self {
            ChunkingStrategy::Fixed => Arc::new(TextChunker::new(chunk_size, overlap)?),
            ChunkingStrategy::Recursive => Arc::new(RecursiveChunker::new(chunk_size, overlap)?),
        })
    }
}

fn validate(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::config("chunk_size must be greater than zero"));
    }
    if overlap >= chunk_size {
        return Err(RagError::config(format!(
            "chunk_overlap ({overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Split `content` with a [`TextChunker`].
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`] if `chunk_size == 0` or
/// `overlap >= chunk_size`.
pub fn split(content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(TextChunker::new(chunk_size, overlap)?.chunk(content))
}

/// Splits text with a sliding window of `chunk_size` characters.
///
/// The window advances by `chunk_size - overlap`, so consecutive chunks share
/// exactly `overlap` characters and together cover the whole input. Only the
/// last chunk may be shorter than `chunk_size`. Dropping the first `overlap`
/// characters of every chunk after the first and concatenating reconstructs
/// the input.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::TextChunker;
///
/// let chunker = TextChunker::new(512, 50)?;
/// let chunks = chunker.chunk(&document.content);
/// ```
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a new `TextChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `overlap` - number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `chunk_size == 0` or
    /// `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate(chunk_size, overlap)?;
        Ok(Self { chunk_size, overlap })
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, content: &str) -> Vec<Chunk> {
        window_ranges(content, self.chunk_size, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| Chunk {
                index,
                text: content[start..end].to_string(),
                source_offset: start,
            })
            .collect()
    }
}

/// Byte ranges of a sliding character window over `text`.
fn window_ranges(text: &str, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = bounds.len();
    bounds.push(text.len());

    let step = size - overlap;
    let mut ranges = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        ranges.push((bounds[start], bounds[end]));
        if end == char_count {
            break;
        }
        start += step;
    }
    ranges
}

/// Splits text hierarchically: paragraphs → sentences → words → characters.
///
/// Text is cut at the coarsest separator that yields pieces no longer than
/// `chunk_size`, and adjacent pieces are merged back up to `chunk_size`.
/// When a chunk is full, trailing pieces totalling at most `overlap`
/// characters are carried into the next chunk. A piece with no usable
/// separator falls back to the fixed window of [`TextChunker`].
/// Whitespace-only chunks are dropped.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(512, 50)?;
/// let chunks = chunker.chunk(&document.content);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    overlap: usize,
}

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "! ", " "];

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `chunk_size == 0` or
    /// `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate(chunk_size, overlap)?;
        Ok(Self { chunk_size, overlap })
    }

    /// Append the byte ranges for `text` (which starts at `base`) to `out`.
    fn split_into(
        &self,
        text: &str,
        base: usize,
        separators: &[&str],
        out: &mut Vec<(usize, usize)>,
    ) {
        if char_len(text) <= self.chunk_size {
            out.push((base, base + text.len()));
            return;
        }

        let Some((separator, rest)) = separators.split_first() else {
            out.extend(
                window_ranges(text, self.chunk_size, self.overlap)
                    .into_iter()
                    .map(|(s, e)| (base + s, base + e)),
            );
            return;
        };

        let pieces = split_keeping_separator(text, separator);
        if pieces.len() < 2 {
            self.split_into(text, base, rest, out);
            return;
        }

        let mut window: VecDeque<(usize, usize, usize)> = VecDeque::new();
        let mut window_len = 0;

        for (start, end) in pieces {
            let piece_len = char_len(&text[start..end]);

            if !window.is_empty() && window_len + piece_len > self.chunk_size {
                self.flush(text, base, rest, &window, out);
                while let Some(&(_, _, len)) = window.front() {
                    if window_len > self.overlap || window_len + piece_len > self.chunk_size {
                        window.pop_front();
                        window_len -= len;
                    } else {
                        break;
                    }
                }
            }

            window.push_back((start, end, piece_len));
            window_len += piece_len;
        }

        if !window.is_empty() {
            self.flush(text, base, rest, &window, out);
        }
    }

    fn flush(
        &self,
        text: &str,
        base: usize,
        separators: &[&str],
        window: &VecDeque<(usize, usize, usize)>,
        out: &mut Vec<(usize, usize)>,
    ) {
        let (Some(first), Some(last)) = (window.front(), window.back()) else {
            return;
        };
        let (start, end) = (first.0, last.1);
        // A lone piece longer than the chunk size is split further.
        self.split_into(&text[start..end], base + start, separators, out);
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, content: &str) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let mut ranges = Vec::new();
        self.split_into(content, 0, &SEPARATORS, &mut ranges);

        ranges
            .into_iter()
            .filter(|&(start, end)| !content[start..end].trim().is_empty())
            .enumerate()
            .map(|(index, (start, end))| Chunk {
                index,
                text: content[start..end].to_string(),
                source_offset: start,
            })
            .collect()
    }
}

/// Split text at a separator while keeping the separator attached to the
/// preceding piece. Returns byte ranges that together cover `text`.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<(usize, usize)> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push((start, end));
        start = end;
    }

    if start < text.len() {
        result.push((start, text.len()));
    }

    result
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn invalid_sizes_are_rejected() {
        for (size, overlap) in [(0, 0), (10, 10), (10, 11)] {
            let err = split("abc", size, overlap).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
            assert!(RecursiveChunker::new(size, overlap).is_err());
        }
    }

    #[test]
    fn window_advances_by_step() {
        let chunks = split("abcdefghij", 4, 1).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "defg", "ghij"]);
        let offsets: Vec<_> = chunks.iter().map(|c| c.source_offset).collect();
        assert_eq!(offsets, [0, 3, 6]);
    }

    #[test]
    fn final_chunk_may_be_short() {
        let chunks = split("abcdefgh", 5, 2).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcde", "defgh"]);

        let chunks = split("abcdefghi", 5, 2).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcde", "defgh", "ghi"]);
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        assert!(split("", 10, 2).unwrap().is_empty());
        assert!(RecursiveChunker::new(10, 2).unwrap().chunk("").is_empty());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "Высадка на Луну произошла в 2023 году.";
        let chunks = split(text, 7, 2).unwrap();
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 7);
            let end = chunk.source_offset + chunk.text.len();
            assert_eq!(&text[chunk.source_offset..end], chunk.text);
        }
    }

    #[test]
    fn recursive_prefers_paragraph_boundaries() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunker = RecursiveChunker::new(25, 0).unwrap();
        let chunks = chunker.chunk(text);
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["First paragraph here.\n\n", "Second paragraph here."]);
        assert_eq!(chunks[1].source_offset, 23);
    }

    #[test]
    fn recursive_chunks_are_bounded_slices() {
        let text = "The moon landing occurred on July 20. It was part of the Artemis Program. \
                    This mission marked the first crewed lunar landing since Apollo.\n\n\
                    Averyveryveryverylongwordwithoutanyspacesatallthatmustbewindowed.";
        let chunker = RecursiveChunker::new(30, 5).unwrap();
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.text.chars().count() <= 30, "{:?}", chunk.text);
            let end = chunk.source_offset + chunk.text.len();
            assert_eq!(&text[chunk.source_offset..end], chunk.text);
        }
    }

    #[test]
    fn strategy_builds_matching_chunker() {
        let fixed = ChunkingStrategy::Fixed.build(4, 0).unwrap();
        assert_eq!(fixed.chunk("abcdefgh").len(), 2);
        assert!(ChunkingStrategy::Recursive.build(4, 4).is_err());
    }
}
