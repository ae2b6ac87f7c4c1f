//! Text chunking strategies.
//!
//! Two strategies are supported:
//!
//! - [`ChunkStrategy::Paragraph`]: one chunk per blank-line separated
//!   paragraph, with line breaks inside a paragraph folded into spaces.
//! - [`ChunkStrategy::Fixed`]: a sliding window of `size` characters that
//!   advances by `size - overlap`.
//!
//! Windows are measured in characters, not bytes, so multi-byte text is
//! never split inside a code point.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("size must be positive")]
    ZeroSize,
    #[error("overlap must be smaller than size (overlap {overlap}, size {size})")]
    OverlapTooLarge { size: usize, overlap: usize },
    #[error("Unknown chunk strategy '{0}'. Use 'paragraph' or 'fixed'")]
    UnknownStrategy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Paragraph,
    Fixed,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Paragraph => "paragraph",
            ChunkStrategy::Fixed => "fixed",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paragraph" => Ok(ChunkStrategy::Paragraph),
            "fixed" => Ok(ChunkStrategy::Fixed),
            other => Err(ChunkError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Split text into chunks with the given strategy.
///
/// `size` and `overlap` only apply to [`ChunkStrategy::Fixed`].
pub fn chunk_text(
    text: &str,
    strategy: ChunkStrategy,
    size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkError> {
    match strategy {
        ChunkStrategy::Paragraph => Ok(chunk_by_paragraphs(text)),
        ChunkStrategy::Fixed => chunk_by_size(text, size, overlap),
    }
}

/// Split on blank lines (`\n\n`), dropping empty paragraphs.
pub fn chunk_by_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.replace('\n', " ").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Fixed-size character windows with `overlap` characters shared between
/// neighbours. Each window is trimmed and whitespace-only windows dropped.
pub fn chunk_by_size(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    if size == 0 {
        return Err(ChunkError::ZeroSize);
    }
    if overlap >= size {
        return Err(ChunkError::OverlapTooLarge { size, overlap });
    }

    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_len {
        let end = (start + size).min(char_len);
        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end == char_len {
            break;
        }
        start = end - overlap;
    }

    Ok(chunks)
}
