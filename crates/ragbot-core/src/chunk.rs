//! Separator-aware text chunker with overlap.
//!
//! Splits document text into overlapping passages of bounded size. Each
//! passage is an exact slice of the input, so provenance can always be
//! traced back to a byte range of the original text.
//!
//! # Algorithm
//!
//! 1. Split the text on the separator (default `"\n"`) into segments.
//! 2. Hard-split any segment longer than `chunk_size` characters at
//!    character boundaries.
//! 3. Accumulate segments into a window until adding the next one would
//!    make the window span more than `chunk_size` characters.
//! 4. Emit the window, then drop segments from its front until what is
//!    left spans at most `chunk_overlap` characters and leaves room for
//!    the incoming segment. The remainder opens the next chunk.
//! 5. Emit whatever is left at the end as a final, possibly short, chunk.
//!
//! Lengths are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use ragbot_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(10, 4, "\n").unwrap();
//! let chunks = chunker.split("aaaa\nbbbb\ncccc\ndddd");
//! assert_eq!(chunks, vec!["aaaa\nbbbb", "bbbb\ncccc", "cccc\ndddd"]);
//! ```

use std::collections::VecDeque;
use std::ops::Range;

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Passage, SourceText};

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 300;
pub const DEFAULT_SEPARATOR: &str = "\n";

/// A piece of the input that is never split further when packing.
#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    char_start: usize,
    char_end: usize,
}

/// Splits text into overlapping chunks. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl Chunker {
    /// Create a chunker.
    ///
    /// Fails with [`RagError::Validation`] when `chunk_size` is zero, the
    /// overlap is not smaller than the chunk size, or the separator is empty.
    pub fn new(chunk_size: usize, chunk_overlap: usize, separator: impl Into<String>) -> Result<Self> {
        let separator = separator.into();
        if chunk_size == 0 {
            return Err(RagError::validation("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        if separator.is_empty() {
            return Err(RagError::validation("chunk separator must not be empty"));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Split `text` into chunk strings. Empty input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|span| text[span].to_string())
            .collect()
    }

    /// Byte ranges of each chunk within `text`, in order.
    ///
    /// Consecutive ranges either overlap, touch, or are separated only by
    /// separators. Empty ranges are never returned.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }

        let units = self.units(text);
        let mut spans = Vec::new();
        let mut window: VecDeque<Unit> = VecDeque::new();

        for unit in units {
            if let Some(first) = window.front() {
                if unit.char_end - first.char_start > self.chunk_size {
                    spans.push(window_span(&window));
                    while let Some(front) = window.front() {
                        let held = window_chars(&window);
                        let with_next = unit.char_end - front.char_start;
                        if held > self.chunk_overlap || with_next > self.chunk_size {
                            window.pop_front();
                        } else {
                            break;
                        }
                    }
                }
            }
            window.push_back(unit);
        }

        if !window.is_empty() {
            spans.push(window_span(&window));
        }

        spans.retain(|span| !span.is_empty());
        spans
    }

    /// Chunk one document into [`Passage`]s carrying its provenance.
    pub fn passages(&self, source: &SourceText) -> Vec<Passage> {
        let chunks = self.split(&source.text);
        let chunk_count = chunks.len();
        chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| make_passage(source, chunk_index, chunk_count, text))
            .collect()
    }

    fn units(&self, text: &str) -> Vec<Unit> {
        let sep_bytes = self.separator.len();
        let sep_chars = self.separator.chars().count();
        let mut units = Vec::new();
        let mut byte_pos = 0usize;
        let mut char_pos = 0usize;

        for (i, segment) in text.split(self.separator.as_str()).enumerate() {
            if i > 0 {
                byte_pos += sep_bytes;
                char_pos += sep_chars;
            }
            let seg_chars = segment.chars().count();

            if seg_chars <= self.chunk_size {
                units.push(Unit {
                    start: byte_pos,
                    end: byte_pos + segment.len(),
                    char_start: char_pos,
                    char_end: char_pos + seg_chars,
                });
            } else {
                // Oversized segment: cut into chunk_size-character pieces.
                let mut piece_start = 0usize;
                let mut piece_char_start = char_pos;
                let mut count = 0usize;
                for (offset, _) in segment.char_indices() {
                    if count == self.chunk_size {
                        units.push(Unit {
                            start: byte_pos + piece_start,
                            end: byte_pos + offset,
                            char_start: piece_char_start,
                            char_end: piece_char_start + count,
                        });
                        piece_start = offset;
                        piece_char_start += count;
                        count = 0;
                    }
                    count += 1;
                }
                if count > 0 {
                    units.push(Unit {
                        start: byte_pos + piece_start,
                        end: byte_pos + segment.len(),
                        char_start: piece_char_start,
                        char_end: piece_char_start + count,
                    });
                }
            }

            byte_pos += segment.len();
            char_pos += seg_chars;
        }

        units
    }
}

fn window_span(window: &VecDeque<Unit>) -> Range<usize> {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => first.start..last.end,
        _ => 0..0,
    }
}

fn window_chars(window: &VecDeque<Unit>) -> usize {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => last.char_end - first.char_start,
        _ => 0,
    }
}

/// SHA-256 of a passage text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_passage(source: &SourceText, chunk_index: usize, chunk_count: usize, text: String) -> Passage {
    Passage {
        hash: content_hash(&text),
        text,
        source_document_id: source.document_id,
        source_name: source.name.clone(),
        chunk_index,
        chunk_count,
    }
}
