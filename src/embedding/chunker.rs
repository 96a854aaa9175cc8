// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! Pages are split into overlapping character windows. A window prefers to
//! end on a paragraph break, then a line break, then a sentence end, then a
//! space, and only falls back to a hard cut when none of those exist in the
//! back half of the window. Chunk ids are derived from the source, the page
//! and the position of the window within the page, so re-chunking identical
//! input always reproduces identical ids.

use crate::documents::Document;
use crate::errors::{Error, Result};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 80;

/// Break points tried in order of preference.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Configuration for the text chunker.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig with the specified parameters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub page: u32,
}

/// A window of page text, the unit that gets embedded and retrieved.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Set by [`assign_chunk_ids`]
    pub chunk_id: Option<String>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(source_id: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            chunk_id: None,
            text: text.into(),
            metadata: ChunkMetadata {
                source_id: source_id.into(),
                page,
            },
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.chunk_id.as_deref()
    }
}

/// A window of text with its character offsets (end exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Splits page text into overlapping windows.
pub struct EmbeddingChunker {
    config: ChunkConfig,
}

impl EmbeddingChunker {
    /// Creates a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Splits text into overlapping windows.
    ///
    /// Algorithm:
    /// ```text
    /// start = 0
    /// while start < len:
    ///   end = start + size, or an earlier preferred break in the back half
    ///   emit text[start..end]
    ///   start = end - overlap, nudged forward to the next word start
    /// ```
    ///
    /// Consecutive windows always overlap or abut, so no text is lost.
    /// Windows that are blank after trimming are not emitted.
    pub fn split_text(&self, content: &str) -> Vec<TextWindow> {
        // Byte offset of every char, plus the end of the string.
        let bounds: Vec<usize> = content
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(content.len()))
            .collect();
        let total = bounds.len() - 1;

        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size - 1);
        let mut windows = Vec::new();
        let mut start = 0usize;

        while start < total {
            let hard_end = (start + size).min(total);
            let end = if hard_end == total {
                total
            } else {
                let lower = start + (size / 2).max(overlap + 1);
                find_break(content, &bounds, lower.min(hard_end), hard_end).unwrap_or(hard_end)
            };

            let text = content[bounds[start]..bounds[end]].trim();
            if !text.is_empty() {
                windows.push(TextWindow {
                    start,
                    end,
                    text: text.to_string(),
                });
            }

            if end == total {
                break;
            }

            let mut next = end.saturating_sub(overlap).max(start + 1);
            if overlap > 0 {
                next = word_start(content, &bounds, next, end);
            }
            start = next;
        }

        windows
    }

    /// Splits every page of every document into chunks, in document order.
    /// The chunks have no ids yet.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                doc.pages.iter().flat_map(move |page| {
                    self.split_text(&page.text)
                        .into_iter()
                        .map(move |window| Chunk::new(doc.source_id.clone(), page.number, window.text))
                })
            })
            .collect()
    }
}

/// Last preferred break in `[lower, upper)` char positions, returned as the
/// char position just past the separator.
fn find_break(content: &str, bounds: &[usize], lower: usize, upper: usize) -> Option<usize> {
    if lower >= upper {
        return None;
    }
    let lo = bounds[lower];
    let hi = bounds[upper];
    let window = &content[lo..hi];

    SEPARATORS.iter().find_map(|sep| {
        window.rfind(sep).and_then(|idx| {
            let byte_end = lo + idx + sep.len();
            bounds.binary_search(&byte_end).ok()
        })
    })
}

/// Moves `pos` forward past the word it lands in, without passing `limit`.
fn word_start(content: &str, bounds: &[usize], pos: usize, limit: usize) -> usize {
    if pos == 0 || pos >= limit {
        return pos;
    }
    let prev_is_space = content[bounds[pos - 1]..bounds[pos]]
        .chars()
        .all(char::is_whitespace);
    if prev_is_space {
        return pos;
    }
    match content[bounds[pos]..bounds[limit]].find(char::is_whitespace) {
        Some(idx) => {
            let byte = bounds[pos] + idx;
            bounds
                .binary_search(&byte)
                .map(|p| p + 1)
                .unwrap_or(pos)
                .min(limit)
        }
        None => pos,
    }
}

/// Formats the id of the `index`-th chunk of a page.
pub fn chunk_id(source_id: &str, page: u32, index: usize) -> String {
    format!("{}:{}:{}", source_id, page, index)
}

/// Assigns `source:page:index` ids in input order.
///
/// The index counts up from zero while consecutive chunks share the same
/// `(source_id, page)` and resets to zero when the pair changes. Ids are
/// therefore only stable if the chunks arrive in the same order every run.
pub fn assign_chunk_ids(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut last_key: Option<(String, u32)> = None;
    let mut index = 0usize;

    for chunk in chunks.iter_mut() {
        let key = (chunk.metadata.source_id.clone(), chunk.metadata.page);
        index = if last_key.as_ref() == Some(&key) {
            index + 1
        } else {
            0
        };
        chunk.chunk_id = Some(chunk_id(&key.0, key.1, index));
        last_key = Some(key);
    }

    chunks
}
