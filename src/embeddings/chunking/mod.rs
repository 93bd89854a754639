
use std::iter::FusedIterator;
use std::str::SplitWhitespace;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default maximum number of words per chunk
pub const DEFAULT_MAX_WORDS: usize = 500;

/// Represents a chunk of normalized text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    /// 0-based position of this chunk within the document
    pub ordinal: usize,
    /// The chunk text, words joined by single spaces
    pub content: String,
    /// Number of words in `content`
    pub word_count: usize,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum words per chunk; the last chunk may be shorter
    pub max_words: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

/// Lazy iterator over fixed-size word chunks of a text.
///
/// Cloning the iterator restarts from the clone point, and calling
/// [`chunk_words`] again restarts from the beginning.
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: SplitWhitespace<'a>,
    max_words: usize,
}

impl Iterator for WordChunks<'_> {
    type Item = String;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = String::new();
        let mut taken = 0;

        while taken < self.max_words {
            let Some(word) = self.words.next() else {
                break;
            };
            if taken > 0 {
                chunk.push(' ');
            }
            chunk.push_str(word);
            taken += 1;
        }

        (taken > 0).then_some(chunk)
    }
}

impl FusedIterator for WordChunks<'_> {}

/// Split text into chunks of at most `max_words` whitespace-separated words.
///
/// Words keep their original order and none are dropped or repeated. Empty
/// or whitespace-only text yields no chunks. A `max_words` of zero is treated
/// as one.
#[inline]
pub fn chunk_words(text: &str, max_words: usize) -> WordChunks<'_> {
    WordChunks {
        words: text.split_whitespace(),
        max_words: max_words.max(1),
    }
}

/// Materialize the chunks of a normalized document with their ordinals
#[inline]
pub fn chunk_content(text: &str, config: &ChunkingConfig) -> Vec<ContentChunk> {
    let chunks: Vec<ContentChunk> = chunk_words(text, config.max_words)
        .enumerate()
        .map(|(ordinal, content)| ContentChunk {
            ordinal,
            word_count: word_count(&content),
            content,
        })
        .collect();

    debug!(
        "Chunked {} words into {} chunks of at most {} words",
        word_count(text),
        chunks.len(),
        config.max_words
    );

    chunks
}

#[inline]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of chunks [`chunk_words`] produces for a given word count
#[inline]
pub fn expected_chunk_count(word_count: usize, max_words: usize) -> usize {
    word_count.div_ceil(max_words.max(1))
}
