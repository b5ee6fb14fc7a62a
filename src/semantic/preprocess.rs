//! Text preprocessing for embedding input.
//!
//! Descriptions are split into sentences and grouped into short chunks:
//! 1. Split after `.`, `!` or `?` followed by whitespace
//! 2. Trim and drop empty fragments
//! 3. Group `sentences_per_chunk` consecutive sentences
//! 4. Fold a short trailing chunk into its predecessor
//!
//! Queries are normalized before they are embedded.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default number of sentences grouped into one chunk
pub const DEFAULT_SENTENCES_PER_CHUNK: usize = 2;

/// A trailing chunk with at most this many words is merged backwards
const TRAILING_MERGE_MAX_WORDS: usize = 6;

/// Sentence-ending punctuation followed by whitespace
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("Failed to compile sentence regex"));

/// Normalize a search query: trim, lowercase, collapse whitespace runs.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split text into trimmed, non-empty sentences.
/// The terminating punctuation stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // punctuation is a single ASCII byte
        let end = boundary.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Chunk a description for embedding.
///
/// Returns an empty vec for empty or whitespace-only input.
/// `sentences_per_chunk` below 1 is treated as 1.
pub fn chunk_description(description: &str, sentences_per_chunk: usize) -> Vec<String> {
    let per_chunk = sentences_per_chunk.max(1);
    let sentences = split_sentences(description);

    let mut chunks: Vec<String> = sentences
        .chunks(per_chunk)
        .map(|group| group.join(" "))
        .collect();

    let short_tail = chunks.len() >= 2
        && chunks
            .last()
            .map(|tail| word_count(tail) <= TRAILING_MERGE_MAX_WORDS)
            .unwrap_or(false);

    if short_tail {
        if let Some(tail) = chunks.pop() {
            if let Some(previous) = chunks.last_mut() {
                previous.push(' ');
                previous.push_str(&tail);
            }
        }
    }

    chunks
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
