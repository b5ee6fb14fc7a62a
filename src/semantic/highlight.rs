//! Highlight phrase extraction.
//!
//! Picks short, specific phrases out of matched text so a UI can emphasise
//! them. Candidates are contiguous 3-grams then 2-grams of lowercase word
//! tokens that contain no stop word, scored by total token length.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default number of phrases returned per match
pub const DEFAULT_HIGHLIGHT_PHRASES: usize = 3;

/// Tokens that disqualify an n-gram
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

/// N-gram lengths, longest first
const NGRAM_LENGTHS: [usize; 2] = [3, 2];

static TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9']+").expect("Failed to compile token regex"));

/// Tokenize text into lowercase word tokens.
fn tokenize(text: &str) -> Vec<String> {
    TOKEN_REGEX
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract up to `max_phrases` distinct highlight phrases from `text`.
///
/// Ordered by descending score (sum of token lengths), then alphabetically.
pub fn extract_phrases(text: &str, max_phrases: usize) -> Vec<String> {
    let tokens = tokenize(text);
    if tokens.is_empty() || max_phrases == 0 {
        return vec![];
    }

    let mut candidates: Vec<(usize, String)> = Vec::new();
    for length in NGRAM_LENGTHS {
        for window in tokens.windows(length) {
            if window.iter().any(|token| STOP_WORDS.contains(&token.as_str())) {
                continue;
            }
            let score = window.iter().map(|token| token.len()).sum();
            candidates.push((score, window.join(" ")));
        }
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut phrases: Vec<String> = Vec::with_capacity(max_phrases);
    for (_, phrase) in candidates {
        if !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
        if phrases.len() >= max_phrases {
            break;
        }
    }

    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(extract_phrases("", 3).is_empty());
        assert!(extract_phrases("   \n", 3).is_empty());
        assert!(extract_phrases("!!! ---", 3).is_empty());
    }

    #[test]
    fn test_prefers_longer_phrases() {
        let phrases = extract_phrases("Data Structures and Algorithms", 3);
        // "and" splits the title, so only the 2-gram survives
        assert_eq!(phrases, vec!["data structures".to_string()]);
    }

    #[test]
    fn test_trigram_ranks_first() {
        let phrases = extract_phrases("Introduction to modern operating systems design", 3);
        assert_eq!(phrases[0], "modern operating systems");
        assert!(phrases.len() <= 3);
    }

    #[test]
    fn test_never_contains_stop_words() {
        let text = "The art of computer programming is a classic book on the analysis of algorithms";
        let phrases = extract_phrases(text, 10);

        assert!(!phrases.is_empty());
        for phrase in &phrases {
            for token in phrase.split(' ') {
                assert!(!STOP_WORDS.contains(&token), "{phrase}");
            }
        }
    }

    #[test]
    fn test_ordering_score_then_alphabetical() {
        let phrases = extract_phrases("abc xyz. xyz abc.", 5);
        assert_eq!(
            phrases,
            vec![
                "abc xyz xyz".to_string(),
                "xyz xyz abc".to_string(),
                "abc xyz".to_string(),
                "xyz abc".to_string(),
                "xyz xyz".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_duplicates_and_limit() {
        let text = "deep learning deep learning deep learning";
        let phrases = extract_phrases(text, 3);

        assert!(phrases.len() <= 3);
        let mut deduped = phrases.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), phrases.len());
    }

    #[test]
    fn test_zero_limit() {
        assert!(extract_phrases("quantum computing basics", 0).is_empty());
    }
}
