//! Word-level text heuristics used to gate user speech.

use std::collections::HashSet;

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Jaccard similarity over lowercased whitespace-tokenized words.
///
/// Two empty texts are identical (1.0); one empty text shares nothing (0.0).
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let union = a.union(&b).count();
    let shared = a.intersection(&b).count();
    shared as f64 / union as f64
}

/// Reduce a transcript to its actionable lead.
///
/// The first sentence (ending in `.`, `!` or `?`) is returned alone when it
/// has at least `lead_min_words` words. Otherwise the first `max_words`
/// words are returned.
pub fn lead_clause(text: &str, lead_min_words: usize, max_words: usize) -> String {
    let text = text.trim();

    if let Some(end) = text.find(['.', '!', '?']) {
        let sentence = text[..=end].trim();
        if word_count(sentence) >= lead_min_words {
            return sentence.to_string();
        }
    }

    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First configured phrase contained in `text` (case-insensitive substring).
///
/// Typographic apostrophes are folded to `'` before matching so "I’m better"
/// from a recognizer matches "i'm better".
pub fn find_phrase<'a>(text: &str, phrases: &'a [String]) -> Option<&'a str> {
    let normalized = text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    phrases
        .iter()
        .map(String::as_str)
        .find(|phrase| !phrase.is_empty() && normalized.contains(&phrase.to_lowercase()))
}
