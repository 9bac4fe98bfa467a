//! Coarse textual similarity between two inquiry messages.
//!
//! The score blends a token-set Sørensen–Dice coefficient with a Dice coefficient over the
//! character bigrams of the word sequence, both taken over a lowercased, punctuation-free
//! rendering of each message. The bigram half follows word order, so a reordered message scores
//! below `1.0`. The score is symmetric and bounded to `[0, 1]`.

use std::collections::HashSet;

const TOKEN_WEIGHT: f64 = 0.7;
const BIGRAM_WEIGHT: f64 = 0.3;

/// Similarity of two messages in `[0, 1]`; `1.0` when both reduce to the same word sequence,
/// `0.0` when either side is empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let words_a = words(a);
    let words_b = words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    if words_a == words_b {
        return 1.0;
    }

    let token_score = dice(&token_set(&words_a), &token_set(&words_b));
    let bigram_score = dice(&bigrams(&words_a), &bigrams(&words_b));

    (TOKEN_WEIGHT * token_score + BIGRAM_WEIGHT * bigram_score).clamp(0.0, 1.0)
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn token_set(words: &[String]) -> HashSet<&str> {
    words.iter().map(String::as_str).collect()
}

/// Bigrams of the words joined by single spaces, so adjacency between words counts.
fn bigrams(words: &[String]) -> HashSet<(char, char)> {
    let chars: Vec<char> = words.join(" ").chars().collect();
    if chars.len() == 1 {
        return HashSet::from([(chars[0], ' ')]);
    }
    chars.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

fn dice<T: Eq + std::hash::Hash>(left: &HashSet<T>, right: &HashSet<T>) -> f64 {
    let total = left.len() + right.len();
    if total == 0 {
        return 0.0;
    }
    let shared = left.intersection(right).count();
    (2 * shared) as f64 / total as f64
}
