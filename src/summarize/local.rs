//! Local heuristics that need no network: lead sentences as bullets and
//! keyword-frequency tags.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Shortest and longest sentence (in chars) accepted as a bullet.
const MIN_SENTENCE: usize = 40;
const MAX_SENTENCE: usize = 400;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z][a-z0-9\-]+").unwrap());

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "among", "and", "any", "are", "because", "been", "before",
    "being", "between", "both", "but", "can", "could", "did", "does", "during", "each", "even",
    "for", "from", "further", "had", "has", "have", "having", "her", "here", "hers", "him", "his",
    "how", "into", "its", "itself", "just", "last", "like", "made", "make", "many", "more", "most",
    "much", "new", "not", "now", "off", "once", "one", "only", "other", "our", "out", "over",
    "own", "said", "same", "say", "says", "she", "should", "since", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "too", "two", "under", "until", "use", "used", "using", "very", "was", "way", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "year",
    "years", "you", "your",
];

/// Split after `.`, `!` or `?` when followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    sentences.push(&text[start..next_idx]);
                    start = next_idx;
                }
            }
        }
    }
    sentences.push(&text[start..]);
    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The first `k` sentences of reasonable length.
pub fn fallback_bullets(text: &str, k: usize) -> Vec<String> {
    split_sentences(text)
        .into_iter()
        .filter(|s| (MIN_SENTENCE..=MAX_SENTENCE).contains(&s.chars().count()))
        .take(k)
        .map(str::to_string)
        .collect()
}

/// The `n` most frequent non-stopword terms, first occurrence breaking ties.
pub fn keyword_tags(text: &str, n: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    // term -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, m) in WORD.find_iter(&lower).enumerate() {
        let word = m.as_str().trim_matches('-');
        if word.len() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(n)
        .map(|(word, _)| word.to_string())
        .collect()
}
