//! Keyword frequency and insight-line extraction for report annotations.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Words of two or more word characters.
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Common English function words that carry no tender-specific meaning.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "either",
    "etc", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here",
    "hers", "him", "his", "how", "however", "if", "in", "into", "is", "it", "its", "itself",
    "may", "me", "might", "more", "most", "must", "my", "no", "nor", "not", "of", "off", "on",
    "once", "only", "or", "other", "our", "ours", "out", "over", "own", "per", "same", "shall",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "then", "there", "these", "they", "this", "those", "through", "thus", "to", "too", "under",
    "until", "up", "upon", "us", "very", "via", "was", "we", "were", "what", "when", "where",
    "whether", "which", "while", "who", "whom", "why", "will", "with", "within", "without",
    "would", "yet", "you", "your", "yours",
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// A keyword and the number of times it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

/// The `n` most frequent non-stop-word tokens of `text`.
///
/// Ties are broken alphabetically so the output is stable.
pub fn top_keywords(text: &str, n: usize) -> Vec<KeywordCount> {
    if n == 0 {
        return Vec::new();
    }

    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in WORD_RE.find_iter(&lowered).map(|m| m.as_str()) {
        if !STOP_SET.contains(word) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(keyword, count)| KeywordCount {
            keyword: keyword.to_string(),
            count,
        })
        .collect()
}

/// Up to `n` lines that look like requirement bullets: lines containing a
/// dash, or starting with `1.` through `5.`.
pub fn key_lines(text: &str, n: usize) -> Vec<String> {
    const NUMBERED: [&str; 5] = ["1.", "2.", "3.", "4.", "5."];

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| line.contains('-') || NUMBERED.iter().any(|p| line.starts_with(p)))
        .take(n)
        .map(str::to_string)
        .collect()
}
