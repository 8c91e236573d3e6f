//! Token-set similarity.
//!
//! Both strings are reduced to sets of words. Shared words are set aside and
//! the leftovers of each side are compared character-wise with an
//! insertion/deletion distance. A string whose words are all present in the
//! other scores 100 regardless of order or surrounding text; strings with no
//! word in common score 0.

use std::collections::BTreeSet;

use rapidfuzz::distance::indel;

/// The distinct words of a normalized string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet<'a> {
    tokens: BTreeSet<&'a str>,
}

impl<'a> TokenSet<'a> {
    /// Split on whitespace and strip punctuation hugging each word, so
    /// `"pipe,"` and `"(pipe)"` both count as `pipe`.
    pub fn from_text(text: &'a str) -> Self {
        let tokens = text
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|word| !word.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Similarity between two token sets, 0..=100, rounded to a whole score.
    pub fn ratio(&self, other: &TokenSet<'_>) -> u8 {
        self.similarity(other).round().clamp(0.0, 100.0) as u8
    }

    /// Unrounded similarity, 0.0..=100.0. Threshold decisions use this so a
    /// raw 39.6 does not pass a threshold of 40.
    pub fn similarity(&self, other: &TokenSet<'_>) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        let intersection: Vec<&str> = self
            .tokens
            .iter()
            .filter(|t| other.tokens.contains(*t))
            .copied()
            .collect();
        if intersection.is_empty() {
            return 0.0;
        }

        let diff_ab: Vec<&str> = self
            .tokens
            .iter()
            .filter(|t| !other.tokens.contains(*t))
            .copied()
            .collect();
        let diff_ba: Vec<&str> = other
            .tokens
            .iter()
            .filter(|t| !self.tokens.contains(*t))
            .copied()
            .collect();

        if diff_ab.is_empty() || diff_ba.is_empty() {
            return 100.0;
        }

        // BTreeSet iteration is sorted, so the joins are canonical.
        let sect = intersection.join(" ");
        let diff_ab_joined = diff_ab.join(" ");
        let diff_ba_joined = diff_ba.join(" ");
        let sect_ab = format!("{sect} {diff_ab_joined}");
        let sect_ba = format!("{sect} {diff_ba_joined}");

        // Leftovers are normalized against the full "<intersection> <leftovers>"
        // lengths, not their own.
        let length_sum = sect_ab.chars().count() + sect_ba.chars().count();
        let distance = indel::distance(diff_ab_joined.chars(), diff_ba_joined.chars());
        let leftovers = 100.0 * (1.0 - distance as f64 / length_sum as f64);

        let sect_vs_ab = 100.0 * indel::normalized_similarity(sect.chars(), sect_ab.chars());
        let sect_vs_ba = 100.0 * indel::normalized_similarity(sect.chars(), sect_ba.chars());

        leftovers.max(sect_vs_ab).max(sect_vs_ba).clamp(0.0, 100.0)
    }
}

/// Token-set similarity of two already-normalized strings.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    TokenSet::from_text(a).ratio(&TokenSet::from_text(b))
}
