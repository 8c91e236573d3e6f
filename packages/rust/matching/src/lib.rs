//! Lexical matching of tender text against the product catalog.
//!
//! Every catalog entry is compared once against the document using a
//! token-set similarity score (0-100). Entries scoring at or above the
//! threshold become [`Match`]es. The crate also carries the keyword and
//! insight-line extraction used to annotate reports.

mod keywords;
mod token_set;

use std::time::Instant;

use tracing::{debug, instrument};

use tenderbid_shared::{CatalogEntry, Match};

pub use keywords::{KeywordCount, key_lines, top_keywords};
pub use token_set::{TokenSet, token_set_ratio};

/// Default minimum score for a match to be kept.
pub const DEFAULT_THRESHOLD: u8 = 40;

/// Lower-case text for comparison.
///
/// Uses Unicode lower-casing, which does not depend on the process locale.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
}

/// Score every catalog entry against one document and keep those at or
/// above `threshold`.
///
/// Matches come back in catalog order; callers that need a ranking sort
/// them themselves. An empty catalog or empty text is not an error: the
/// former yields no matches, the latter scores every entry 0.
#[instrument(skip_all, fields(document_id = %document_id, catalog = catalog.len(), threshold))]
pub fn match_document<'c>(
    document_id: &str,
    document_text: &str,
    catalog: &'c [CatalogEntry],
    threshold: u8,
) -> Vec<Match<'c>> {
    let start = Instant::now();
    let document_lower = normalize(document_text);
    let document_tokens = TokenSet::from_text(&document_lower);

    let matches: Vec<Match<'c>> = catalog
        .iter()
        .filter_map(|entry| {
            let entry_lower = normalize(&entry.name);
            let entry_tokens = TokenSet::from_text(&entry_lower);
            let similarity = entry_tokens.similarity(&document_tokens);
            (similarity >= f64::from(threshold)).then(|| Match {
                document_id: document_id.to_string(),
                entry,
                score: entry_tokens.ratio(&document_tokens),
            })
        })
        .collect();

    debug!(
        matched = matches.len(),
        document_tokens = document_tokens.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "matching complete"
    );

    matches
}
