//! Pluggable pipeline stages.
//!
//! The orchestrator only sees these traits; the default implementations
//! delegate to the matching and pricing crates.

use tenderbid_pricing::FeeSource;
use tenderbid_shared::{
    BidSummary, CatalogEntry, DocumentRecord, Match, PricedItem, Result, TenderBidError,
};

/// Scores one document against the catalog.
pub trait MatchStage: Send + Sync {
    fn match_document<'c>(
        &self,
        document: &DocumentRecord,
        catalog: &'c [CatalogEntry],
        threshold: u8,
    ) -> Result<Vec<Match<'c>>>;
}

/// Turns one document's matches into priced items.
pub trait PriceStage: Send + Sync {
    fn price(
        &self,
        matches: &[Match<'_>],
        fees: &dyn FeeSource,
        margin_pct: f64,
    ) -> Result<Vec<PricedItem>>;

    fn summarize(&self, items: &[PricedItem]) -> BidSummary {
        tenderbid_pricing::summarize(items)
    }
}

/// Token-set similarity matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetMatcher;

impl MatchStage for TokenSetMatcher {
    fn match_document<'c>(
        &self,
        document: &DocumentRecord,
        catalog: &'c [CatalogEntry],
        threshold: u8,
    ) -> Result<Vec<Match<'c>>> {
        if document.id.trim().is_empty() {
            return Err(TenderBidError::Matching(
                "document has no id; fees and reports cannot be keyed".into(),
            ));
        }
        if threshold > 100 {
            return Err(TenderBidError::Matching(format!(
                "threshold must be within 0..=100, got {threshold}"
            )));
        }
        Ok(tenderbid_matching::match_document(
            &document.id,
            &document.raw_text,
            catalog,
            threshold,
        ))
    }
}

/// Base price plus percentage margin plus parsed fees.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarginPricer;

impl PriceStage for MarginPricer {
    fn price(
        &self,
        matches: &[Match<'_>],
        fees: &dyn FeeSource,
        margin_pct: f64,
    ) -> Result<Vec<PricedItem>> {
        tenderbid_pricing::price(matches, fees, margin_pct)
    }
}
