//! Pricing of catalog matches into bid lines.
//!
//! Each [`Match`] becomes a [`PricedItem`]: the catalog base price is marked
//! up by the margin, and the document's tender fee and EMD are parsed out of
//! free text and added to form the line's total estimate.

mod fees;

use std::collections::HashMap;

use tracing::{debug, instrument};

use tenderbid_shared::{BidSummary, FeeFields, Match, PricedItem, Result, TenderBidError};

pub use fees::{extract_number, scan_fee_fields};

/// Default markup over base price, in percent.
pub const DEFAULT_MARGIN_PCT: f64 = 10.0;

/// Source of raw fee text keyed by document id.
///
/// An unknown id is not an error; implementations return empty fields.
pub trait FeeSource {
    fn fees_for(&self, document_id: &str) -> FeeFields;
}

impl FeeSource for HashMap<String, FeeFields> {
    fn fees_for(&self, document_id: &str) -> FeeFields {
        self.get(document_id).cloned().unwrap_or_default()
    }
}

/// A fixed set of fee fields for every document.
impl FeeSource for FeeFields {
    fn fees_for(&self, _document_id: &str) -> FeeFields {
        self.clone()
    }
}

/// `base_price * (1 + margin_pct / 100)`.
pub fn bid_price(base_price: f64, margin_pct: f64) -> f64 {
    base_price * (1.0 + margin_pct / 100.0)
}

/// Convert matches into priced items, one per match, in match order.
///
/// Fee text is resolved per document id and parsed with
/// [`extract_number`]; unparseable fees count as zero. Values are stored
/// unrounded.
///
/// # Errors
/// [`TenderBidError::Pricing`] when the margin is negative or not finite, or
/// a matched entry carries a negative or non-finite base price.
#[instrument(skip_all, fields(matches = matches.len(), margin_pct))]
pub fn price(
    matches: &[Match<'_>],
    fees: &dyn FeeSource,
    margin_pct: f64,
) -> Result<Vec<PricedItem>> {
    if !margin_pct.is_finite() || margin_pct < 0.0 {
        return Err(TenderBidError::Pricing(format!(
            "margin_pct must be a finite number >= 0, got {margin_pct}"
        )));
    }

    // Matches for one call usually share a document; parse its fees once.
    let mut parsed: HashMap<&str, (f64, f64)> = HashMap::new();
    let mut items = Vec::with_capacity(matches.len());

    for m in matches {
        let entry = m.entry;
        if !entry.base_price.is_finite() || entry.base_price < 0.0 {
            return Err(TenderBidError::Pricing(format!(
                "catalog entry '{}' has invalid base price {}",
                entry.name, entry.base_price
            )));
        }

        let (tender_fee, emd) = *parsed.entry(m.document_id.as_str()).or_insert_with(|| {
            let fields = fees.fees_for(&m.document_id);
            (
                extract_number(Some(&fields.tender_fee_text)),
                extract_number(Some(&fields.emd_text)),
            )
        });

        let bid = bid_price(entry.base_price, margin_pct);
        items.push(PricedItem {
            document_id: m.document_id.clone(),
            catalog_entry_name: entry.name.clone(),
            category: entry.category.clone(),
            score: m.score,
            base_price: entry.base_price,
            bid_price: bid,
            tender_fee,
            emd,
            total_estimate: bid + tender_fee + emd,
        });
    }

    debug!(items = items.len(), "pricing complete");
    Ok(items)
}

/// Count and totals over one document's priced items.
pub fn summarize(items: &[PricedItem]) -> BidSummary {
    items.iter().fold(BidSummary::default(), |mut summary, item| {
        summary.item_count += 1;
        summary.total_bid_price += item.bid_price;
        summary.total_estimate += item.total_estimate;
        summary
    })
}
