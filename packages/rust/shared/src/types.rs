//! Core domain types for TenderBid runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for report artifacts and batch indexes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for batch run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One product/SKU row of the catalog. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Product name as written in the catalog (as-entered casing).
    pub name: String,
    /// Product category; `"Unknown"` when the catalog omits it.
    pub category: String,
    /// List price before margin. Loaders coerce missing values to `0.0`.
    pub base_price: f64,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, category: impl Into<String>, base_price: f64) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            base_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Cover metadata for a tender document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Tender title.
    pub title: String,
    /// Bid submission due date, as printed in the tender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Portal page or URL the document came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Already-extracted text of one tender document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Filename or URL-derived identifier; keys the fee lookup.
    pub id: String,
    /// Extracted text. May be empty.
    #[serde(default)]
    pub raw_text: String,
    /// Cover metadata.
    #[serde(default)]
    pub metadata: DocumentMeta,
}

impl DocumentRecord {
    /// Build a record whose title defaults to its id.
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            metadata: DocumentMeta {
                title: id.clone(),
                ..DocumentMeta::default()
            },
            id,
            raw_text: raw_text.into(),
        }
    }
}

/// Raw tender-fee and EMD text for one document, before numeric extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeFields {
    #[serde(default)]
    pub tender_fee_text: String,
    #[serde(default)]
    pub emd_text: String,
}

impl FeeFields {
    pub fn new(tender_fee_text: impl Into<String>, emd_text: impl Into<String>) -> Self {
        Self {
            tender_fee_text: tender_fee_text.into(),
            emd_text: emd_text.into(),
        }
    }

    /// Both fields blank.
    pub fn is_empty(&self) -> bool {
        self.tender_fee_text.trim().is_empty() && self.emd_text.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Matching & pricing results
// ---------------------------------------------------------------------------

/// A scored association between one document and one catalog entry.
///
/// Borrows the entry from the catalog; matches never outlive the
/// per-document processing that created them.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'c> {
    pub document_id: String,
    pub entry: &'c CatalogEntry,
    /// Token-set similarity, 0..=100.
    pub score: u8,
}

/// A match converted into a priced bid line.
///
/// `bid_price = base_price * (1 + margin/100)` and
/// `total_estimate = bid_price + tender_fee + emd`; all money fields are >= 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedItem {
    pub document_id: String,
    pub catalog_entry_name: String,
    pub category: String,
    pub score: u8,
    pub base_price: f64,
    pub bid_price: f64,
    pub tender_fee: f64,
    pub emd: f64,
    pub total_estimate: f64,
}

/// Aggregate over the priced items of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidSummary {
    pub item_count: usize,
    pub total_bid_price: f64,
    pub total_estimate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn document_title_defaults_to_id() {
        let doc = DocumentRecord::new("tender-01.pdf", "We require Steel Pipe");
        assert_eq!(doc.metadata.title, "tender-01.pdf");
        assert!(doc.metadata.due_date.is_none());
    }

    #[test]
    fn document_deserializes_with_missing_fields() {
        let doc: DocumentRecord =
            serde_json::from_str(r#"{"id": "t1"}"#).expect("deserialize sparse document");
        assert_eq!(doc.id, "t1");
        assert_eq!(doc.raw_text, "");
        assert_eq!(doc.metadata, DocumentMeta::default());
    }

    #[test]
    fn fee_fields_emptiness() {
        assert!(FeeFields::default().is_empty());
        assert!(FeeFields::new("  ", "").is_empty());
        assert!(!FeeFields::new("Rs. 500/-", "").is_empty());
    }

    #[test]
    fn priced_item_serialization() {
        let item = PricedItem {
            document_id: "t1".into(),
            catalog_entry_name: "Steel Pipe".into(),
            category: "Pipes".into(),
            score: 100,
            base_price: 100.0,
            bid_price: 110.0,
            tender_fee: 500.0,
            emd: 1000.0,
            total_estimate: 1610.0,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        let parsed: PricedItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, item);
    }
}
