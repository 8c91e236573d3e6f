//! Read-only catalog store.
//!
//! The catalog is loaded once per batch and shared by every document. Cloning
//! a [`Catalog`] clones a reference, not the entries.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use tenderbid_shared::{CatalogEntry, Result, TenderBidError};

use crate::sheet::{Sheet, cell};

/// Category used when the products sheet leaves it blank.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Immutable, ordered product catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Arc<[CatalogEntry]>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load the products sheet (`Product_Name`, `Category`, `Base_Price`).
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| TenderBidError::io(path, e))?;
        let catalog = Self::from_csv_reader(file)?;
        info!(entries = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Load a products sheet from any reader.
    ///
    /// Rows without a product name are skipped. A blank category becomes
    /// [`UNKNOWN_CATEGORY`]; a blank, non-numeric, or negative price becomes
    /// `0.0`.
    pub fn from_csv_reader<R: Read>(source: R) -> Result<Self> {
        let mut sheet = Sheet::new(source)?;
        let name_col = sheet.require(&["product_name", "name", "product"])?;
        let category_col = sheet.column(&["category"]);
        let price_col = sheet.column(&["base_price", "price"]);

        let mut entries = Vec::new();
        for row in sheet.rows() {
            let (line, record) = row?;
            let Some(name) = cell(&record, Some(name_col)) else {
                warn!(line, "catalog row without a product name, skipping");
                continue;
            };

            let category = cell(&record, category_col).unwrap_or(UNKNOWN_CATEGORY);
            let base_price = parse_price(cell(&record, price_col), line);
            entries.push(CatalogEntry::new(name, category, base_price));
        }

        debug!(entries = entries.len(), "parsed products sheet");
        Ok(Self::new(entries))
    }
}

impl From<Vec<CatalogEntry>> for Catalog {
    fn from(entries: Vec<CatalogEntry>) -> Self {
        Self::new(entries)
    }
}

fn parse_price(raw: Option<&str>, line: u64) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            warn!(line, value = raw, "invalid base price, using 0");
            0.0
        }
    }
}
