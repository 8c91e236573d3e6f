//! Loaders for the extractor's output sheets: tender documents and fee fields.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{info, instrument, warn};

use tenderbid_pricing::FeeSource;
use tenderbid_shared::{DocumentMeta, DocumentRecord, FeeFields, Result, TenderBidError};

use crate::sheet::{Sheet, cell};

const ID_COLUMNS: &[&str] = &["filename", "tender_file", "document_id", "id"];
const TEXT_COLUMNS: &[&str] = &["extracted_text", "raw_text", "text"];
const TENDER_FEE_COLUMNS: &[&str] = &["tender_fee", "document_fee"];
const EMD_COLUMNS: &[&str] = &["emd", "earnest_money"];

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Load the parsed-tender sheet into documents, preserving row order.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_documents_csv(path: &Path) -> Result<Vec<DocumentRecord>> {
    let file = File::open(path).map_err(|e| TenderBidError::io(path, e))?;
    let documents = documents_from_reader(file)?;
    info!(documents = documents.len(), "documents loaded");
    Ok(documents)
}

/// Parse documents from a sheet with `Filename`, `Extracted_Text` and the
/// optional `Title`, `Due_Date`, `Source` columns.
///
/// A blank `Filename` is derived from the `Source` URL's last path segment.
/// Rows where neither is available keep an empty id; the pipeline reports
/// them as failed rather than dropping them.
pub fn documents_from_reader<R: Read>(source: R) -> Result<Vec<DocumentRecord>> {
    let mut sheet = Sheet::new(source)?;
    let id_col = sheet.column(ID_COLUMNS);
    let source_col = sheet.column(&["source", "pdf_url", "url"]);
    if id_col.is_none() && source_col.is_none() {
        return Err(TenderBidError::parse(format!(
            "documents sheet needs an id column (one of: {}) or a source column",
            ID_COLUMNS.join(", ")
        )));
    }
    let text_col = sheet.require(TEXT_COLUMNS)?;
    let title_col = sheet.column(&["title"]);
    let due_col = sheet.column(&["due_date", "due"]);

    let mut documents = Vec::new();
    for row in sheet.rows() {
        let (line, record) = row?;
        let source = cell(&record, source_col).map(str::to_string);
        let id = match cell(&record, id_col) {
            Some(id) => id.to_string(),
            None => {
                let derived = source.as_deref().map(document_id_from_url).unwrap_or_default();
                if derived.is_empty() {
                    warn!(line, "document row without id or source");
                }
                derived
            }
        };

        let title = cell(&record, title_col).map_or_else(|| id.clone(), str::to_string);
        documents.push(DocumentRecord {
            raw_text: cell(&record, Some(text_col)).unwrap_or_default().to_string(),
            metadata: DocumentMeta {
                title,
                due_date: cell(&record, due_col).map(str::to_string),
                source,
            },
            id,
        });
    }

    Ok(documents)
}

/// File name portion of a download URL, without query or fragment.
pub fn document_id_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// Fee lookup
// ---------------------------------------------------------------------------

/// Raw tender-fee / EMD text keyed by document id.
///
/// Inserting an id twice keeps the later fields.
#[derive(Debug, Clone, Default)]
pub struct FeeLookup {
    fields: HashMap<String, FeeFields>,
}

impl FeeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document_id: impl Into<String>, fields: FeeFields) {
        self.fields.insert(document_id.into(), fields);
    }

    pub fn get(&self, document_id: &str) -> Option<&FeeFields> {
        self.fields.get(document_id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read fee columns from a sheet keyed by `Filename`.
    ///
    /// Works for a dedicated fees sheet and for the parsed-tender sheet
    /// alike; a sheet without fee columns gives an empty lookup.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| TenderBidError::io(path, e))?;
        let lookup = Self::from_csv_reader(file)?;
        info!(entries = lookup.len(), "fee lookup loaded");
        Ok(lookup)
    }

    pub fn from_csv_reader<R: Read>(source: R) -> Result<Self> {
        let mut sheet = Sheet::new(source)?;
        let id_col = sheet.require(ID_COLUMNS)?;
        let fee_col = sheet.column(TENDER_FEE_COLUMNS);
        let emd_col = sheet.column(EMD_COLUMNS);

        let mut lookup = Self::new();
        if fee_col.is_none() && emd_col.is_none() {
            return Ok(lookup);
        }

        for row in sheet.rows() {
            let (_, record) = row?;
            let Some(id) = cell(&record, Some(id_col)) else {
                continue;
            };
            let fields = FeeFields::new(
                cell(&record, fee_col).unwrap_or_default(),
                cell(&record, emd_col).unwrap_or_default(),
            );
            lookup.insert(id, fields);
        }

        Ok(lookup)
    }
}

impl FeeSource for FeeLookup {
    fn fees_for(&self, document_id: &str) -> FeeFields {
        self.get(document_id).cloned().unwrap_or_default()
    }
}

impl FromIterator<(String, FeeFields)> for FeeLookup {
    fn from_iter<I: IntoIterator<Item = (String, FeeFields)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
