//! Header-driven access to CSV sheets exported by the upstream extractors.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord};

use tenderbid_shared::{Result, TenderBidError};

/// A CSV reader plus a case-insensitive header index.
pub(crate) struct Sheet<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
}

impl<R: Read> Sheet<R> {
    pub(crate) fn new(source: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = reader
            .headers()
            .map_err(|e| TenderBidError::parse(format!("unreadable CSV header: {e}")))?
            .iter()
            .map(normalize_header)
            .collect();

        Ok(Self { reader, headers })
    }

    /// Index of the first header matching any of `names`.
    pub(crate) fn column(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.headers.iter().position(|h| h == &normalize_header(name)))
    }

    /// Like [`Sheet::column`], but a missing column is a parse error.
    pub(crate) fn require(&self, names: &[&str]) -> Result<usize> {
        self.column(names).ok_or_else(|| {
            TenderBidError::parse(format!(
                "missing required column (one of: {})",
                names.join(", ")
            ))
        })
    }

    /// Iterate data rows; the 1-based line number accompanies each record.
    pub(crate) fn rows(&mut self) -> impl Iterator<Item = Result<(u64, StringRecord)>> + '_ {
        self.reader.records().map(|row| {
            let record =
                row.map_err(|e| TenderBidError::parse(format!("malformed CSV row: {e}")))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            Ok((line, record))
        })
    }
}

/// Trimmed field value; absent columns and blank cells are `None`.
pub(crate) fn cell(record: &StringRecord, column: Option<usize>) -> Option<&str> {
    column
        .and_then(|idx| record.get(idx))
        .filter(|value| !value.is_empty())
}

fn normalize_header(name: &str) -> String {
    name.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_case_and_separator_insensitively() {
        let data = "\u{feff}Product Name,base-price\nPipe,10\n";
        let sheet = Sheet::new(data.as_bytes()).unwrap();
        assert_eq!(sheet.column(&["product_name"]), Some(0));
        assert_eq!(sheet.column(&["Base_Price"]), Some(1));
        assert_eq!(sheet.column(&["category"]), None);
        assert!(sheet.require(&["category", "kind"]).is_err());
    }

    #[test]
    fn blank_cells_read_as_none() {
        let data = "a,b\n x ,\n";
        let mut sheet = Sheet::new(data.as_bytes()).unwrap();
        let (line, record) = sheet.rows().next().unwrap().unwrap();
        assert_eq!(line, 2);
        assert_eq!(cell(&record, Some(0)), Some("x"));
        assert_eq!(cell(&record, Some(1)), None);
        assert_eq!(cell(&record, Some(5)), None);
        assert_eq!(cell(&record, None), None);
    }
}
