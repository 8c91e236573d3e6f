//! Bid report assembler and report sinks.
//!
//! [`assemble`] is a pure transformation of priced items, their summary, and
//! document metadata into a [`ReportArtifact`]. Persisting the artifact is the
//! job of a [`ReportSink`]; the filesystem sink writes the following layout:
//!
//! ```text
//! <root>/<document-slug>/
//! ├── report.json
//! └── price_breakup.csv
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use tenderbid_matching::KeywordCount;
use tenderbid_shared::{
    BidSummary, CURRENT_SCHEMA_VERSION, DocumentRecord, PricedItem, Result, TenderBidError,
};

pub const REPORT_FILE: &str = "report.json";
pub const PRICE_BREAKUP_FILE: &str = "price_breakup.csv";

// ---------------------------------------------------------------------------
// Artifact model
// ---------------------------------------------------------------------------

/// Cover section: what the bid is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverSection {
    pub title: String,
    pub due_date: Option<String>,
    pub source: Option<String>,
    pub document_id: String,
    pub generated_at: DateTime<Utc>,
}

/// One bid line, copied from a [`PricedItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRow {
    /// 1-based position in the line-item section.
    pub line: usize,
    pub product: String,
    pub category: String,
    pub score: u8,
    pub base_price: f64,
    pub bid_price: f64,
    pub tender_fee: f64,
    pub emd: f64,
    pub total_estimate: f64,
}

/// Keyword and key-line digest of the document text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub keywords: Vec<KeywordCount>,
    pub key_lines: Vec<String>,
}

/// A complete bid report for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub schema_version: u32,
    pub document_id: String,
    pub cover: CoverSection,
    pub line_items: Vec<LineItemRow>,
    pub summary: BidSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Insights>,
}

/// Build the report for one document.
///
/// Line items keep the order they were priced in and the summary is taken
/// as given; nothing is recomputed here.
#[instrument(skip_all, fields(document_id = %document.id, items = items.len()))]
pub fn assemble(
    items: &[PricedItem],
    summary: &BidSummary,
    document: &DocumentRecord,
    insights: Option<Insights>,
) -> ReportArtifact {
    let line_items = items
        .iter()
        .enumerate()
        .map(|(idx, item)| LineItemRow {
            line: idx + 1,
            product: item.catalog_entry_name.clone(),
            category: item.category.clone(),
            score: item.score,
            base_price: item.base_price,
            bid_price: item.bid_price,
            tender_fee: item.tender_fee,
            emd: item.emd,
            total_estimate: item.total_estimate,
        })
        .collect();

    let meta = &document.metadata;
    ReportArtifact {
        schema_version: CURRENT_SCHEMA_VERSION,
        document_id: document.id.clone(),
        cover: CoverSection {
            title: meta.title.clone(),
            due_date: meta.due_date.clone(),
            source: meta.source.clone(),
            document_id: document.id.clone(),
            generated_at: Utc::now(),
        },
        line_items,
        summary: summary.clone(),
        insights,
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// How a sink kept the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    /// Written to durable storage.
    Written,
    /// Held in memory only.
    Buffered,
}

/// Metadata for a single written file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Where a persisted report can be found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkReceipt {
    pub locator: String,
    pub status: SinkStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ArtifactMeta>,
}

/// Destination for assembled reports.
///
/// Failures must be returned, never swallowed; the orchestrator tags them
/// as report failures.
pub trait ReportSink: Send + Sync {
    fn persist(&self, artifact: &ReportArtifact) -> Result<SinkReceipt>;
}

/// Writes each report into its own directory under `root`.
#[derive(Debug, Clone)]
pub struct FsReportSink {
    root: PathBuf,
}

impl FsReportSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds the report for `document_id`.
    pub fn report_dir(&self, document_id: &str) -> PathBuf {
        self.root.join(document_slug(document_id))
    }

    fn write(&self, artifact: &ReportArtifact) -> Result<SinkReceipt> {
        let dir = self.report_dir(&artifact.document_id);
        std::fs::create_dir_all(&dir).map_err(|e| TenderBidError::io(&dir, e))?;

        let json = serde_json::to_vec_pretty(artifact).map_err(|e| {
            TenderBidError::Persistence(format!("report serialization failed: {e}"))
        })?;
        let csv = render_price_breakup(artifact)?;

        let files = vec![
            write_atomic(&dir, REPORT_FILE, &json)?,
            write_atomic(&dir, PRICE_BREAKUP_FILE, &csv)?,
        ];

        let locator = dir.join(REPORT_FILE).display().to_string();
        info!(document_id = %artifact.document_id, %locator, "report written");

        Ok(SinkReceipt {
            locator,
            status: SinkStatus::Written,
            files,
        })
    }
}

impl ReportSink for FsReportSink {
    #[instrument(skip_all, fields(document_id = %artifact.document_id))]
    fn persist(&self, artifact: &ReportArtifact) -> Result<SinkReceipt> {
        self.write(artifact).map_err(|e| match e {
            TenderBidError::Persistence(_) => e,
            other => TenderBidError::Persistence(other.to_string()),
        })
    }
}

/// Keeps artifacts in memory; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<ReportArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far, in persist order.
    pub fn artifacts(&self) -> Vec<ReportArtifact> {
        self.artifacts
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|guard| guard.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemorySink {
    fn persist(&self, artifact: &ReportArtifact) -> Result<SinkReceipt> {
        let mut guard = self
            .artifacts
            .lock()
            .map_err(|_| TenderBidError::Persistence("memory sink lock poisoned".into()))?;
        guard.push(artifact.clone());
        Ok(SinkReceipt {
            locator: format!("memory://{}/{}", artifact.document_id, guard.len() - 1),
            status: SinkStatus::Buffered,
            files: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Render the line-item section as CSV, money rounded to two places.
pub fn render_price_breakup(artifact: &ReportArtifact) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| TenderBidError::Persistence(format!("CSV write failed: {e}"));

    writer
        .write_record([
            "Line",
            "Product",
            "Category",
            "Score",
            "Base_Price",
            "Bid_Price",
            "Tender_Fee",
            "EMD",
            "Total_Estimate",
        ])
        .map_err(csv_err)?;

    for row in &artifact.line_items {
        writer
            .write_record([
                row.line.to_string(),
                row.product.clone(),
                row.category.clone(),
                row.score.to_string(),
                money(row.base_price),
                money(row.bid_price),
                money(row.tender_fee),
                money(row.emd),
                money(row.total_estimate),
            ])
            .map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| TenderBidError::Persistence(format!("CSV flush failed: {e}")))
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

/// Write `content` to `dir/filename` via a temp file and rename.
///
/// Each call writes its own temp file, so concurrent writers of the same
/// target never share one; the last rename wins.
pub(crate) fn write_atomic(dir: &Path, filename: &str, content: &[u8]) -> Result<ArtifactMeta> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.{}.tmp", Uuid::now_v7()));

    if let Err(e) = std::fs::write(&temp, content) {
        let _ = std::fs::remove_file(&temp);
        return Err(TenderBidError::io(&temp, e));
    }
    if let Err(e) = std::fs::rename(&temp, &target) {
        let _ = std::fs::remove_file(&temp);
        return Err(TenderBidError::io(&target, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(content);
    let sha256 = format!("{:x}", hasher.finalize());

    debug!(file = %target.display(), size = content.len(), "wrote file");
    Ok(ArtifactMeta {
        filename: filename.to_string(),
        sha256,
        size_bytes: content.len(),
    })
}

/// Filesystem-safe directory name for a document id.
///
/// Distinct ids that slugify alike stay apart through a short hash suffix.
pub fn document_slug(document_id: &str) -> String {
    let mut slug = String::with_capacity(document_id.len());
    for ch in document_id.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "document" } else { slug };

    let hash = format!("{:x}", Sha256::digest(document_id.as_bytes()));
    format!("{slug}-{}", &hash[..8])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
