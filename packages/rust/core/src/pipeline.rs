//! Batch orchestration: documents → match → price → report, one outcome each.
//!
//! Every document moves through
//! `Fetched → Matched → Priced → Reported → Done`; a failure at any step
//! moves it to `Errored` and the batch carries on with the next document.
//! The batch result always holds exactly one outcome per input document, in
//! input order, whether the run was sequential, concurrent, or cancelled.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use tenderbid_matching::{key_lines, top_keywords};
use tenderbid_pricing::{FeeSource, scan_fee_fields};
use tenderbid_shared::{
    CURRENT_SCHEMA_VERSION, CatalogEntry, DocumentRecord, FeeFields, PipelineConfig, Result,
    RunId, TenderBidError,
};

use crate::assembler::{self, Insights, ReportArtifact, ReportSink, SinkReceipt};
use crate::catalog::Catalog;
use crate::stages::{MarginPricer, MatchStage, PriceStage, TokenSetMatcher};

/// Name of the consolidated batch index written by [`BatchResult::write_index`].
pub const BATCH_INDEX_FILE: &str = "batch.json";

const KEY_LINE_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Outcome model
// ---------------------------------------------------------------------------

/// Per-document lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Fetched,
    Matched,
    Priced,
    Reported,
    Done,
    Errored,
}

impl DocumentStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Matched => "matched",
            Self::Priced => "priced",
            Self::Reported => "reported",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }

    /// Next state on the happy path; `None` for `Done` and `Errored`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Fetched => Some(Self::Matched),
            Self::Matched => Some(Self::Priced),
            Self::Priced => Some(Self::Reported),
            Self::Reported => Some(Self::Done),
            Self::Done | Self::Errored => None,
        }
    }
}

impl std::fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a document ended in `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Matching or pricing failed.
    Stage,
    /// The report could not be persisted.
    Report,
    /// The batch was cancelled before this document was dispatched.
    Cancelled,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Report => "report",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Human-readable failure record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    /// The state the document was trying to reach; `None` if never dispatched.
    pub attempted: Option<DocumentStage>,
    pub message: String,
}

impl FailureInfo {
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl std::fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

/// A successfully reported document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    pub artifact: ReportArtifact,
    pub receipt: SinkReceipt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    Success(Box<DocumentReport>),
    Failure(FailureInfo),
}

/// The result for one input document.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Position of the document in the input.
    pub index: usize,
    pub document: DocumentRecord,
    /// `Done` or `Errored`.
    pub stage: DocumentStage,
    pub result: OutcomeResult,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Success(_))
    }

    pub fn report(&self) -> Option<&DocumentReport> {
        match &self.result {
            OutcomeResult::Success(report) => Some(&**report),
            OutcomeResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        match &self.result {
            OutcomeResult::Success(_) => None,
            OutcomeResult::Failure(info) => Some(info),
        }
    }

    fn failed(index: usize, document: &DocumentRecord, info: FailureInfo) -> Self {
        Self {
            index,
            document: document.clone(),
            stage: DocumentStage::Errored,
            result: OutcomeResult::Failure(info),
        }
    }

    fn cancelled(index: usize, document: &DocumentRecord) -> Self {
        Self::failed(
            index,
            document,
            FailureInfo {
                kind: FailureKind::Cancelled,
                attempted: None,
                message: "batch cancelled before the document was dispatched".into(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Batch result
// ---------------------------------------------------------------------------

/// Ordered outcomes of one batch run.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub run_id: RunId,
    pub outcomes: Vec<PipelineOutcome>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.failure().is_some_and(|f| f.kind == FailureKind::Cancelled))
            .count()
    }

    /// Sum of `total_estimate` over all successful reports.
    pub fn total_estimate(&self) -> f64 {
        self.outcomes
            .iter()
            .filter_map(PipelineOutcome::report)
            .map(|r| r.artifact.summary.total_estimate)
            .sum()
    }

    pub fn index(&self) -> BatchIndex {
        BatchIndex {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: self.run_id.to_string(),
            started_at: self.started_at,
            elapsed_ms: self.elapsed.as_millis() as u64,
            documents: self.outcomes.len(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            total_estimate: self.total_estimate(),
            entries: self.outcomes.iter().map(BatchIndexEntry::from).collect(),
        }
    }

    /// Write `batch.json` into `dir` and return its path.
    #[instrument(skip_all, fields(run_id = %self.run_id, dir = %dir.display()))]
    pub fn write_index(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| TenderBidError::io(dir, e))?;
        let json = serde_json::to_vec_pretty(&self.index()).map_err(|e| {
            TenderBidError::validation(format!("JSON serialization failed: {e}"))
        })?;
        assembler::write_atomic(dir, BATCH_INDEX_FILE, &json)?;
        let path = dir.join(BATCH_INDEX_FILE);
        info!(path = %path.display(), "batch index written");
        Ok(path)
    }
}

/// Serialized form of a [`BatchResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchIndex {
    pub schema_version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_estimate: f64,
    pub entries: Vec<BatchIndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchIndexEntry {
    pub index: usize,
    pub document_id: String,
    pub title: String,
    pub stage: DocumentStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PipelineOutcome> for BatchIndexEntry {
    fn from(outcome: &PipelineOutcome) -> Self {
        let mut entry = Self {
            index: outcome.index,
            document_id: outcome.document.id.clone(),
            title: outcome.document.metadata.title.clone(),
            stage: outcome.stage,
            locator: None,
            line_items: None,
            total_estimate: None,
            error_code: None,
            error: None,
        };
        match &outcome.result {
            OutcomeResult::Success(report) => {
                entry.locator = Some(report.receipt.locator.clone());
                entry.line_items = Some(report.artifact.line_items.len());
                entry.total_estimate = Some(report.artifact.summary.total_estimate);
            }
            OutcomeResult::Failure(info) => {
                entry.error_code = Some(info.code().to_string());
                entry.error = Some(info.message.clone());
            }
        }
        entry
    }
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a document is dispatched.
    fn document_started(&self, index: usize, document_id: &str, total: usize);
    /// Called when a document reaches `Done` or `Errored`.
    fn document_finished(&self, outcome: &PipelineOutcome);
    /// Called when the batch completes.
    fn done(&self, result: &BatchResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_started(&self, _index: usize, _document_id: &str, _total: usize) {}
    fn document_finished(&self, _outcome: &PipelineOutcome) {}
    fn done(&self, _result: &BatchResult) {}
}

/// Batch-level cancellation signal.
///
/// Setting it stops dispatch of further documents; documents already in
/// flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The configured chain of stages plus the batch drivers.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    matcher: Arc<dyn MatchStage>,
    pricer: Arc<dyn PriceStage>,
    sink: Arc<dyn ReportSink>,
    cancel: CancelFlag,
}

impl Pipeline {
    /// Pipeline with the token-set matcher and margin pricer.
    pub fn new(config: PipelineConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            config,
            matcher: Arc::new(TokenSetMatcher),
            pricer: Arc::new(MarginPricer),
            sink,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn MatchStage>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_pricer(mut self, pricer: Arc<dyn PriceStage>) -> Self {
        self.pricer = pricer;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Process `documents` one at a time, in input order.
    ///
    /// # Errors
    /// Only batch-level problems are returned: an invalid configuration or
    /// an empty catalog / document list. Per-document failures are reported
    /// in the outcomes.
    #[instrument(skip_all, fields(documents = documents.len(), catalog = catalog.len()))]
    pub fn run_pipeline(
        &self,
        documents: &[DocumentRecord],
        catalog: &Catalog,
        fees: &dyn FeeSource,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchResult> {
        self.check_inputs(documents.len(), catalog)?;
        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, concurrency = 1, "starting batch");

        progress.phase("Processing documents");
        let total = documents.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, document) in documents.iter().enumerate() {
            if self.cancel.is_cancelled() {
                outcomes.push(PipelineOutcome::cancelled(index, document));
                continue;
            }
            progress.document_started(index, &document.id, total);
            let outcome = self.process_document(index, document, catalog.entries(), fees);
            progress.document_finished(&outcome);
            outcomes.push(outcome);
        }

        Ok(self.finish(run_id, outcomes, started_at, start, progress))
    }

    /// Process documents on the blocking pool, at most `concurrency` at a
    /// time, collecting outcomes by input index.
    #[instrument(skip_all, fields(documents = documents.len(), catalog = catalog.len(), concurrency = self.config.concurrency))]
    pub async fn run_pipeline_concurrent(
        &self,
        documents: Arc<[DocumentRecord]>,
        catalog: &Catalog,
        fees: Arc<dyn FeeSource + Send + Sync>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<BatchResult> {
        self.check_inputs(documents.len(), catalog)?;
        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, concurrency = self.config.concurrency, "starting batch");

        progress.phase("Processing documents");
        let total = documents.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency as usize));
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<PipelineOutcome>> = vec![None; total];
        let mut dispatched = vec![false; total];

        for index in 0..total {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                TenderBidError::Cancelled(format!("worker pool closed: {e}"))
            })?;
            // The flag may have been set while waiting for a free worker.
            if self.cancel.is_cancelled() {
                break;
            }

            let pipeline = self.clone();
            let documents = Arc::clone(&documents);
            let catalog = catalog.clone();
            let fees = Arc::clone(&fees);
            let progress = Arc::clone(&progress);
            dispatched[index] = true;
            join_set.spawn_blocking(move || {
                let _permit = permit;
                let document = &documents[index];
                progress.document_started(index, &document.id, total);
                let outcome =
                    pipeline.process_document(index, document, catalog.entries(), fees.as_ref());
                progress.document_finished(&outcome);
                outcome
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    let index = outcome.index;
                    slots[index] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "document task did not complete"),
            }
        }

        // A dispatched document without an outcome crashed outside the stage
        // guards; only documents never handed to a worker count as cancelled.
        let outcomes = slots
            .into_iter()
            .zip(dispatched)
            .enumerate()
            .map(|(index, (slot, dispatched))| {
                slot.unwrap_or_else(|| {
                    let document = &documents[index];
                    if !dispatched {
                        PipelineOutcome::cancelled(index, document)
                    } else {
                        PipelineOutcome::failed(
                            index,
                            document,
                            FailureInfo {
                                kind: FailureKind::Stage,
                                attempted: None,
                                message: "document task ended without an outcome".into(),
                            },
                        )
                    }
                })
            })
            .collect();

        Ok(self.finish(run_id, outcomes, started_at, start, progress.as_ref()))
    }

    fn check_inputs(&self, documents: usize, catalog: &Catalog) -> Result<()> {
        self.config.validate()?;
        if catalog.is_empty() {
            return Err(TenderBidError::input_missing("catalog is empty"));
        }
        if documents == 0 {
            return Err(TenderBidError::input_missing("no documents to process"));
        }
        Ok(())
    }

    fn finish(
        &self,
        run_id: RunId,
        outcomes: Vec<PipelineOutcome>,
        started_at: DateTime<Utc>,
        start: Instant,
        progress: &dyn ProgressReporter,
    ) -> BatchResult {
        let result = BatchResult {
            run_id,
            outcomes,
            started_at,
            elapsed: start.elapsed(),
        };
        info!(
            run_id = %result.run_id,
            succeeded = result.succeeded(),
            failed = result.failed(),
            cancelled = result.cancelled(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "batch complete"
        );
        progress.done(&result);
        result
    }

    /// Drive one document through all stages, capturing any failure.
    #[instrument(skip_all, fields(document_id = %document.id, index))]
    fn process_document(
        &self,
        index: usize,
        document: &DocumentRecord,
        catalog: &[CatalogEntry],
        fees: &dyn FeeSource,
    ) -> PipelineOutcome {
        let start = Instant::now();
        let mut stage = DocumentStage::Fetched;

        let fail = |stage: DocumentStage, kind: FailureKind, message: String| {
            let info = FailureInfo {
                kind,
                attempted: stage.next(),
                message,
            };
            warn!(
                document_id = %document.id,
                stage = %stage,
                code = info.code(),
                error = %info.message,
                "document failed"
            );
            PipelineOutcome::failed(index, document, info)
        };

        let matches = match guarded(|| {
            self.matcher
                .match_document(document, catalog, self.config.threshold)
        }) {
            Ok(matches) => matches,
            Err(msg) => return fail(stage, FailureKind::Stage, format!("matching failed: {msg}")),
        };
        stage = advance(stage);

        let priced = guarded(|| {
            let fee_fields = self.resolve_fees(document, fees);
            let items = self
                .pricer
                .price(&matches, &fee_fields, self.config.margin_pct)?;
            let summary = self.pricer.summarize(&items);
            Ok((items, summary))
        });
        let (items, summary) = match priced {
            Ok(priced) => priced,
            Err(msg) => return fail(stage, FailureKind::Stage, format!("pricing failed: {msg}")),
        };
        stage = advance(stage);

        let assembled = guarded(|| {
            let insights = self.insights(&document.raw_text);
            Ok(assembler::assemble(&items, &summary, document, insights))
        });
        let artifact = match assembled {
            Ok(artifact) => artifact,
            Err(msg) => {
                return fail(stage, FailureKind::Stage, format!("report assembly failed: {msg}"));
            }
        };
        let receipt = match guarded(|| self.sink.persist(&artifact)) {
            Ok(receipt) => receipt,
            Err(msg) => {
                return fail(stage, FailureKind::Report, format!("report not persisted: {msg}"));
            }
        };
        stage = advance(advance(stage));

        debug!(
            document_id = %document.id,
            stage = %stage,
            matches = items.len(),
            total_estimate = summary.total_estimate,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document done"
        );

        PipelineOutcome {
            index,
            document: document.clone(),
            stage,
            result: OutcomeResult::Success(Box::new(DocumentReport { artifact, receipt })),
        }
    }

    /// Fee text for one document, optionally scanned from its own text.
    fn resolve_fees(&self, document: &DocumentRecord, fees: &dyn FeeSource) -> FeeFields {
        let fields = fees.fees_for(&document.id);
        if fields.is_empty() && self.config.scan_document_fees {
            let scanned = scan_fee_fields(&document.raw_text);
            debug!(document_id = %document.id, found = !scanned.is_empty(), "scanned text for fees");
            return scanned;
        }
        fields
    }

    fn insights(&self, text: &str) -> Option<Insights> {
        if self.config.keyword_count == 0 {
            return None;
        }
        Some(Insights {
            keywords: top_keywords(text, self.config.keyword_count),
            key_lines: key_lines(text, KEY_LINE_LIMIT),
        })
    }
}

fn advance(stage: DocumentStage) -> DocumentStage {
    stage.next().unwrap_or(stage)
}

/// Run a stage, turning both errors and panics into a message.
fn guarded<T>(stage: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match catch_unwind(AssertUnwindSafe(stage)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("stage panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("stage panicked: {msg}")
    } else {
        "stage panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::assembler::{FsReportSink, MemorySink, SinkStatus};
    use tenderbid_shared::Match;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            CatalogEntry::new("Steel Pipe", "Pipes", 100.0),
            CatalogEntry::new("Office Chair", "Furniture", 75.0),
        ])
    }

    fn documents() -> Vec<DocumentRecord> {
        vec![
            DocumentRecord::new("t1", "We require Steel Pipe urgently"),
            DocumentRecord::new("t2", "Supply of office chairs and steel pipe"),
            DocumentRecord::new("t3", "Office Chair, ergonomic, 40 units"),
        ]
    }

    fn fees() -> HashMap<String, FeeFields> {
        HashMap::from([(
            "t1".to_string(),
            FeeFields::new("Rs. 500/-", "Rs. 1,000/-"),
        )])
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    /// Fails (or panics) for one document id, delegates otherwise.
    struct FailingMatcher {
        fail_on: &'static str,
        panic: bool,
    }

    impl MatchStage for FailingMatcher {
        fn match_document<'c>(
            &self,
            document: &DocumentRecord,
            catalog: &'c [CatalogEntry],
            threshold: u8,
        ) -> Result<Vec<Match<'c>>> {
            if document.id == self.fail_on {
                if self.panic {
                    panic!("tokenizer blew up");
                }
                return Err(TenderBidError::Matching("corrupt text".into()));
            }
            TokenSetMatcher.match_document(document, catalog, threshold)
        }
    }

    /// Cancels the batch while the first document is being matched.
    struct CancellingMatcher {
        flag: CancelFlag,
    }

    impl MatchStage for CancellingMatcher {
        fn match_document<'c>(
            &self,
            document: &DocumentRecord,
            catalog: &'c [CatalogEntry],
            threshold: u8,
        ) -> Result<Vec<Match<'c>>> {
            self.flag.cancel();
            TokenSetMatcher.match_document(document, catalog, threshold)
        }
    }

    /// Panics while looking up fees for one document id.
    struct PanickingFees {
        panic_on: &'static str,
    }

    impl FeeSource for PanickingFees {
        fn fees_for(&self, document_id: &str) -> FeeFields {
            if document_id == self.panic_on {
                panic!("fee sheet row is garbled");
            }
            FeeFields::default()
        }
    }

    struct BrokenSink;

    impl ReportSink for BrokenSink {
        fn persist(&self, _artifact: &ReportArtifact) -> Result<SinkReceipt> {
            Err(TenderBidError::Persistence("disk full".into()))
        }
    }

    /// Cancels the batch, then panics outside the stage guards, when the
    /// given document starts.
    struct CrashingProgress {
        crash_on: usize,
        flag: CancelFlag,
    }

    impl ProgressReporter for CrashingProgress {
        fn phase(&self, _name: &str) {}
        fn document_started(&self, index: usize, _document_id: &str, _total: usize) {
            if index == self.crash_on {
                self.flag.cancel();
                panic!("progress bar crashed");
            }
        }
        fn document_finished(&self, _outcome: &PipelineOutcome) {}
        fn done(&self, _result: &BatchResult) {}
    }

    #[derive(Default)]
    struct RecordingProgress {
        finished: Mutex<Vec<usize>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, _name: &str) {}
        fn document_started(&self, _index: usize, _document_id: &str, _total: usize) {}
        fn document_finished(&self, outcome: &PipelineOutcome) {
            self.finished.lock().unwrap().push(outcome.index);
        }
        fn done(&self, _result: &BatchResult) {}
    }

    #[test]
    fn end_to_end_scenario() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = Pipeline::new(config(), sink.clone());
        let catalog = Catalog::new(vec![CatalogEntry::new("Steel Pipe", "Pipes", 100.0)]);
        let docs = vec![DocumentRecord::new("t1", "We require Steel Pipe urgently")];

        let result = pipeline
            .run_pipeline(&docs, &catalog, &fees(), &SilentProgress)
            .unwrap();
        assert_eq!(result.outcomes.len(), 1);

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.stage, DocumentStage::Done);
        let report = outcome.report().unwrap();
        let line = &report.artifact.line_items[0];
        assert!(line.score >= 90);
        assert!((line.bid_price - 110.0).abs() < 1e-9);
        assert_eq!(line.tender_fee, 500.0);
        assert_eq!(line.emd, 1000.0);
        assert!((line.total_estimate - 1610.0).abs() < 1e-9);
        assert_eq!(report.artifact.summary.item_count, 1);
        assert_eq!(report.receipt.status, SinkStatus::Buffered);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn failing_document_is_isolated() {
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new())).with_matcher(
            Arc::new(FailingMatcher {
                fail_on: "t2",
                panic: false,
            }),
        );

        let result = pipeline
            .run_pipeline(&documents(), &catalog(), &fees(), &SilentProgress)
            .unwrap();

        assert_eq!(result.outcomes.len(), 3);
        let ids: Vec<_> = result.outcomes.iter().map(|o| o.document.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t2", "t3"]);
        assert!(result.outcomes[0].is_success());
        assert!(result.outcomes[2].is_success());

        let failure = result.outcomes[1].failure().unwrap();
        assert_eq!(failure.code(), "stage");
        assert_eq!(failure.attempted, Some(DocumentStage::Matched));
        assert!(failure.message.contains("corrupt text"));
        assert_eq!(result.outcomes[1].stage, DocumentStage::Errored);
        assert_eq!((result.succeeded(), result.failed()), (2, 1));
    }

    #[test]
    fn panicking_stage_is_captured() {
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new())).with_matcher(
            Arc::new(FailingMatcher {
                fail_on: "t1",
                panic: true,
            }),
        );

        let result = pipeline
            .run_pipeline(&documents(), &catalog(), &fees(), &SilentProgress)
            .unwrap();
        let failure = result.outcomes[0].failure().unwrap();
        assert!(failure.message.contains("tokenizer blew up"));
        assert_eq!(result.succeeded(), 2);
    }

    #[test]
    fn fee_lookup_panic_fails_only_that_document() {
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new()));
        let fees = PanickingFees { panic_on: "t2" };

        let result = pipeline
            .run_pipeline(&documents(), &catalog(), &fees, &SilentProgress)
            .unwrap();

        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes[0].is_success());
        assert!(result.outcomes[2].is_success());
        let failure = result.outcomes[1].failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Stage);
        assert_eq!(failure.attempted, Some(DocumentStage::Priced));
        assert!(failure.message.contains("fee sheet row is garbled"));
    }

    #[test]
    fn no_matches_is_success_with_zero_totals() {
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new()));
        let docs = vec![DocumentRecord::new("t9", "Catering services for canteen")];
        let result = pipeline
            .run_pipeline(&docs, &catalog(), &fees(), &SilentProgress)
            .unwrap();

        let report = result.outcomes[0].report().unwrap();
        assert!(report.artifact.line_items.is_empty());
        assert_eq!(report.artifact.summary.total_estimate, 0.0);
    }

    #[test]
    fn persistence_failure_is_tagged_report() {
        let pipeline = Pipeline::new(config(), Arc::new(BrokenSink));
        let result = pipeline
            .run_pipeline(&documents(), &catalog(), &fees(), &SilentProgress)
            .unwrap();

        assert_eq!(result.failed(), 3);
        let failure = result.outcomes[0].failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Report);
        assert_eq!(failure.code(), "report");
        assert_eq!(failure.attempted, Some(DocumentStage::Reported));
        assert!(failure.message.contains("disk full"));
    }

    #[test]
    fn missing_inputs_are_errors() {
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new()));
        let err = pipeline
            .run_pipeline(&documents(), &Catalog::default(), &fees(), &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, TenderBidError::InputMissing { .. }));

        let err = pipeline
            .run_pipeline(&[], &catalog(), &fees(), &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, TenderBidError::InputMissing { .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = config();
        cfg.margin_pct = -5.0;
        let pipeline = Pipeline::new(cfg, Arc::new(MemorySink::new()));
        let err = pipeline
            .run_pipeline(&documents(), &catalog(), &fees(), &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, TenderBidError::Config { .. }));
    }

    #[test]
    fn scanned_fees_fill_missing_lookup_entries() {
        let mut cfg = config();
        cfg.scan_document_fees = true;
        let pipeline = Pipeline::new(cfg, Arc::new(MemorySink::new()));
        let docs = vec![DocumentRecord::new(
            "t5",
            "Steel Pipe supply\nTender Fee: Rs. 250/-\nEMD: Rs. 2,000/-",
        )];

        let result = pipeline
            .run_pipeline(&docs, &catalog(), &fees(), &SilentProgress)
            .unwrap();
        let line = &result.outcomes[0].report().unwrap().artifact.line_items[0];
        assert_eq!(line.tender_fee, 250.0);
        assert_eq!(line.emd, 2000.0);
    }

    #[test]
    fn sequential_cancellation_keeps_one_outcome_per_document() {
        let flag = CancelFlag::new();
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new()))
            .with_matcher(Arc::new(CancellingMatcher { flag: flag.clone() }))
            .with_cancel_flag(flag);

        let result = pipeline
            .run_pipeline(&documents(), &catalog(), &fees(), &SilentProgress)
            .unwrap();
        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes[0].is_success());
        assert_eq!(result.cancelled(), 2);
        assert_eq!(
            result.outcomes[2].failure().map(FailureInfo::code),
            Some("cancelled")
        );
    }

    #[tokio::test]
    async fn concurrent_run_preserves_input_order() {
        let mut cfg = config();
        cfg.concurrency = 4;
        let pipeline = Pipeline::new(cfg, Arc::new(MemorySink::new())).with_matcher(Arc::new(
            FailingMatcher {
                fail_on: "t2",
                panic: false,
            },
        ));

        let docs: Vec<DocumentRecord> = (0..20)
            .map(|i| DocumentRecord::new(format!("t{i}"), "steel pipe and office chair"))
            .collect();
        let progress = Arc::new(RecordingProgress::default());

        let result = pipeline
            .run_pipeline_concurrent(docs.into(), &catalog(), Arc::new(fees()), progress.clone())
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 20);
        for (i, outcome) in result.outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.document.id, format!("t{i}"));
        }
        assert_eq!(result.failed(), 1);
        assert!(!result.outcomes[2].is_success());
        assert_eq!(progress.finished.lock().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn concurrent_cancellation_stops_dispatch() {
        let flag = CancelFlag::new();
        let pipeline = Pipeline::new(config(), Arc::new(MemorySink::new()))
            .with_matcher(Arc::new(CancellingMatcher { flag: flag.clone() }))
            .with_cancel_flag(flag);

        let result = pipeline
            .run_pipeline_concurrent(
                documents().into(),
                &catalog(),
                Arc::new(fees()),
                Arc::new(SilentProgress),
            )
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes[0].is_success());
        assert!(result.outcomes[1..].iter().all(|o| {
            o.failure().is_some_and(|f| f.kind == FailureKind::Cancelled)
        }));
    }

    #[tokio::test]
    async fn crashed_worker_is_a_stage_failure_not_cancelled() {
        let flag = CancelFlag::new();
        let mut cfg = config();
        cfg.concurrency = 1;
        let pipeline =
            Pipeline::new(cfg, Arc::new(MemorySink::new())).with_cancel_flag(flag.clone());
        let progress = Arc::new(CrashingProgress { crash_on: 1, flag });

        let result = pipeline
            .run_pipeline_concurrent(documents().into(), &catalog(), Arc::new(fees()), progress)
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes[0].is_success());
        let crashed = result.outcomes[1].failure().unwrap();
        assert_eq!(crashed.kind, FailureKind::Stage);
        assert_eq!(result.outcomes[1].stage, DocumentStage::Errored);
        assert_eq!(
            result.outcomes[2].failure().map(|f| f.kind),
            Some(FailureKind::Cancelled)
        );
    }

    #[test]
    fn batch_index_is_written() {
        let root = std::env::temp_dir().join(format!(
            "tenderbid-pipeline-test-{}",
            uuid::Uuid::now_v7()
        ));
        let pipeline = Pipeline::new(config(), Arc::new(FsReportSink::new(&root))).with_matcher(
            Arc::new(FailingMatcher {
                fail_on: "t3",
                panic: false,
            }),
        );

        let result = pipeline
            .run_pipeline(&documents(), &catalog(), &fees(), &SilentProgress)
            .unwrap();
        let path = result.write_index(&root).unwrap();

        let index: BatchIndex =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(index.run_id, result.run_id.to_string());
        assert_eq!(index.documents, 3);
        assert_eq!(index.succeeded, 2);
        assert!(index.entries[0].locator.as_deref().unwrap().ends_with("report.json"));
        assert_eq!(index.entries[2].error_code.as_deref(), Some("stage"));
        assert!(std::path::Path::new(index.entries[0].locator.as_deref().unwrap()).exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fixture_batch() {
        let catalog =
            Catalog::from_csv_path(Path::new("../../../fixtures/csv/products.csv")).unwrap();
        let sheet = Path::new("../../../fixtures/csv/parsed_rfps.csv");
        let docs = crate::inputs::load_documents_csv(sheet).unwrap();
        let fees = crate::inputs::FeeLookup::from_csv_path(sheet).unwrap();

        let result = Pipeline::new(config(), Arc::new(MemorySink::new()))
            .run_pipeline(&docs, &catalog, &fees, &SilentProgress)
            .unwrap();
        assert_eq!(result.succeeded(), 3);

        let first = &result.outcomes[0].report().unwrap().artifact;
        let products: Vec<_> = first.line_items.iter().map(|l| l.product.as_str()).collect();
        assert_eq!(products, ["Steel Pipe", "Gate Valve"]);
        assert!((first.line_items[0].total_estimate - 1610.0).abs() < 1e-9);
        assert!(first.insights.as_ref().is_some_and(|i| !i.keywords.is_empty()));

        let third = &result.outcomes[2].report().unwrap().artifact;
        assert!(third.line_items.is_empty());
    }

    #[test]
    fn stage_machine_order() {
        let mut stage = DocumentStage::Fetched;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(
            seen,
            [
                DocumentStage::Fetched,
                DocumentStage::Matched,
                DocumentStage::Priced,
                DocumentStage::Reported,
                DocumentStage::Done,
            ]
        );
        assert_eq!(DocumentStage::Errored.next(), None);
    }
}
