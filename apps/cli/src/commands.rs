//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use tenderbid_core::assembler::{FsReportSink, MemorySink, ReportSink};
use tenderbid_core::pipeline::{BatchResult, OutcomeResult, PipelineOutcome, ProgressReporter};
use tenderbid_core::stages::{MatchStage, TokenSetMatcher};
use tenderbid_core::{CancelFlag, Catalog, FeeLookup, Pipeline, load_documents_csv};
use tenderbid_shared::{AppConfig, DocumentRecord, PipelineConfig, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TenderBid: priced product matches for tender documents.
#[derive(Parser)]
#[command(
    name = "tenderbid",
    version,
    about = "Match tender documents against a product catalog and build priced bid reports.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Match, price, and report every document in a parsed-tender sheet.
    Run {
        /// Products sheet (Product_Name, Category, Base_Price).
        #[arg(long)]
        catalog: PathBuf,

        /// Parsed-tender sheet (Filename, Extracted_Text, ...).
        #[arg(long)]
        documents: PathBuf,

        /// Separate fee sheet (Filename, Tender_Fee, EMD). Defaults to the
        /// fee columns of the documents sheet.
        #[arg(long)]
        fees: Option<PathBuf>,

        /// Report output directory (defaults to `[output] dir` from config).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Minimum match score, 0-100.
        #[arg(long)]
        threshold: Option<u8>,

        /// Margin over base price, in percent.
        #[arg(long)]
        margin: Option<f64>,

        /// Documents processed in parallel.
        #[arg(long)]
        concurrency: Option<u32>,

        /// Scan document text for fee labels when the fee sheet has none.
        #[arg(long)]
        scan_fees: bool,

        /// Build reports in memory without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print catalog matches per document without pricing.
    Match {
        /// Products sheet (Product_Name, Category, Base_Price).
        #[arg(long)]
        catalog: PathBuf,

        /// Parsed-tender sheet (Filename, Extracted_Text, ...).
        #[arg(long)]
        documents: PathBuf,

        /// Minimum match score, 0-100.
        #[arg(long)]
        threshold: Option<u8>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Flags of `tenderbid run`.
struct RunArgs {
    catalog: PathBuf,
    documents: PathBuf,
    fees: Option<PathBuf>,
    out: Option<PathBuf>,
    threshold: Option<u8>,
    margin: Option<f64>,
    concurrency: Option<u32>,
    scan_fees: bool,
    dry_run: bool,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tenderbid=info",
        1 => "tenderbid=debug",
        _ => "tenderbid=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            catalog,
            documents,
            fees,
            out,
            threshold,
            margin,
            concurrency,
            scan_fees,
            dry_run,
        } => {
            cmd_run(RunArgs {
                catalog,
                documents,
                fees,
                out,
                threshold,
                margin,
                concurrency,
                scan_fees,
                dry_run,
            })
            .await
        }
        Command::Match {
            catalog,
            documents,
            threshold,
        } => cmd_match(&catalog, &documents, threshold).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let pipeline_config = resolve_pipeline_config(&config, &args)?;

    let catalog = Catalog::from_csv_path(&args.catalog)?;
    let documents = load_documents_csv(&args.documents)?;
    let fee_sheet = args.fees.as_deref().unwrap_or(&args.documents);
    let fees = FeeLookup::from_csv_path(fee_sheet)?;

    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.dir));
    let sink: Arc<dyn ReportSink> = if args.dry_run {
        Arc::new(MemorySink::new())
    } else {
        Arc::new(FsReportSink::new(&out_dir))
    };

    info!(
        catalog = catalog.len(),
        documents = documents.len(),
        fee_entries = fees.len(),
        threshold = pipeline_config.threshold,
        margin_pct = pipeline_config.margin_pct,
        concurrency = pipeline_config.concurrency,
        dry_run = args.dry_run,
        "starting run"
    );

    let cancel = CancelFlag::new();
    spawn_ctrl_c_handler(cancel.clone());

    let concurrency = pipeline_config.concurrency;
    let pipeline = Pipeline::new(pipeline_config, sink).with_cancel_flag(cancel);
    let progress = Arc::new(CliProgress::new(documents.len())?);

    let result = if concurrency > 1 {
        pipeline
            .run_pipeline_concurrent(documents.into(), &catalog, Arc::new(fees), progress)
            .await?
    } else {
        pipeline.run_pipeline(&documents, &catalog, &fees, progress.as_ref())?
    };

    print_batch(&result);

    if args.dry_run {
        println!("  Dry run: nothing written.");
    } else {
        let index = result.write_index(&out_dir)?;
        println!("  Index:  {}", index.display());
    }
    println!();

    if result.succeeded() == 0 {
        return Err(eyre!("no document produced a report"));
    }
    Ok(())
}

async fn cmd_match(catalog: &Path, documents: &Path, threshold: Option<u8>) -> Result<()> {
    let config = load_config()?;
    let threshold = threshold.unwrap_or(config.matching.threshold);
    if threshold > 100 {
        return Err(eyre!("threshold must be within 0..=100, got {threshold}"));
    }

    let catalog = Catalog::from_csv_path(catalog)?;
    let documents = load_documents_csv(documents)?;

    println!("document\tproduct\tscore");
    for document in &documents {
        let result = TokenSetMatcher.match_document(document, catalog.entries(), threshold);
        let mut matches = match result {
            Ok(matches) => matches,
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "skipping document");
                continue;
            }
        };
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        for m in &matches {
            println!("{}\t{}\t{}", document.id, m.entry.name, m.score);
        }
    }

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config file created at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config file values, overridden by flags, then validated.
fn resolve_pipeline_config(config: &AppConfig, args: &RunArgs) -> Result<PipelineConfig> {
    let mut resolved = PipelineConfig::from(config);
    if let Some(threshold) = args.threshold {
        resolved.threshold = threshold;
    }
    if let Some(margin) = args.margin {
        resolved.margin_pct = margin;
    }
    if let Some(concurrency) = args.concurrency {
        resolved.concurrency = concurrency;
    }
    if args.scan_fees {
        resolved.scan_document_fees = true;
    }
    resolved.validate()?;
    Ok(resolved)
}

/// First Ctrl-C stops dispatch; in-flight documents still finish.
fn spawn_ctrl_c_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight documents");
            cancel.cancel();
        }
    });
}

fn print_batch(result: &BatchResult) {
    println!();
    println!("  Run:    {}", result.run_id);
    println!(
        "  Done:   {} succeeded, {} failed ({} cancelled) in {:.1}s",
        result.succeeded(),
        result.failed(),
        result.cancelled(),
        result.elapsed.as_secs_f64()
    );
    println!("  Total:  {:.2}", result.total_estimate());
    println!();
    for outcome in &result.outcomes {
        println!("  {}", outcome_line(outcome));
    }
    println!();
}

fn outcome_line(outcome: &PipelineOutcome) -> String {
    match &outcome.result {
        OutcomeResult::Success(report) => format!(
            "ok     {:<32} {:>3} items  {:>12.2}  {}",
            outcome.document.id,
            report.artifact.summary.item_count,
            report.artifact.summary.total_estimate,
            report.receipt.locator
        ),
        OutcomeResult::Failure(info) => {
            format!("failed {:<32} {info}", display_id(&outcome.document))
        }
    }
}

fn display_id(document: &DocumentRecord) -> &str {
    if document.id.is_empty() {
        "<no id>"
    } else {
        &document.id
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .map_err(|e| eyre!("invalid progress template: {e}"))?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { bar })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn document_started(&self, index: usize, document_id: &str, total: usize) {
        self.bar
            .set_message(format!("[{}/{total}] {document_id}", index + 1));
    }

    fn document_finished(&self, outcome: &PipelineOutcome) {
        if let Some(failure) = outcome.failure() {
            self.bar
                .println(format!("  failed {}: {failure}", display_id(&outcome.document)));
        }
        self.bar.inc(1);
    }

    fn done(&self, _result: &BatchResult) {
        self.bar.finish_and_clear();
    }
}
