//! Catalog store, input loaders, report assembly, and batch orchestration
//! for TenderBid.
//!
//! This crate ties the matching and pricing engines together into the
//! per-document pipeline (`Pipeline::run_pipeline`).

pub mod assembler;
pub mod catalog;
pub mod inputs;
pub mod pipeline;
mod sheet;
pub mod stages;

pub use catalog::Catalog;
pub use inputs::{FeeLookup, document_id_from_url, documents_from_reader, load_documents_csv};
pub use pipeline::{
    BatchResult, CancelFlag, Pipeline, PipelineOutcome, ProgressReporter, SilentProgress,
};
