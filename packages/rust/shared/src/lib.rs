//! Shared types, error model, and configuration for TenderBid.
//!
//! This crate is the foundation depended on by all other TenderBid crates.
//! It provides:
//! - [`TenderBidError`]: the unified error type
//! - Domain types ([`CatalogEntry`], [`DocumentRecord`], [`Match`], [`PricedItem`], [`BidSummary`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, MatchingConfig, OutputConfig, PipelineConfig, PipelineSection, PricingConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, TenderBidError};
pub use types::{
    BidSummary, CURRENT_SCHEMA_VERSION, CatalogEntry, DocumentMeta, DocumentRecord, FeeFields,
    Match, PricedItem, RunId,
};
