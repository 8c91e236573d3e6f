//! Error types for TenderBid.
//!
//! Library crates use [`TenderBidError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all TenderBid operations.
#[derive(Debug, thiserror::Error)]
pub enum TenderBidError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required input collection (catalog, documents) is absent or empty.
    #[error("input missing: {message}")]
    InputMissing { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed input sheet (CSV structure, bad header, etc.).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (invalid record, schema mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Failure inside the matching stage for one document.
    #[error("matching error: {0}")]
    Matching(String),

    /// Failure inside the pricing stage for one document.
    #[error("pricing error: {0}")]
    Pricing(String),

    /// The report sink could not persist an artifact.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The batch was cancelled before this work was dispatched.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderBidError>;

impl TenderBidError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input-missing error from any displayable message.
    pub fn input_missing(msg: impl Into<String>) -> Self {
        Self::InputMissing {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
