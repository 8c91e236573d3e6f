//! Application configuration for TenderBid.
//!
//! User config lives at `~/.tenderbid/tenderbid.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderBidError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderbid.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderbid";

// ---------------------------------------------------------------------------
// Config structs (matching tenderbid.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Matching engine settings.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Pricing engine settings.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Report output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[matching]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum token-set score (0-100) for a match to be kept.
    #[serde(default = "default_threshold")]
    pub threshold: u8,

    /// Number of top keywords rendered in each report's insights.
    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            keyword_count: default_keyword_count(),
        }
    }
}

fn default_threshold() -> u8 {
    40
}
fn default_keyword_count() -> usize {
    10
}

/// `[pricing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Markup over base price, in percent.
    #[serde(default = "default_margin_pct")]
    pub margin_pct: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            margin_pct: default_margin_pct(),
        }
    }
}

fn default_margin_pct() -> f64 {
    10.0
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Documents processed in parallel. `1` keeps the run strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Scan document text for fee labels when the fee lookup has no entry.
    #[serde(default)]
    pub scan_document_fees: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            scan_document_fees: false,
        }
    }
}

fn default_concurrency() -> u32 {
    1
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory that receives per-document reports and `batch.json`.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "var/reports".into()
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Minimum score for a match to survive.
    pub threshold: u8,
    /// Markup percentage applied to base prices.
    pub margin_pct: f64,
    /// Maximum documents in flight.
    pub concurrency: u32,
    /// Top keywords per report (0 disables the insights section).
    pub keyword_count: usize,
    /// Fall back to scanning document text for fee labels.
    pub scan_document_fees: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            threshold: config.matching.threshold,
            margin_pct: config.pricing.margin_pct,
            concurrency: config.pipeline.concurrency,
            keyword_count: config.matching.keyword_count,
            scan_document_fees: config.pipeline.scan_document_fees,
        }
    }
}

impl PipelineConfig {
    /// Reject values no run can be meaningfully performed with.
    pub fn validate(&self) -> Result<()> {
        if self.threshold > 100 {
            return Err(TenderBidError::config(format!(
                "threshold must be within 0..=100, got {}",
                self.threshold
            )));
        }
        if !self.margin_pct.is_finite() || self.margin_pct < 0.0 {
            return Err(TenderBidError::config(format!(
                "margin_pct must be a finite number >= 0, got {}",
                self.margin_pct
            )));
        }
        if self.concurrency == 0 {
            return Err(TenderBidError::config("concurrency must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderbid/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderBidError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderbid/tenderbid.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderBidError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TenderBidError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderBidError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderBidError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderBidError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("threshold = 40"));
        assert!(toml_str.contains("margin_pct"));
        assert!(toml_str.contains("var/reports"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.matching.threshold, 40);
        assert_eq!(parsed.pricing.margin_pct, 10.0);
        assert_eq!(parsed.pipeline.concurrency, 1);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[pricing]
margin_pct = 15.5

[pipeline]
concurrency = 4
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pricing.margin_pct, 15.5);
        assert_eq!(config.pipeline.concurrency, 4);
        assert!(!config.pipeline.scan_document_fees);
        assert_eq!(config.matching.threshold, 40);
        assert_eq!(config.output.dir, "var/reports");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.threshold, 40);
        assert_eq!(pipeline.margin_pct, 10.0);
        assert_eq!(pipeline.concurrency, 1);
        assert_eq!(pipeline.keyword_count, 10);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn pipeline_config_validation() {
        let mut config = PipelineConfig::default();
        config.margin_pct = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("margin_pct"));

        let mut config = PipelineConfig::default();
        config.threshold = 101;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.margin_pct = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_from_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("tenderbid-definitely-missing.toml");
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, TenderBidError::Io { .. }));
    }
}
