//! Configuration file support for HMPI
//!
//! Loads deployment-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.hmpirc.json` in the working directory
//! 3. `hmpi.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::alert::AlertOptions;
use crate::ingest::IngestMode;
use crate::model::{StandardTable, Standards};
use crate::risk::RiskThresholds;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file names probed by `discover_config`, in priority order
pub const CONFIG_FILE_NAMES: &[&str] = &[".hmpirc.json", "hmpi.config.json"];

/// HMPI configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HmpiConfig {
    /// Custom risk band lower bounds
    #[serde(default)]
    pub thresholds: Option<ThresholdConfig>,

    /// Index above which a low-severity alert is raised (default: disabled)
    #[serde(default)]
    pub caution_index: Option<f64>,

    /// Overrides merged over the built-in WHO and BBI tables
    #[serde(default)]
    pub standards: Option<Standards>,

    /// Reject records with missing numeric fields (default: false)
    #[serde(default)]
    pub strict_ingest: Option<bool>,

    /// Maximum number of rows in text reports
    #[serde(default)]
    pub top: Option<usize>,
}

/// Custom risk band lower bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Lower bound of Low Risk (default: 10)
    pub low: Option<f64>,
    /// Lower bound of Moderate Risk (default: 25)
    pub moderate: Option<f64>,
    /// Lower bound of High Risk (default: 50)
    pub high: Option<f64>,
    /// Lower bound of Very High Risk (default: 100)
    pub very_high: Option<f64>,
}

impl ThresholdConfig {
    fn to_thresholds(&self) -> RiskThresholds {
        let defaults = RiskThresholds::default();
        RiskThresholds {
            low: self.low.unwrap_or(defaults.low),
            moderate: self.moderate.unwrap_or(defaults.moderate),
            high: self.high.unwrap_or(defaults.high),
            very_high: self.very_high.unwrap_or(defaults.very_high),
        }
    }
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub risk_thresholds: RiskThresholds,
    pub caution_index: Option<f64>,
    /// Reference tables with overrides applied
    pub standards: Standards,
    /// Overrides exactly as configured
    pub standard_overrides: Standards,
    pub ingest_mode: IngestMode,
    pub top_n: Option<usize>,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl HmpiConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref t) = self.thresholds {
            let resolved = t.to_thresholds();
            let bands = [
                ("low", resolved.low),
                ("moderate", resolved.moderate),
                ("high", resolved.high),
                ("very_high", resolved.very_high),
            ];

            for (name, value) in bands {
                if !value.is_finite() || value <= 0.0 {
                    anyhow::bail!("thresholds.{} must be positive (got {})", name, value);
                }
            }
            for pair in bands.windows(2) {
                let (lower_name, lower) = pair[0];
                let (upper_name, upper) = pair[1];
                if lower >= upper {
                    anyhow::bail!(
                        "thresholds.{} ({}) must be less than thresholds.{} ({})",
                        lower_name,
                        lower,
                        upper_name,
                        upper
                    );
                }
            }
        }

        if let Some(caution) = self.caution_index {
            if !caution.is_finite() || caution <= 0.0 {
                anyhow::bail!("caution_index must be positive (got {})", caution);
            }
        }

        if let Some(ref standards) = self.standards {
            validate_table("WHO", &standards.who)?;
            validate_table("BBI", &standards.bbi)?;
        }

        if self.top == Some(0) {
            anyhow::bail!("top must be at least 1");
        }

        Ok(())
    }

    /// Resolve config into the form used by the engine
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let risk_thresholds = match &self.thresholds {
            Some(t) => t.to_thresholds(),
            None => RiskThresholds::default(),
        };

        let standard_overrides = self.standards.clone().unwrap_or_default();
        let standards = Standards::reference().merged_with(&standard_overrides);

        let ingest_mode = if self.strict_ingest.unwrap_or(false) {
            IngestMode::Strict
        } else {
            IngestMode::Lenient
        };

        Ok(ResolvedConfig {
            risk_thresholds,
            caution_index: self.caution_index,
            standards,
            standard_overrides,
            ingest_mode,
            top_n: self.top,
            config_path: None,
        })
    }
}

fn validate_table(authority: &str, table: &StandardTable) -> Result<()> {
    for (metal, limit) in table.iter() {
        if metal.trim().is_empty() {
            anyhow::bail!("standards.{} contains an empty metal name", authority);
        }
        if !limit.is_finite() || limit <= 0.0 {
            anyhow::bail!(
                "standards.{}.{} must be positive (got {})",
                authority,
                metal,
                limit
            );
        }
    }
    Ok(())
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        HmpiConfig::default().resolve()
    }

    /// Reference tables, then data-supplied limits, then configured overrides
    pub fn standards_with(&self, data_overrides: Option<&Standards>) -> Standards {
        match data_overrides {
            Some(data) => Standards::reference()
                .merged_with(data)
                .merged_with(&self.standard_overrides),
            None => self.standards.clone(),
        }
    }

    pub fn alert_options(&self) -> AlertOptions {
        AlertOptions {
            caution_index: self.caution_index,
        }
    }
}

/// Discover and load a config file from a directory
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(dir: &Path) -> Result<Option<(HmpiConfig, PathBuf)>> {
    for name in CONFIG_FILE_NAMES {
        let path = dir.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<HmpiConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: HmpiConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `dir`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(dir: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(dir)? {
            Some((config, path)) => (config, Some(path)),
            None => (HmpiConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    tracing::debug!(
        config = ?resolved.config_path,
        strict = resolved.ingest_mode == IngestMode::Strict,
        "resolved configuration"
    );
    Ok(resolved)
}
