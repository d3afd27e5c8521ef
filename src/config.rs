//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.avslens.toml` files.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::SortKey;
use crate::cli::OutputFormat;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".avslens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Upstream API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Periodic refresh settings.
    #[serde(default)]
    pub watch: WatchConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output file path. Stdout when unset.
    #[serde(default)]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Upstream API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the relationship API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Start of the initial query window (YYYY-MM-DD).
    #[serde(default = "default_date_start")]
    pub date_start: String,

    /// End of the initial query window. Today (UTC) when unset.
    #[serde(default)]
    pub date_end: Option<String>,

    /// Request timeout in seconds. The transport default applies when unset.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Maximum per-AVS requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            date_start: default_date_start(),
            date_end: None,
            timeout_seconds: None,
            concurrency: default_concurrency(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/relationships".to_string()
}

fn default_date_start() -> String {
    "2023-01-01".to_string()
}

fn default_concurrency() -> usize {
    1
}

impl ApiConfig {
    /// The configured window end, or today.
    pub fn effective_date_end(&self) -> String {
        self.date_end
            .clone()
            .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string())
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Export format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Aggregate sort order.
    #[serde(default)]
    pub sort_by: SortKey,

    /// Breakdown entries per AVS in the Markdown report. 0 disables them.
    #[serde(default = "default_top")]
    pub top: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            sort_by: SortKey::default(),
            top: default_top(),
        }
    }
}

fn default_top() -> usize {
    5
}

/// Periodic refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between refresh cycles in watch mode.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
        }
    }
}

fn default_interval() -> u64 {
    300
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.avslens.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(ref start) = args.date_start {
            self.api.date_start = start.clone();
        }
        if let Some(ref end) = args.date_end {
            self.api.date_end = Some(end.clone());
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = Some(timeout);
        }
        if let Some(concurrency) = args.concurrency {
            self.api.concurrency = concurrency;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(sort_by) = args.sort_by {
            self.report.sort_by = sort_by;
        }
        if let Some(top) = args.top {
            self.report.top = top;
        }

        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if let Some(interval) = args.watch {
            self.watch.interval_seconds = interval;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
