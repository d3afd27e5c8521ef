//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::analysis::SortKey;

/// AvsLens - restaking AVS relationship aggregator
///
/// Fetches AVS/operator/strategy relationships from the upstream API,
/// deduplicates them and exports per-AVS aggregates.
///
/// Examples:
///   avslens --api-url https://api.example.org/relationships
///   avslens --avs 0x870679e138bcdf293b7ff14dd44b70fc97e12fc0 --format markdown
///   avslens --format json -o aggregates.json --sort-by total-usd
///   avslens --watch 300 -o aggregates.csv
///   avslens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the relationship API
    #[arg(long, value_name = "URL", env = "AVSLENS_API_URL")]
    pub api_url: Option<String>,

    /// Fetch a single AVS instead of the date window
    #[arg(long, value_name = "ID")]
    pub avs: Option<String>,

    /// Start of the query window (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_start: Option<String>,

    /// End of the query window (YYYY-MM-DD, default: today)
    #[arg(long, value_name = "DATE")]
    pub date_end: Option<String>,

    /// Output format (csv, json, markdown)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Sort aggregates by this key, descending
    #[arg(long, value_name = "KEY")]
    pub sort_by: Option<SortKey>,

    /// Only export AVS whose address contains this text
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Breakdown entries per AVS in the Markdown report (0 disables)
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Maximum per-AVS requests in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Refresh every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .avslens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress bar)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .avslens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the export.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CSV, one row per AVS (default)
    #[default]
    Csv,
    /// JSON with aggregates and diagnostics
    Json,
    /// Markdown summary with breakdowns
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref avs) = self.avs {
            if avs.trim().is_empty() {
                return Err("AVS id must not be empty".to_string());
            }
        }

        for (flag, value) in [("--date-start", &self.date_start), ("--date-end", &self.date_end)] {
            if let Some(date) = value {
                if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err(format!("{} must be a YYYY-MM-DD date, got '{}'", flag, date));
                }
            }
        }

        if let (Some(start), Some(end)) = (&self.date_start, &self.date_end) {
            if start > end {
                return Err("--date-start must not be after --date-end".to_string());
            }
        }

        // Validate concurrency
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.watch == Some(0) {
            return Err("Watch interval must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
