//! AvsLens - restaking AVS relationship aggregator
//!
//! A CLI tool that fetches AVS/operator/strategy relationships from the
//! upstream API, deduplicates them, aggregates them per AVS and exports
//! the result as CSV, JSON or Markdown.
//!
//! Exit codes:
//!   0 - Success (at least one aggregate exported)
//!   1 - Runtime error (config, client, initial fetch, write failure, etc.)
//!   2 - No data, or no relationship produced an aggregate

mod analysis;
mod cli;
mod config;
mod error;
mod fetch;
mod models;
mod report;
mod session;
mod upstream;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{ApiConfig, Config, CONFIG_FILE};
use fetch::{FetchOptions, RelationshipFetcher};
use models::{FetchScope, Report};
use session::{Session, Snapshot, ViewState};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use upstream::ApiClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("AvsLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .avslens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    println!("Edit it to set the API URL, query window, report format and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so that exports written to stdout stay clean.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the fetch-aggregate-export workflow. Returns the exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    if args.verbose || config.general.verbose {
        debug!("Effective config: {:?}", config);
    }

    let client = ApiClient::new(&config.api.base_url, config.api.timeout_seconds)
        .context("Failed to create API client")?;
    info!("Upstream API: {}", config.api.base_url);

    let fetcher = RelationshipFetcher::new(
        client,
        FetchOptions {
            concurrency: config.api.concurrency,
            show_progress: !args.quiet,
        },
    );

    if args.watch.is_some() {
        let interval = Duration::from_secs(config.watch.interval_seconds);
        let search = args.search.clone();
        let avs = args.avs.clone();
        let api = config.api.clone();
        session::watch(
            Arc::new(fetcher),
            move || build_scope(avs.as_deref(), &api),
            interval,
            move |snapshot| export_snapshot(snapshot, &config, search.as_deref()).map(|_| ()),
        )
        .await?;
        return Ok(0);
    }

    let scope = build_scope(args.avs.as_deref(), &config.api);

    let start_time = Instant::now();
    let mut session = Session::new();
    let generation = session.begin_refresh();

    // A failed initial request is an error in one-shot mode, not "no data".
    let outcome = fetcher
        .try_fetch(&scope)
        .await
        .with_context(|| format!("Initial fetch for {} failed", scope))?;
    session.complete(Snapshot::build(generation, scope, outcome));

    let snapshot = session
        .current()
        .context("Refresh finished without a snapshot")?;
    let state = export_snapshot(snapshot, &config, args.search.as_deref())?;

    let diagnostics = &snapshot.fetch.diagnostics;
    info!(
        "Done in {:.1}s: {} relationships, {} AVS ({} not aggregated), {} requests, {} rejected, {} failed ids",
        start_time.elapsed().as_secs_f64(),
        snapshot.fetch.relationships.len(),
        snapshot.aggregation.aggregates.len(),
        snapshot.aggregation.failed,
        diagnostics.requests_issued,
        diagnostics.rejected_records,
        diagnostics.failed_ids.len()
    );

    Ok(exit_code(state))
}

/// Map the final view state to the process exit code.
fn exit_code(state: ViewState) -> i32 {
    match state {
        ViewState::Ready => 0,
        ViewState::Loading | ViewState::NoData | ViewState::NoAggregates => 2,
    }
}

/// Build the query scope: a single AVS when `--avs` is given, else the window.
///
/// An unset window end resolves to today at every call.
fn build_scope(avs: Option<&str>, api: &ApiConfig) -> FetchScope {
    match avs {
        Some(id) => FetchScope::Avs {
            id: id.trim().to_string(),
        },
        None => FetchScope::Window {
            date_start: api.date_start.clone(),
            date_end: api.effective_date_end(),
        },
    }
}

/// Render a snapshot in the configured format and write it out.
fn export_snapshot(snapshot: &Snapshot, config: &Config, search: Option<&str>) -> Result<ViewState> {
    let state = snapshot.view_state();
    match state {
        ViewState::NoData => warn!("No relationships were returned for {}", snapshot.scope),
        ViewState::NoAggregates => warn!(
            "{} relationships returned but none produced an aggregate",
            snapshot.fetch.relationships.len()
        ),
        ViewState::Loading | ViewState::Ready => {}
    }

    let report = snapshot.report(config.report.sort_by, search);
    let output = render(&report, config)?;
    write_output(&output, config.general.output.as_deref())?;

    Ok(state)
}

/// Render a report in the configured format.
fn render(report: &Report, config: &Config) -> Result<String> {
    let output = match config.report.format {
        OutputFormat::Csv => report::generate_csv(&report.aggregates),
        OutputFormat::Json => report::generate_json_report(report)?,
        OutputFormat::Markdown => report::generate_markdown_report(report, config.report.top),
    };
    Ok(output)
}

/// Write to the given path, or stdout when none is set.
fn write_output(output: &str, path: Option<&str>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write report to {}", path))?;
            info!("Report saved to: {}", path);
        }
        None => print!("{}", output),
    }
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
