//! Refresh session: generation-guarded snapshots and the watch loop.
//!
//! Every fetch cycle is tagged with a generation when it starts. A finished
//! cycle is installed only if it is newer than the installed snapshot, so a
//! slow cycle can never overwrite the result of a later one.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analysis::{
    aggregate_relationships, filter_aggregates, sorted_aggregates, AggregationOutcome, SortKey,
};
use crate::fetch::RelationshipFetcher;
use crate::models::{AggregationCounts, FetchOutcome, FetchScope, PortfolioSummary, Report};
use crate::upstream::RelationshipSource;

/// What the consumer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// No cycle has completed yet.
    Loading,
    /// The fetch returned nothing, or the initial request failed.
    NoData,
    /// Relationships arrived but none produced an aggregate.
    NoAggregates,
    Ready,
}

/// The result of one fetch cycle, aggregated.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub fetched_at: DateTime<Utc>,
    pub scope: FetchScope,
    pub fetch: FetchOutcome,
    pub aggregation: AggregationOutcome,
}

impl Snapshot {
    /// Aggregates a fetch outcome.
    pub fn build(generation: u64, scope: FetchScope, fetch: FetchOutcome) -> Self {
        let aggregation = aggregate_relationships(&fetch.relationships);
        Self {
            generation,
            fetched_at: Utc::now(),
            scope,
            fetch,
            aggregation,
        }
    }

    pub fn view_state(&self) -> ViewState {
        if self.fetch.relationships.is_empty() {
            ViewState::NoData
        } else if self.aggregation.aggregates.is_empty() {
            ViewState::NoAggregates
        } else {
            ViewState::Ready
        }
    }

    /// Builds the exportable report: aggregates sorted, then filtered.
    pub fn report(&self, sort: SortKey, search: Option<&str>) -> Report {
        let mut aggregates = sorted_aggregates(self.aggregation.aggregates.clone(), sort);
        if let Some(query) = search {
            aggregates = filter_aggregates(aggregates, query);
        }

        Report {
            generated_at: self.fetched_at,
            scope: self.scope.clone(),
            summary: PortfolioSummary::from_aggregates(&aggregates),
            diagnostics: self.fetch.diagnostics.clone(),
            aggregation: AggregationCounts {
                processed: self.aggregation.processed,
                failed: self.aggregation.failed,
            },
            aggregates,
        }
    }
}

/// Holds the installed snapshot and hands out generations.
#[derive(Debug, Default)]
pub struct Session {
    latest_started: u64,
    current: Option<Snapshot>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a cycle and returns its generation.
    pub fn begin_refresh(&mut self) -> u64 {
        self.latest_started += 1;
        debug!("Starting refresh generation {}", self.latest_started);
        self.latest_started
    }

    /// Installs `snapshot` if it is newer than the installed one.
    ///
    /// Returns `false` and keeps the current snapshot otherwise.
    pub fn complete(&mut self, snapshot: Snapshot) -> bool {
        let installed = self.installed_generation();
        if snapshot.generation <= installed {
            warn!(
                "Discarding stale refresh generation {} (installed is {})",
                snapshot.generation, installed
            );
            return false;
        }

        if snapshot.generation < self.latest_started {
            debug!(
                "Installing generation {} while {} is still running",
                snapshot.generation, self.latest_started
            );
        }
        self.current = Some(snapshot);
        true
    }

    /// Generation of the installed snapshot, 0 before the first install.
    pub fn installed_generation(&self) -> u64 {
        self.current.as_ref().map_or(0, |s| s.generation)
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn view_state(&self) -> ViewState {
        self.current
            .as_ref()
            .map_or(ViewState::Loading, Snapshot::view_state)
    }
}

/// Re-runs a fetch cycle every `interval` until Ctrl-C.
///
/// `scope_for_cycle` is called at the start of each cycle, so a window
/// ending "today" moves forward while the loop runs. Cycles run as
/// independent tasks and may overlap; `on_install` is called for each
/// snapshot the session accepts.
pub async fn watch<S, G, F>(
    fetcher: Arc<RelationshipFetcher<S>>,
    mut scope_for_cycle: G,
    interval: Duration,
    mut on_install: F,
) -> Result<()>
where
    S: RelationshipSource + 'static,
    G: FnMut() -> FetchScope,
    F: FnMut(&Snapshot) -> Result<()>,
{
    let mut session = Session::new();
    let (tx, mut rx) = mpsc::channel::<(u64, FetchScope, FetchOutcome)>(8);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Watching every {}s", interval.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let generation = session.begin_refresh();
                let scope = scope_for_cycle();
                let fetcher = Arc::clone(&fetcher);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = fetcher.fetch(&scope).await;
                    if tx.send((generation, scope, outcome)).await.is_err() {
                        debug!("Refresh {} finished after the watch loop stopped", generation);
                    }
                });
            }
            Some((generation, scope, outcome)) = rx.recv() => {
                let snapshot = Snapshot::build(generation, scope, outcome);
                if session.complete(snapshot) {
                    info!("Refresh {} installed: {:?}", generation, session.view_state());
                    if let Some(current) = session.current() {
                        on_install(current)?;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}
