//! Relationship fetcher.
//!
//! One broad request discovers the AVS ids, then one follow-up request per
//! id fills in their full relationship lists. Batches are merged into a
//! [`RelationshipSet`] in a fixed order: the initial batch first, then the
//! follow-ups in order of first appearance of their id. Bounded concurrency
//! changes how many follow-ups are in flight, never the merge order.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::set::RelationshipSet;
use crate::error::FetchError;
use crate::models::{FetchDiagnostics, FetchOutcome, FetchScope};
use crate::upstream::{Query, RawRecord, RelationshipSource};

/// Options for a fetch cycle.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum follow-up requests in flight. 1 means strictly sequential.
    pub concurrency: usize,
    /// Whether to draw a progress bar for the follow-up requests.
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            show_progress: false,
        }
    }
}

/// Fetches and merges relationships from a [`RelationshipSource`].
pub struct RelationshipFetcher<S> {
    source: S,
    options: FetchOptions,
}

impl<S: RelationshipSource> RelationshipFetcher<S> {
    pub fn new(source: S, options: FetchOptions) -> Self {
        Self { source, options }
    }

    /// Runs a fetch cycle. An initial-request failure yields an empty outcome.
    ///
    /// An empty result therefore means "no data or total failure", not
    /// "zero relationships confirmed".
    pub async fn fetch(&self, scope: &FetchScope) -> FetchOutcome {
        match self.try_fetch(scope).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Initial fetch for {} failed: {}", scope, e);
                FetchOutcome::default()
            }
        }
    }

    /// Runs a fetch cycle, surfacing an initial-request failure as an error.
    ///
    /// Per-id failures and invalid records never fail the cycle; they are
    /// recorded in the outcome's diagnostics.
    pub async fn try_fetch(&self, scope: &FetchScope) -> Result<FetchOutcome, FetchError> {
        let mut diagnostics = FetchDiagnostics::default();

        info!("Fetching relationships for {}", scope);
        diagnostics.requests_issued += 1;
        let initial = self.source.fetch_batch(&initial_query(scope)).await?;
        diagnostics.initial_records = initial.len();
        debug!("Initial batch: {} records", initial.len());

        let records = parse_batch(initial, &mut diagnostics);
        let mut avs_ids = distinct_avs_ids(&records);
        if let FetchScope::Avs { id } = scope {
            avs_ids.retain(|avs| avs != id);
        }

        let mut set = RelationshipSet::new();
        merge_records(&mut set, &records, &mut diagnostics);

        info!(
            "Discovered {} AVS ids, fetching their relationships",
            avs_ids.len()
        );
        let progress = self.progress_bar(avs_ids.len());

        let mut batches = stream::iter(avs_ids)
            .map(|avs| async move {
                let result = self.source.fetch_batch(&Query::Avs(avs.clone())).await;
                (avs, result)
            })
            .buffered(self.options.concurrency.max(1));

        while let Some((avs, result)) = batches.next().await {
            diagnostics.requests_issued += 1;
            match result {
                Ok(batch) => {
                    debug!("AVS {}: {} records", avs, batch.len());
                    let records = parse_batch(batch, &mut diagnostics);
                    merge_records(&mut set, &records, &mut diagnostics);
                }
                Err(e) => {
                    warn!("Skipping AVS {}: {}", avs, e);
                    diagnostics.record_failure(&avs, &e);
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(
            "Fetched {} relationships ({} rejected, {} duplicates, {} failed ids)",
            set.len(),
            diagnostics.rejected_records,
            diagnostics.duplicate_records,
            diagnostics.failed_ids.len()
        );

        Ok(FetchOutcome {
            relationships: set.into_vec(),
            diagnostics,
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.options.show_progress || len == 0 {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} AVS ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// The first request of a cycle.
pub fn initial_query(scope: &FetchScope) -> Query {
    match scope {
        FetchScope::Window {
            date_start,
            date_end,
        } => Query::Window {
            date_start: date_start.clone(),
            date_end: date_end.clone(),
        },
        FetchScope::Avs { id } => Query::Avs(id.clone()),
    }
}

/// Distinct AVS ids in order of first appearance.
pub fn distinct_avs_ids(records: &[RawRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(RawRecord::avs)
        .filter(|avs| seen.insert(*avs))
        .map(String::from)
        .collect()
}

fn parse_batch(batch: Vec<Value>, diagnostics: &mut FetchDiagnostics) -> Vec<RawRecord> {
    batch
        .into_iter()
        .filter_map(|value| match RawRecord::from_value(value) {
            Ok(record) => Some(record),
            Err(rejection) => {
                diagnostics.record_rejection(&rejection);
                None
            }
        })
        .collect()
}

fn merge_records(
    set: &mut RelationshipSet,
    records: &[RawRecord],
    diagnostics: &mut FetchDiagnostics,
) {
    for record in records {
        match record.to_relationship() {
            Ok(relationship) => {
                if !set.insert(relationship) {
                    diagnostics.duplicate_records += 1;
                }
            }
            Err(rejection) => diagnostics.record_rejection(&rejection),
        }
    }
}
