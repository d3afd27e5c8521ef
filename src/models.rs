//! Data models for the AVS relationship pipeline.
//!
//! This module contains the core data structures shared by the fetcher,
//! the aggregator and the exporters: relationships, per-AVS aggregates,
//! breakdown entries and the fetch diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{FetchError, RecordRejection};

/// Placeholder used for missing status dates and missing related ids.
pub const UNKNOWN: &str = "Unknown";

/// One (AVS, operator, strategy) fact with its value fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// First-level id: the AVS the operator is attached to.
    pub avs_address: String,
    /// Second-level id.
    pub operator_address: String,
    /// Third-level id.
    pub strategy_address: String,
    /// Restaked shares.
    pub shares: f64,
    /// Value in ETH.
    pub eth_value: f64,
    /// Value in USD.
    pub usd_value: f64,
    /// Status date as reported upstream, or [`UNKNOWN`].
    pub status_date: String,
}

impl Relationship {
    /// The dedup key: the id triple, order-sensitive.
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            avs: self.avs_address.clone(),
            operator: self.operator_address.clone(),
            strategy: self.strategy_address.clone(),
        }
    }
}

/// Identity of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipKey {
    pub avs: String,
    pub operator: String,
    pub strategy: String,
}

/// Per-AVS rollup of every relationship seen for that AVS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvsAggregate {
    pub avs_address: String,
    #[serde(rename = "totalETH")]
    pub total_eth: f64,
    #[serde(rename = "totalUSD")]
    pub total_usd: f64,
    pub unique_operators: BTreeSet<String>,
    pub unique_strategies: BTreeSet<String>,
    pub relationships: Vec<Relationship>,
    pub latest_status_date: String,
}

impl AvsAggregate {
    /// Creates an empty aggregate for an AVS.
    pub fn new(avs_address: impl Into<String>) -> Self {
        Self {
            avs_address: avs_address.into(),
            total_eth: 0.0,
            total_usd: 0.0,
            unique_operators: BTreeSet::new(),
            unique_strategies: BTreeSet::new(),
            relationships: Vec::new(),
            latest_status_date: UNKNOWN.to_string(),
        }
    }

    pub fn operator_count(&self) -> usize {
        self.unique_operators.len()
    }

    pub fn strategy_count(&self) -> usize {
        self.unique_strategies.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}

/// Which related id a breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Operator,
    Strategy,
}

impl Dimension {
    /// Returns the id of `relationship` on this dimension.
    pub fn id_of<'a>(&self, relationship: &'a Relationship) -> &'a str {
        match self {
            Dimension::Operator => &relationship.operator_address,
            Dimension::Strategy => &relationship.strategy_address,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Operator => write!(f, "Operator"),
            Dimension::Strategy => write!(f, "Strategy"),
        }
    }
}

/// One row of a top-N breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    pub address: String,
    #[serde(rename = "totalETH")]
    pub total_eth: f64,
    #[serde(rename = "totalUSD")]
    pub total_usd: f64,
    pub count: usize,
}

/// What a fetch cycle asked the upstream API for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FetchScope {
    /// Everything with a status date inside the window.
    Window { date_start: String, date_end: String },
    /// A single AVS.
    Avs { id: String },
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchScope::Window {
                date_start,
                date_end,
            } => write!(f, "{} .. {}", date_start, date_end),
            FetchScope::Avs { id } => write!(f, "avs {}", id),
        }
    }
}

/// A follow-up request that failed and was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct PerIdFailure {
    pub avs: String,
    /// HTTP status, when the server answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

/// Counters describing one fetch cycle.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDiagnostics {
    /// Requests sent, initial included.
    pub requests_issued: usize,
    /// Records in the initial batch before validation.
    pub initial_records: usize,
    /// Records dropped by the coercion boundary.
    pub rejected_records: usize,
    /// Valid records discarded because their triple was already present.
    pub duplicate_records: usize,
    /// Follow-up requests that failed.
    pub failed_ids: Vec<PerIdFailure>,
}

impl FetchDiagnostics {
    pub fn record_rejection(&mut self, rejection: &RecordRejection) {
        tracing::trace!("Dropped record: {}", rejection);
        self.rejected_records += 1;
    }

    pub fn record_failure(&mut self, avs: &str, error: &FetchError) {
        self.failed_ids.push(PerIdFailure {
            avs: avs.to_string(),
            status: error.status_code(),
            error: error.to_string(),
        });
    }
}

/// Result of one complete fetch cycle.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub relationships: Vec<Relationship>,
    pub diagnostics: FetchDiagnostics,
}

/// Summary totals across every aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub avs_count: usize,
    pub relationship_count: usize,
    #[serde(rename = "totalETH")]
    pub total_eth: f64,
    #[serde(rename = "totalUSD")]
    pub total_usd: f64,
    pub unique_operators: usize,
    pub unique_strategies: usize,
}

impl PortfolioSummary {
    /// Computes the summary cards from a set of aggregates.
    pub fn from_aggregates<'a>(aggregates: impl IntoIterator<Item = &'a AvsAggregate>) -> Self {
        let mut summary = Self::default();
        let mut operators = BTreeSet::new();
        let mut strategies = BTreeSet::new();

        for aggregate in aggregates {
            summary.avs_count += 1;
            summary.relationship_count += aggregate.relationship_count();
            summary.total_eth += aggregate.total_eth;
            summary.total_usd += aggregate.total_usd;
            operators.extend(aggregate.unique_operators.iter().map(String::as_str));
            strategies.extend(aggregate.unique_strategies.iter().map(String::as_str));
        }

        summary.unique_operators = operators.len();
        summary.unique_strategies = strategies.len();
        summary
    }
}

/// Fold counters of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationCounts {
    /// Relationships folded or skipped.
    pub processed: usize,
    /// Relationships that could not seed or join an aggregate.
    pub failed: usize,
}

/// Everything the exporters need from one fetch cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub scope: FetchScope,
    pub summary: PortfolioSummary,
    pub diagnostics: FetchDiagnostics,
    pub aggregation: AggregationCounts,
    /// Aggregates in display order.
    pub aggregates: Vec<AvsAggregate>,
}
