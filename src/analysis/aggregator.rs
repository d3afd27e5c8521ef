//! Per-AVS aggregation.
//!
//! Relationships are folded left to right into one [`AvsAggregate`] per AVS.
//! Replaying the same sequence always yields the same totals.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::models::{AvsAggregate, Relationship, UNKNOWN};

/// One input of the fold. Ids may be missing; values are already coerced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldEntry {
    pub avs: Option<String>,
    pub operator: Option<String>,
    pub strategy: Option<String>,
    pub shares: f64,
    pub eth: f64,
    pub usd: f64,
    pub status_date: String,
}

fn present(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}

impl From<&Relationship> for FoldEntry {
    fn from(rel: &Relationship) -> Self {
        Self {
            avs: present(&rel.avs_address),
            operator: present(&rel.operator_address),
            strategy: present(&rel.strategy_address),
            shares: rel.shares,
            eth: rel.eth_value,
            usd: rel.usd_value,
            status_date: rel.status_date.clone(),
        }
    }
}

/// Result of a complete fold.
#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
    pub aggregates: HashMap<String, AvsAggregate>,
    /// Entries seen.
    pub processed: usize,
    /// Entries skipped: no AVS id, or an incomplete entry for a new AVS.
    pub failed: usize,
}

/// Incremental fold state.
#[derive(Debug, Default)]
pub struct Aggregator {
    aggregates: HashMap<String, AvsAggregate>,
    processed: usize,
    failed: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one entry. Returns `false` if it was skipped.
    ///
    /// A new aggregate is only created from an entry carrying both related
    /// ids. Once it exists, incomplete entries are still folded in with
    /// their missing ids recorded as [`UNKNOWN`].
    pub fn push(&mut self, entry: FoldEntry) -> bool {
        self.processed += 1;

        let Some(avs) = entry.avs.clone().filter(|id| !id.is_empty()) else {
            debug!("Skipping entry without AVS id");
            self.failed += 1;
            return false;
        };

        if !self.aggregates.contains_key(&avs)
            && (entry.operator.is_none() || entry.strategy.is_none())
        {
            debug!("Skipping incomplete first entry for AVS {}", avs);
            self.failed += 1;
            return false;
        }

        let aggregate = self
            .aggregates
            .entry(avs.clone())
            .or_insert_with(|| AvsAggregate::new(avs.clone()));
        fold_into(aggregate, avs, entry);
        true
    }

    pub fn finish(self) -> AggregationOutcome {
        debug!(
            "Aggregated {} entries into {} AVS ({} skipped)",
            self.processed,
            self.aggregates.len(),
            self.failed
        );
        AggregationOutcome {
            aggregates: self.aggregates,
            processed: self.processed,
            failed: self.failed,
        }
    }
}

fn fold_into(aggregate: &mut AvsAggregate, avs: String, entry: FoldEntry) {
    aggregate.total_eth += entry.eth;
    aggregate.total_usd += entry.usd;

    if let Some(ref operator) = entry.operator {
        aggregate.unique_operators.insert(operator.clone());
    }
    if let Some(ref strategy) = entry.strategy {
        aggregate.unique_strategies.insert(strategy.clone());
    }

    update_latest_status_date(aggregate, &entry.status_date);

    aggregate.relationships.push(Relationship {
        avs_address: avs,
        operator_address: entry.operator.unwrap_or_else(|| UNKNOWN.to_string()),
        strategy_address: entry.strategy.unwrap_or_else(|| UNKNOWN.to_string()),
        shares: entry.shares,
        eth_value: entry.eth,
        usd_value: entry.usd,
        status_date: entry.status_date,
    });
}

/// Keeps the later calendar date. Unparseable dates never replace a valid one;
/// on a tie the stored date stays.
fn update_latest_status_date(aggregate: &mut AvsAggregate, incoming: &str) {
    let Some(incoming_date) = parse_status_date(incoming) else {
        return;
    };

    match parse_status_date(&aggregate.latest_status_date) {
        Some(current) if incoming_date <= current => {}
        _ => aggregate.latest_status_date = incoming.to_string(),
    }
}

/// Parses a status date to its calendar date.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 and `YYYY-MM-DD[T ]HH:MM:SS[.f]`.
pub fn parse_status_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() || value == UNKNOWN {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
}

/// Folds a relationship sequence into per-AVS aggregates.
pub fn aggregate_relationships(relationships: &[Relationship]) -> AggregationOutcome {
    let mut aggregator = Aggregator::new();
    for relationship in relationships {
        aggregator.push(FoldEntry::from(relationship));
    }
    aggregator.finish()
}

/// Display order for aggregates. Every key sorts descending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    TotalEth,
    TotalUsd,
    Operators,
    Strategies,
    Relationships,
    LatestUpdate,
}

fn compare_by(key: SortKey, a: &AvsAggregate, b: &AvsAggregate) -> Ordering {
    match key {
        SortKey::TotalEth => a.total_eth.partial_cmp(&b.total_eth).unwrap_or(Ordering::Equal),
        SortKey::TotalUsd => a.total_usd.partial_cmp(&b.total_usd).unwrap_or(Ordering::Equal),
        SortKey::Operators => a.operator_count().cmp(&b.operator_count()),
        SortKey::Strategies => a.strategy_count().cmp(&b.strategy_count()),
        SortKey::Relationships => a.relationship_count().cmp(&b.relationship_count()),
        SortKey::LatestUpdate => parse_status_date(&a.latest_status_date)
            .cmp(&parse_status_date(&b.latest_status_date)),
    }
}

/// Aggregates sorted descending by `key`, ties broken by AVS address.
pub fn sorted_aggregates(
    aggregates: HashMap<String, AvsAggregate>,
    key: SortKey,
) -> Vec<AvsAggregate> {
    let mut sorted: Vec<AvsAggregate> = aggregates.into_values().collect();
    sorted.sort_by(|a, b| {
        compare_by(key, b, a).then_with(|| a.avs_address.cmp(&b.avs_address))
    });
    sorted
}

/// Keeps aggregates whose AVS address contains `query`, ignoring case.
pub fn filter_aggregates(aggregates: Vec<AvsAggregate>, query: &str) -> Vec<AvsAggregate> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return aggregates;
    }

    aggregates
        .into_iter()
        .filter(|a| a.avs_address.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(avs: &str, operator: &str, strategy: &str, eth: f64, date: &str) -> Relationship {
        Relationship {
            avs_address: avs.to_string(),
            operator_address: operator.to_string(),
            strategy_address: strategy.to_string(),
            shares: 0.0,
            eth_value: eth,
            usd_value: eth * 2000.0,
            status_date: date.to_string(),
        }
    }

    fn entry(avs: Option<&str>, operator: Option<&str>, strategy: Option<&str>, eth: f64) -> FoldEntry {
        FoldEntry {
            avs: avs.map(String::from),
            operator: operator.map(String::from),
            strategy: strategy.map(String::from),
            eth,
            status_date: UNKNOWN.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_aggregate() {
        let relationships = vec![
            rel("A", "X", "P", 10.0, UNKNOWN),
            rel("B", "Y", "Q", 5.0, UNKNOWN),
            rel("A", "Z", "P", 3.0, UNKNOWN),
        ];

        let outcome = aggregate_relationships(&relationships);
        let a = &outcome.aggregates["A"];

        assert_eq!(a.total_eth, 13.0);
        assert_eq!(
            a.unique_operators.iter().cloned().collect::<Vec<_>>(),
            vec!["X", "Z"]
        );
        assert_eq!(a.relationships.len(), 2);
        assert_eq!(outcome.aggregates["B"].total_eth, 5.0);
        assert_eq!(outcome.failed, 0);
    }

    #[test]
    fn test_totals_match_constituents() {
        let relationships = vec![
            rel("A", "X", "P", 1.5, UNKNOWN),
            rel("A", "Y", "P", 2.25, UNKNOWN),
            rel("A", "X", "Q", 4.0, UNKNOWN),
            rel("A", "W", "Q", 0.25, UNKNOWN),
        ];

        let outcome = aggregate_relationships(&relationships);
        for aggregate in outcome.aggregates.values() {
            let eth: f64 = aggregate.relationships.iter().map(|r| r.eth_value).sum();
            let usd: f64 = aggregate.relationships.iter().map(|r| r.usd_value).sum();
            assert_eq!(aggregate.total_eth, eth);
            assert_eq!(aggregate.total_usd, usd);

            let operators: std::collections::BTreeSet<_> = aggregate
                .relationships
                .iter()
                .map(|r| r.operator_address.clone())
                .collect();
            assert_eq!(aggregate.unique_operators, operators);
        }
        assert_eq!(outcome.aggregates["A"].operator_count(), 3);
        assert_eq!(outcome.aggregates["A"].strategy_count(), 2);
    }

    #[test]
    fn test_latest_date_is_order_independent() {
        let dates = ["2025-01-05", UNKNOWN, "2025-03-01T12:00:00Z", "2024-12-31", "garbage"];
        let mut orders = vec![dates.to_vec()];
        let mut reversed = dates.to_vec();
        reversed.reverse();
        orders.push(reversed);
        orders.push(vec![dates[2], dates[0], dates[4], dates[1], dates[3]]);

        for order in orders {
            let relationships: Vec<_> = order
                .iter()
                .enumerate()
                .map(|(i, date)| rel("A", &format!("op{}", i), "P", 1.0, date))
                .collect();
            let outcome = aggregate_relationships(&relationships);
            assert_eq!(
                outcome.aggregates["A"].latest_status_date,
                "2025-03-01T12:00:00Z"
            );
        }
    }

    #[test]
    fn test_all_unknown_dates_stay_unknown() {
        let relationships = vec![
            rel("A", "X", "P", 1.0, UNKNOWN),
            rel("A", "Y", "P", 1.0, "not-a-date"),
        ];
        let outcome = aggregate_relationships(&relationships);
        assert_eq!(outcome.aggregates["A"].latest_status_date, UNKNOWN);
    }

    #[test]
    fn test_same_day_tie_keeps_earliest_seen() {
        let relationships = vec![
            rel("A", "X", "P", 1.0, "2025-02-11"),
            rel("A", "Y", "P", 1.0, "2025-02-11T23:59:59Z"),
        ];
        let outcome = aggregate_relationships(&relationships);
        assert_eq!(outcome.aggregates["A"].latest_status_date, "2025-02-11");
    }

    #[test]
    fn test_incomplete_entry_never_creates_aggregate() {
        let mut aggregator = Aggregator::new();
        assert!(!aggregator.push(entry(Some("A"), None, Some("P"), 1.0)));
        assert!(!aggregator.push(entry(Some("A"), Some("X"), None, 1.0)));

        let outcome = aggregator.finish();
        assert!(outcome.aggregates.is_empty());
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.processed, 2);
    }

    #[test]
    fn test_incomplete_entry_extends_existing_aggregate() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.push(entry(Some("A"), Some("X"), Some("P"), 2.0)));
        assert!(aggregator.push(entry(Some("A"), None, Some("Q"), 3.0)));

        let outcome = aggregator.finish();
        let a = &outcome.aggregates["A"];
        assert_eq!(a.relationships.len(), 2);
        assert_eq!(a.relationships[1].operator_address, UNKNOWN);
        assert_eq!(a.relationships[1].strategy_address, "Q");
        assert_eq!(a.total_eth, 5.0);
        // A missing id is never counted as a participant.
        assert_eq!(a.operator_count(), 1);
        assert_eq!(a.strategy_count(), 2);
    }

    #[test]
    fn test_missing_avs_is_counted_failed() {
        let mut aggregator = Aggregator::new();
        assert!(!aggregator.push(entry(None, Some("X"), Some("P"), 1.0)));
        assert!(!aggregator.push(entry(Some(""), Some("X"), Some("P"), 1.0)));
        assert_eq!(aggregator.finish().failed, 2);
    }

    #[test]
    fn test_parse_status_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 2, 11);
        assert_eq!(parse_status_date("2025-02-11"), expected);
        assert_eq!(parse_status_date("2025-02-11T08:30:00Z"), expected);
        assert_eq!(parse_status_date("2025-02-11T08:30:00.123"), expected);
        assert_eq!(parse_status_date("2025-02-11 08:30:00"), expected);
        assert_eq!(parse_status_date(UNKNOWN), None);
        assert_eq!(parse_status_date("11/02/2025"), None);
    }

    #[test]
    fn test_sorted_aggregates() {
        let relationships = vec![
            rel("B", "X", "P", 5.0, "2025-01-01"),
            rel("A", "X", "P", 10.0, "2024-01-01"),
            rel("C", "X", "P", 5.0, UNKNOWN),
            rel("C", "Y", "P", 0.0, UNKNOWN),
        ];
        let outcome = aggregate_relationships(&relationships);

        let by_eth: Vec<_> = sorted_aggregates(outcome.aggregates.clone(), SortKey::TotalEth)
            .into_iter()
            .map(|a| a.avs_address)
            .collect();
        assert_eq!(by_eth, vec!["A", "B", "C"]);

        let by_ops: Vec<_> = sorted_aggregates(outcome.aggregates.clone(), SortKey::Operators)
            .into_iter()
            .map(|a| a.avs_address)
            .collect();
        assert_eq!(by_ops, vec!["C", "A", "B"]);

        let by_date: Vec<_> = sorted_aggregates(outcome.aggregates, SortKey::LatestUpdate)
            .into_iter()
            .map(|a| a.avs_address)
            .collect();
        assert_eq!(by_date, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_filter_aggregates() {
        let aggregates = vec![AvsAggregate::new("0xAbC"), AvsAggregate::new("0xdef")];
        let filtered = filter_aggregates(aggregates.clone(), "abc");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].avs_address, "0xAbC");
        assert_eq!(filter_aggregates(aggregates, "  ").len(), 2);
    }
}
