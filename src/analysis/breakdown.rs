//! Top-N breakdowns of an aggregate's relationships.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{BreakdownEntry, Dimension, Relationship, UNKNOWN};

/// Groups relationships by the id on `dimension` and sums their values.
///
/// Relationships without an id on that dimension (empty, or the placeholder
/// the aggregator writes for a missing id) are left out rather than pooled.
/// The result is sorted descending by summed ETH; the sort is stable.
pub fn breakdown(relationships: &[Relationship], dimension: Dimension) -> Vec<BreakdownEntry> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<BreakdownEntry> = Vec::new();

    for relationship in relationships {
        let id = dimension.id_of(relationship);
        if id.is_empty() || id == UNKNOWN {
            continue;
        }

        let slot = *index.entry(id).or_insert_with(|| {
            entries.push(BreakdownEntry {
                address: id.to_string(),
                total_eth: 0.0,
                total_usd: 0.0,
                count: 0,
            });
            entries.len() - 1
        });

        let entry = &mut entries[slot];
        entry.total_eth += relationship.eth_value;
        entry.total_usd += relationship.usd_value;
        entry.count += 1;
    }

    entries.sort_by(|a, b| b.total_eth.partial_cmp(&a.total_eth).unwrap_or(Ordering::Equal));
    entries
}

/// Strategy view of an aggregate.
pub fn strategy_breakdown(relationships: &[Relationship]) -> Vec<BreakdownEntry> {
    breakdown(relationships, Dimension::Strategy)
}

/// Operator view of an aggregate.
pub fn operator_breakdown(relationships: &[Relationship]) -> Vec<BreakdownEntry> {
    breakdown(relationships, Dimension::Operator)
}

/// The first `n` entries.
pub fn top_n(mut entries: Vec<BreakdownEntry>, n: usize) -> Vec<BreakdownEntry> {
    entries.truncate(n);
    entries
}
