//! Markdown and JSON report generation.
//!
//! The Markdown report mirrors the dashboard: summary cards, the sorted AVS
//! table, then per-AVS strategy and operator breakdowns.

use crate::analysis::{operator_breakdown, strategy_breakdown, top_n};
use crate::models::{
    AggregationCounts, AvsAggregate, BreakdownEntry, Dimension, FetchDiagnostics,
    PortfolioSummary, Report,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, top: usize) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# AVS Relationship Report\n\n");

    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_summary_section(&report.summary));
    output.push_str(&generate_avs_table(&report.aggregates));

    if top > 0 {
        output.push_str(&generate_breakdowns_section(&report.aggregates, top));
    }

    output.push_str(&generate_diagnostics_section(
        &report.diagnostics,
        &report.aggregation,
    ));

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Scope:** {}\n", report.scope));
    section.push_str(&format!(
        "- **Requests:** {}\n",
        report.diagnostics.requests_issued
    ));
    section.push('\n');

    section
}

/// Generate the summary cards.
fn generate_summary_section(summary: &PortfolioSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| AVS | Relationships | Total ETH | Total USD | Operators | Strategies |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n\n",
        summary.avs_count,
        summary.relationship_count,
        format_amount(summary.total_eth),
        format_amount(summary.total_usd),
        summary.unique_operators,
        summary.unique_strategies
    ));

    section
}

/// Generate the AVS table, in the order given.
fn generate_avs_table(aggregates: &[AvsAggregate]) -> String {
    let mut section = String::new();

    section.push_str("## AVS\n\n");

    if aggregates.is_empty() {
        section.push_str("No aggregates were produced.\n\n");
        return section;
    }

    section.push_str(
        "| # | AVS | Total ETH | Total USD | Operators | Strategies | Relationships | Latest Update |\n",
    );
    section.push_str("|---:|:---|---:|---:|---:|---:|---:|:---|\n");

    for (i, aggregate) in aggregates.iter().enumerate() {
        section.push_str(&format!(
            "| {} | `{}` | {} | {} | {} | {} | {} | {} |\n",
            i + 1,
            aggregate.avs_address,
            format_amount(aggregate.total_eth),
            format_amount(aggregate.total_usd),
            aggregate.operator_count(),
            aggregate.strategy_count(),
            aggregate.relationship_count(),
            aggregate.latest_status_date
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-AVS top-N breakdowns.
fn generate_breakdowns_section(aggregates: &[AvsAggregate], top: usize) -> String {
    let mut section = String::new();

    if aggregates.is_empty() {
        return section;
    }

    section.push_str("## Breakdowns\n\n");

    for aggregate in aggregates {
        section.push_str(&format!("### `{}`\n\n", aggregate.avs_address));

        let strategies = top_n(strategy_breakdown(&aggregate.relationships), top);
        section.push_str(&generate_breakdown_table(Dimension::Strategy, &strategies));

        let operators = top_n(operator_breakdown(&aggregate.relationships), top);
        section.push_str(&generate_breakdown_table(Dimension::Operator, &operators));
    }

    section
}

/// Generate one breakdown table.
fn generate_breakdown_table(dimension: Dimension, entries: &[BreakdownEntry]) -> String {
    let mut table = String::new();

    if entries.is_empty() {
        return table;
    }

    table.push_str(&format!("| {} | ETH | USD | Count |\n", dimension));
    table.push_str("|:---|---:|---:|---:|\n");
    for entry in entries {
        table.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            entry.address,
            format_amount(entry.total_eth),
            format_amount(entry.total_usd),
            entry.count
        ));
    }
    table.push('\n');

    table
}

/// Generate the diagnostics section. Empty when nothing went wrong.
fn generate_diagnostics_section(
    diagnostics: &FetchDiagnostics,
    aggregation: &AggregationCounts,
) -> String {
    let mut section = String::new();

    if diagnostics.rejected_records == 0
        && diagnostics.failed_ids.is_empty()
        && aggregation.failed == 0
    {
        return section;
    }

    section.push_str("## Diagnostics\n\n");
    section.push_str(&format!(
        "- **Rejected records:** {}\n",
        diagnostics.rejected_records
    ));
    section.push_str(&format!(
        "- **Duplicate records:** {}\n",
        diagnostics.duplicate_records
    ));
    section.push_str(&format!(
        "- **Aggregated relationships:** {} of {}\n",
        aggregation.processed.saturating_sub(aggregation.failed),
        aggregation.processed
    ));
    for failure in &diagnostics.failed_ids {
        section.push_str(&format!(
            "- Skipped `{}`: {}\n",
            failure.avs, failure.error
        ));
    }
    section.push('\n');

    section
}

fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchScope, PerIdFailure, Relationship};
    use chrono::Utc;

    fn rel(operator: &str, strategy: &str, eth: f64) -> Relationship {
        Relationship {
            avs_address: "0xA".to_string(),
            operator_address: operator.to_string(),
            strategy_address: strategy.to_string(),
            shares: 0.0,
            eth_value: eth,
            usd_value: eth * 2000.0,
            status_date: "2025-02-11".to_string(),
        }
    }

    fn create_test_report() -> Report {
        let mut aggregate = AvsAggregate::new("0xA");
        aggregate.relationships = vec![rel("X", "P", 10.0), rel("Z", "P", 3.0)];
        aggregate.total_eth = 13.0;
        aggregate.total_usd = 26000.0;
        aggregate.unique_operators.extend(["X".to_string(), "Z".to_string()]);
        aggregate.unique_strategies.insert("P".to_string());
        aggregate.latest_status_date = "2025-02-11".to_string();

        Report {
            generated_at: Utc::now(),
            scope: FetchScope::Window {
                date_start: "2024-01-01".to_string(),
                date_end: "2025-12-31".to_string(),
            },
            summary: PortfolioSummary::from_aggregates([&aggregate]),
            diagnostics: FetchDiagnostics::default(),
            aggregation: AggregationCounts {
                processed: 2,
                failed: 0,
            },
            aggregates: vec![aggregate],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, 5);

        assert!(markdown.contains("# AVS Relationship Report"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("| 1 | `0xA` | 13.00 | 26000.00 | 2 | 1 | 2 | 2025-02-11 |"));
        assert!(markdown.contains("### `0xA`"));
        assert!(markdown.contains("| `P` | 13.00 | 26000.00 | 2 |"));
        assert!(markdown.contains("| `X` | 10.00 | 20000.00 | 1 |"));
        assert!(!markdown.contains("## Diagnostics"));
    }

    #[test]
    fn test_breakdowns_can_be_disabled() {
        let markdown = generate_markdown_report(&create_test_report(), 0);
        assert!(!markdown.contains("## Breakdowns"));
    }

    #[test]
    fn test_empty_report() {
        let mut report = create_test_report();
        report.aggregates.clear();
        report.summary = PortfolioSummary::default();

        let markdown = generate_markdown_report(&report, 5);
        assert!(markdown.contains("No aggregates were produced."));
    }

    #[test]
    fn test_diagnostics_section() {
        let mut diagnostics = FetchDiagnostics::default();
        diagnostics.rejected_records = 3;
        diagnostics.failed_ids.push(PerIdFailure {
            avs: "0xB".to_string(),
            status: Some(500),
            error: "upstream unavailable (HTTP 500): Internal Server Error".to_string(),
        });

        let section = generate_diagnostics_section(&diagnostics, &AggregationCounts::default());
        assert!(section.contains("**Rejected records:** 3"));
        assert!(section.contains("Skipped `0xB`"));
    }

    #[test]
    fn test_diagnostics_report_aggregation_skips() {
        let counts = AggregationCounts {
            processed: 5,
            failed: 2,
        };

        let section = generate_diagnostics_section(&FetchDiagnostics::default(), &counts);
        assert!(section.contains("## Diagnostics"));
        assert!(section.contains("**Aggregated relationships:** 3 of 5"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();

        assert!(json.contains("\"generatedAt\""));
        assert!(json.contains("\"totalETH\": 13.0"));
        assert!(json.contains("\"uniqueOperators\""));
        assert!(json.contains("\"kind\": \"window\""));
        assert!(json.contains("\"aggregation\""));
        assert!(json.contains("\"processed\": 2"));
    }
}
