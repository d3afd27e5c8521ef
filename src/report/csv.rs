//! CSV export of per-AVS aggregates.

use crate::models::AvsAggregate;

/// Column headers, in row order.
pub const CSV_HEADERS: [&str; 7] = [
    "AVS Address",
    "Total ETH Value",
    "Total USD Value",
    "Unique Operators",
    "Unique Strategies",
    "Total Relationships",
    "Latest Update",
];

/// Generate the CSV export: a header line, then one line per aggregate.
pub fn generate_csv(aggregates: &[AvsAggregate]) -> String {
    let mut output = String::new();

    output.push_str(&CSV_HEADERS.join(","));
    output.push('\n');

    for aggregate in aggregates {
        output.push_str(&csv_row(aggregate));
        output.push('\n');
    }

    output
}

/// One aggregate as a CSV line, without the line terminator.
pub fn csv_row(aggregate: &AvsAggregate) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        quote(&aggregate.avs_address),
        aggregate.total_eth,
        aggregate.total_usd,
        aggregate.operator_count(),
        aggregate.strategy_count(),
        aggregate.relationship_count(),
        quote(&aggregate.latest_status_date),
    )
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Relationship;

    fn rel(operator: &str, strategy: &str) -> Relationship {
        Relationship {
            avs_address: "0xA".to_string(),
            operator_address: operator.to_string(),
            strategy_address: strategy.to_string(),
            shares: 0.0,
            eth_value: 0.0,
            usd_value: 0.0,
            status_date: "2025-02-11".to_string(),
        }
    }

    fn scenario_aggregate() -> AvsAggregate {
        let mut aggregate = AvsAggregate::new("0xA");
        aggregate.total_eth = 13.0;
        aggregate.total_usd = 26000.0;
        aggregate.unique_operators.extend(["X".to_string(), "Z".to_string()]);
        aggregate.unique_strategies.insert("P".to_string());
        aggregate.relationships = vec![rel("X", "P"), rel("Z", "P")];
        aggregate.latest_status_date = "2025-02-11".to_string();
        aggregate
    }

    #[test]
    fn test_scenario_row() {
        assert_eq!(
            csv_row(&scenario_aggregate()),
            "\"0xA\",13,26000,2,1,2,\"2025-02-11\""
        );
    }

    #[test]
    fn test_generate_csv() {
        let csv = generate_csv(&[scenario_aggregate()]);
        assert_eq!(
            csv,
            "AVS Address,Total ETH Value,Total USD Value,Unique Operators,Unique Strategies,Total Relationships,Latest Update\n\
             \"0xA\",13,26000,2,1,2,\"2025-02-11\"\n"
        );
    }

    #[test]
    fn test_fractional_values_and_quotes() {
        let mut aggregate = AvsAggregate::new("we\"ird");
        aggregate.total_eth = 1.5;
        aggregate.total_usd = 0.25;
        assert_eq!(csv_row(&aggregate), "\"we\"\"ird\",1.5,0.25,0,0,0,\"Unknown\"");
    }

    #[test]
    fn test_empty_export_is_header_only() {
        let csv = generate_csv(&[]);
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.ends_with('\n'));
    }
}
