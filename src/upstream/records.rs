//! Coercion boundary between untyped upstream records and [`Relationship`].
//!
//! Every defensive type check on upstream data lives here. The fetcher
//! and the aggregator only ever see the output of this module.

use serde_json::{Map, Value};

use crate::error::RecordRejection;
use crate::models::{Relationship, UNKNOWN};

/// A raw upstream record. Any field may be absent or of the wrong type.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    /// Wraps a JSON value, rejecting anything that isn't an object.
    pub fn from_value(value: Value) -> Result<Self, RecordRejection> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(RecordRejection::NotAnObject),
        }
    }

    /// The AVS id, if it is a non-empty string.
    pub fn avs(&self) -> Option<&str> {
        self.string_field("avs")
    }

    pub fn operator(&self) -> Option<&str> {
        self.string_field("operator")
    }

    pub fn strategy(&self) -> Option<&str> {
        self.string_field("strategy")
    }

    pub fn shares(&self) -> f64 {
        coerce_number(self.fields.get("shares"))
    }

    pub fn eth(&self) -> f64 {
        coerce_number(self.fields.get("eth"))
    }

    pub fn usd(&self) -> f64 {
        coerce_number(self.fields.get("usd"))
    }

    /// The status date, or [`UNKNOWN`] when absent or not a string.
    pub fn status_date(&self) -> &str {
        self.string_field("status_date").unwrap_or(UNKNOWN)
    }

    /// Validates the record into a relationship. All three ids are required.
    pub fn to_relationship(&self) -> Result<Relationship, RecordRejection> {
        let avs = self.avs().ok_or(RecordRejection::MissingAvs)?;
        let operator = self.operator().ok_or(RecordRejection::MissingOperator)?;
        let strategy = self.strategy().ok_or(RecordRejection::MissingStrategy)?;

        Ok(Relationship {
            avs_address: avs.to_string(),
            operator_address: operator.to_string(),
            strategy_address: strategy.to_string(),
            shares: self.shares(),
            eth_value: self.eth(),
            usd_value: self.usd(),
            status_date: self.status_date().to_string(),
        })
    }

    fn string_field(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Converts a JSON value to a number, falling back to 0.
///
/// JSON numbers and strings holding a finite decimal are accepted.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

/// Extracts the `data` array from a response body.
pub fn data_array(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}
