//! Upstream relationship API: HTTP client and record coercion.

pub mod client;
pub mod records;

pub use client::{ApiClient, Query, RelationshipSource};
pub use records::RawRecord;
