//! Relationship fetching and dedup merge.

pub mod fetcher;
pub mod set;

pub use fetcher::{FetchOptions, RelationshipFetcher};
