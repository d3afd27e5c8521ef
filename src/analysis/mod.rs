//! Analysis modules.
//!
//! Folding relationships into per-AVS aggregates, ordering them for
//! display, and the top-N strategy/operator breakdowns.

pub mod aggregator;
pub mod breakdown;

pub use aggregator::*;
pub use breakdown::*;
