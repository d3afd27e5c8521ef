//! Report exporters.

pub mod csv;
pub mod generator;

pub use self::csv::generate_csv;
pub use generator::{generate_json_report, generate_markdown_report};
