//! Sinks for the results of a collection run.
//!
//! # Submodules
//!
//! - [`csv`]: writes the canonical bid set as a delimited table
//! - [`json`]: writes the [`CollectionReport`](crate::report::CollectionReport)
//!
//! The durable SQLite store lives in [`crate::store`].
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── G2B_Bids_20250708_0930.csv
//! └── 2025-07-08/
//!     └── report_093012.json
//! ```

pub mod csv;
pub mod json;
