//! Tabletalk Store - SQLite-Backed Tabular Data
//!
//! Two concerns live here: executing generated queries against the
//! datasets (each call on its own scoped read-only connection) and
//! the one-time ingestion of the raw CSV exports into SQLite with an
//! explicit column-classification step.

pub mod etl;
pub mod store;

pub use etl::{classify_column, load_dir, parse_currency, ColumnKind, LoadReport, DATASETS};
pub use store::SqliteStore;
