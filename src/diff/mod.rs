//! Diff Module
//!
//! Compares two schemas and renders the differences as ordered,
//! dialect-specific DDL.

pub mod comparator;
pub mod engine;
pub mod platform;

pub use comparator::{ColumnDiff, ColumnProperty, Comparator, DiffSummary, SchemaDiff, TableDiff};
pub use engine::{DiffEngine, DiffOutcome, DEFAULT_MIGRATIONS_TABLE};
pub use platform::{Dialect, SqlPlatform};
