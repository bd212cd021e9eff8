//! schemadrift
//!
//! Snapshot-based schema diffing and migration generation. A run loads the
//! last recorded schema snapshot, compares it with the schema exported by
//! the ORM tooling and emits a reversible, dialect-guarded migration plus a
//! new snapshot.

pub mod config;
pub mod diff;
pub mod error;
pub mod migration;
pub mod pipeline;
pub mod provider;
pub mod schema;
pub mod snapshot;

pub use error::{DriftError, DriftResult};
