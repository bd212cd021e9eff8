//! Schema Snapshot Module
//!
//! Versioned, file-based history of schemas. Each successful run appends
//! one snapshot which becomes the baseline of the next diff.

pub mod store;

pub use store::{compute_checksum, SnapshotEnvelope, SnapshotStore, VersionId};
