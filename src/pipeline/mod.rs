//! Pipeline Module
//!
//! Wires the snapshot store, schema provider, diff engine, emitter and
//! migration writer into a single diff run.

pub mod command;

pub use command::{DiffFileCommand, DiffOptions, RunOutcome};
