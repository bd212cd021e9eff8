//! Migration Module
//!
//! Turns diff statements into guarded migration artifacts, renders them as
//! Rust source and writes them next to the snapshot history.

pub mod emitter;
pub mod runtime;
pub mod writer;

pub use emitter::{
    default_formatter, Artifact, Direction, EmitOutcome, MigrationEmitter, SqlFormatter, Step,
    DEFAULT_LINE_LENGTH,
};
#[cfg(feature = "pretty-sql")]
pub use emitter::PrettySql;
pub use runtime::{Migration, MigrationAborted, MigrationContext, RecordingContext};
pub use writer::{FileMigrationWriter, MigrationWriter};
