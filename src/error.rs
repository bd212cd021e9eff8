//! Error handling module
//!
//! Provides the unified error type shared by every stage of a diff run.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum DriftError {
    /// A requested capability is not available in this build or environment
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The latest snapshot could not be read back into a schema
    #[error("Corrupt schema snapshot {}: {reason}", path.display())]
    Deserialization { path: PathBuf, reason: String },

    /// A column refers to a type code the registry does not know
    #[error("Unknown type '{code}' for column {table}.{column}")]
    Lookup {
        table: String,
        column: String,
        code: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DriftError {
    /// Attach a path to an I/O error
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DriftError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a deserialization error for the given snapshot file
    pub fn corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        DriftError::Deserialization {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result type alias used across the crate
pub type DriftResult<T> = Result<T, DriftError>;

/// Helper function to create a configuration error
pub fn config_error(msg: impl Into<String>) -> DriftError {
    DriftError::Configuration(msg.into())
}
