//! Migration file writer

use crate::error::{DriftError, DriftResult};
use crate::migration::emitter::Artifact;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Destination for rendered migration artifacts
pub trait MigrationWriter {
    /// Store the artifact and return where it ended up
    fn write(&self, artifact: &Artifact) -> DriftResult<PathBuf>;
}

/// Writes `Version<id>.rs` files into the migrations directory
#[derive(Debug, Clone)]
pub struct FileMigrationWriter {
    dir: PathBuf,
}

impl FileMigrationWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        self.dir.join(format!("{}.rs", artifact.class_name()))
    }
}

impl MigrationWriter for FileMigrationWriter {
    fn write(&self, artifact: &Artifact) -> DriftResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| DriftError::io(&self.dir, e))?;

        let path = self.path_for(artifact);
        // Never clobber an existing migration
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| DriftError::io(&path, e))?;
        file.write_all(artifact.render().as_bytes())
            .map_err(|e| DriftError::io(&path, e))?;

        info!("Wrote migration {}", path.display());
        Ok(path)
    }
}
