//! Schema providers
//!
//! Sources of the desired schema. Producing a schema from mapped entities
//! is the ORM tooling's job; these adapters only hand its result over.

use crate::error::{DriftError, DriftResult};
use crate::schema::Schema;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supplies the schema the database should end up with
pub trait SchemaProvider {
    fn create_schema(&self) -> DriftResult<Schema>;
}

/// Any closure returning a schema is a provider
impl<F> SchemaProvider for F
where
    F: Fn() -> DriftResult<Schema>,
{
    fn create_schema(&self) -> DriftResult<Schema> {
        self()
    }
}

/// Returns a copy of a captured schema
#[derive(Debug, Clone)]
pub struct FixedSchemaProvider {
    schema: Schema,
}

impl FixedSchemaProvider {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl SchemaProvider for FixedSchemaProvider {
    fn create_schema(&self) -> DriftResult<Schema> {
        Ok(self.schema.clone())
    }
}

/// Reads the schema description exported by the ORM tooling as JSON
#[derive(Debug, Clone)]
pub struct JsonSchemaProvider {
    path: PathBuf,
}

impl JsonSchemaProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchemaProvider for JsonSchemaProvider {
    fn create_schema(&self) -> DriftResult<Schema> {
        let content = fs::read_to_string(&self.path).map_err(|e| DriftError::io(&self.path, e))?;
        let schema: Schema = serde_json::from_str(&content).map_err(|e| {
            DriftError::Configuration(format!(
                "Invalid schema file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Read {} tables from {}", schema.len(), self.path.display());
        Ok(schema)
    }
}
