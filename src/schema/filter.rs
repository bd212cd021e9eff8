//! Asset filter
//!
//! Restricts the target schema to the tables this tool manages. Only ever
//! applied to the desired schema, never to a loaded snapshot.

use crate::error::{DriftError, DriftResult};
use crate::schema::model::{resolve_table_name, Schema};
use regex::Regex;
use tracing::debug;

/// Table-name filter built from an optional regular expression
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pattern: Option<Regex>,
}

impl AssetFilter {
    /// Compile `expression`; `None` or an empty string retains every table
    pub fn new(expression: Option<&str>) -> DriftResult<Self> {
        let pattern = match expression.map(str::trim) {
            None | Some("") => None,
            Some(expr) => Some(Regex::new(expr).map_err(|e| {
                DriftError::Configuration(format!("Invalid filter expression '{}': {}", expr, e))
            })?),
        };
        Ok(Self { pattern })
    }

    pub fn is_active(&self) -> bool {
        self.pattern.is_some()
    }

    /// Whether a (possibly namespaced) table name is retained
    pub fn matches(&self, table_name: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(resolve_table_name(table_name)),
            None => true,
        }
    }

    /// Drop every table whose bare name does not match; returns how many were dropped
    pub fn apply(&self, schema: &mut Schema) -> usize {
        if !self.is_active() {
            return 0;
        }

        let before = schema.len();
        schema.retain_tables(|table| self.matches(&table.name));
        let dropped = before - schema.len();

        debug!("Asset filter dropped {} of {} tables", dropped, before);
        dropped
    }
}
