//! Migration runtime contract
//!
//! Generated migration files implement [`Migration`] and talk to the
//! executing runtime only through [`MigrationContext`].

use thiserror::Error;

/// Raised by a guard when a migration must not run on the connected database
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Migration aborted: {0}")]
pub struct MigrationAborted(pub String);

/// What a migration sees of the runtime executing it
pub trait MigrationContext {
    /// Dialect name of the connected database, e.g. `postgresql`
    fn platform_name(&self) -> &str;

    /// Queue one SQL statement
    fn add_sql(&mut self, sql: &str);

    fn abort_if(&self, condition: bool, message: &str) -> Result<(), MigrationAborted> {
        if condition {
            Err(MigrationAborted(message.to_string()))
        } else {
            Ok(())
        }
    }
}

/// A generated, reversible migration
pub trait Migration {
    fn version(&self) -> &'static str;

    fn up(&self, ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted>;

    fn down(&self, ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted>;
}

/// Context that only records the statements it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingContext {
    platform: String,
    statements: Vec<String>,
}

impl RecordingContext {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            statements: Vec::new(),
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

impl MigrationContext for RecordingContext {
    fn platform_name(&self) -> &str {
        &self.platform
    }

    fn add_sql(&mut self, sql: &str) {
        self.statements.push(sql.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddEmail;

    impl Migration for AddEmail {
        fn version(&self) -> &'static str {
            "20240301100000"
        }

        fn up(&self, ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted> {
            ctx.abort_if(ctx.platform_name() != "sqlite", "Migration can only be executed safely on 'sqlite'.")?;
            ctx.add_sql("ALTER TABLE \"users\" ADD COLUMN \"email\" VARCHAR(255) NOT NULL");
            Ok(())
        }

        fn down(&self, ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted> {
            ctx.add_sql("ALTER TABLE \"users\" DROP \"email\"");
            Ok(())
        }
    }

    #[test]
    fn test_guard_passes_on_matching_platform() {
        let mut ctx = RecordingContext::new("sqlite");
        AddEmail.up(&mut ctx).unwrap();
        assert_eq!(ctx.statements().len(), 1);
    }

    #[test]
    fn test_guard_aborts_on_other_platform() {
        let mut ctx = RecordingContext::new("mysql");
        let err = AddEmail.up(&mut ctx).unwrap_err();
        assert_eq!(err.0, "Migration can only be executed safely on 'sqlite'.");
        assert!(ctx.statements().is_empty());
    }
}
