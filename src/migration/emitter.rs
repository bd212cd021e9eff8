//! Migration emitter
//!
//! Wraps up/down statement lists into a dialect-guarded artifact and
//! renders it as a Rust source file.

use crate::diff::Dialect;
use crate::error::{DriftError, DriftResult};
use crate::migration::runtime::{MigrationAborted, MigrationContext};
use crate::snapshot::VersionId;
use std::fmt::Write;
use tracing::debug;

/// Width of `ctx.add_sql(` plus `);` around every rendered statement
const CODE_OVERHEAD: usize = 14;

/// Indentation of statements inside a generated method body
const INDENTATION: usize = 8;

pub const DEFAULT_LINE_LENGTH: usize = 120;

/// One entry of a migration direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Abort unless the connected platform has exactly this name
    Guard { platform: String },
    Sql(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// A generated migration for one dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub dialect: Dialect,
    pub version: VersionId,
    pub up: Vec<Step>,
    pub down: Vec<Step>,
}

/// Result of emitting a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    NoChanges,
    Artifact(Artifact),
}

impl Artifact {
    /// Name of the generated type and file stem
    pub fn class_name(&self) -> String {
        format!("Version{}", self.version)
    }

    pub fn steps(&self, direction: Direction) -> &[Step] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// Number of SQL statements in both directions
    pub fn statement_count(&self) -> usize {
        self.up
            .iter()
            .chain(self.down.iter())
            .filter(|step| matches!(step, Step::Sql(_)))
            .count()
    }

    /// Run one direction against a context, as the generated code would
    pub fn replay(&self, direction: Direction, ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted> {
        for step in self.steps(direction) {
            match step {
                Step::Guard { platform } => {
                    ctx.abort_if(ctx.platform_name() != platform, &guard_message(platform))?
                }
                Step::Sql(sql) => ctx.add_sql(sql),
            }
        }
        Ok(())
    }

    /// Rust source of the migration
    pub fn render(&self) -> String {
        let class = self.class_name();
        let mut out = String::new();

        let _ = writeln!(out, "//! Auto-generated migration: please modify to your needs!");
        let _ = writeln!(out, "//! Version: {}", self.version);
        let _ = writeln!(out, "//! Platform: {}", self.dialect);
        let _ = writeln!(out);
        let _ = writeln!(out, "use schemadrift::migration::{{Migration, MigrationAborted, MigrationContext}};");
        let _ = writeln!(out);
        let _ = writeln!(out, "pub struct {};", class);
        let _ = writeln!(out);
        let _ = writeln!(out, "impl Migration for {} {{", class);
        let _ = writeln!(out, "    fn version(&self) -> &'static str {{");
        let _ = writeln!(out, "        {:?}", self.version.as_str());
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out);
        render_method(&mut out, "up", &self.up);
        let _ = writeln!(out);
        render_method(&mut out, "down", &self.down);
        let _ = writeln!(out, "}}");

        out
    }
}

fn guard_message(platform: &str) -> String {
    format!("Migration can only be executed safely on '{}'.", platform)
}

fn render_method(out: &mut String, name: &str, steps: &[Step]) {
    let ctx = if steps.is_empty() { "_ctx" } else { "ctx" };
    let _ = writeln!(
        out,
        "    fn {}(&self, {}: &mut dyn MigrationContext) -> Result<(), MigrationAborted> {{",
        name, ctx
    );

    for step in steps {
        match step {
            Step::Guard { platform } => {
                let _ = writeln!(
                    out,
                    "        ctx.abort_if(ctx.platform_name() != {:?}, {:?})?;",
                    platform,
                    guard_message(platform)
                );
                let _ = writeln!(out);
            }
            // Debug formatting yields a valid Rust string literal for any input
            Step::Sql(sql) => {
                let _ = writeln!(out, "        ctx.add_sql({:?});", sql);
            }
        }
    }

    let _ = writeln!(out, "        Ok(())");
    let _ = writeln!(out, "    }}");
}

/// Pretty-printer for long SQL statements
pub trait SqlFormatter {
    fn format(&self, sql: &str) -> String;
}

/// Formatter backed by the `sqlformat` crate
#[cfg(feature = "pretty-sql")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettySql;

#[cfg(feature = "pretty-sql")]
impl SqlFormatter for PrettySql {
    fn format(&self, sql: &str) -> String {
        let options = sqlformat::FormatOptions {
            indent: sqlformat::Indent::Spaces(4),
            ..sqlformat::FormatOptions::default()
        };
        sqlformat::format(sql, &sqlformat::QueryParams::None, options)
    }
}

/// The formatter compiled into this build, if any
pub fn default_formatter() -> Option<Box<dyn SqlFormatter>> {
    #[cfg(feature = "pretty-sql")]
    {
        Some(Box::new(PrettySql))
    }
    #[cfg(not(feature = "pretty-sql"))]
    {
        None
    }
}

/// Builds migration artifacts for one dialect
pub struct MigrationEmitter {
    dialect: Dialect,
    formatted: bool,
    line_length: usize,
    formatter: Option<Box<dyn SqlFormatter>>,
}

impl MigrationEmitter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            formatted: false,
            line_length: DEFAULT_LINE_LENGTH,
            formatter: default_formatter(),
        }
    }

    /// Pretty-print statements that would not fit on one line
    pub fn formatted(mut self, formatted: bool) -> Self {
        self.formatted = formatted;
        self
    }

    pub fn line_length(mut self, line_length: usize) -> Self {
        self.line_length = line_length;
        self
    }

    pub fn with_formatter(mut self, formatter: impl SqlFormatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    pub fn without_formatter(mut self) -> Self {
        self.formatter = None;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Statements longer than this are formatted
    fn max_statement_length(&self) -> usize {
        self.line_length.saturating_sub(CODE_OVERHEAD + INDENTATION)
    }

    /// Fail when formatting is requested but no formatter is available
    pub fn check_formatter(&self) -> DriftResult<()> {
        if self.formatted && self.formatter.is_none() {
            return Err(DriftError::Configuration(
                "Formatting SQL requires the \"pretty-sql\" feature, which is not enabled in this build"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn emit(&self, version: &VersionId, up: &[String], down: &[String]) -> DriftResult<EmitOutcome> {
        if up.is_empty() && down.is_empty() {
            return Ok(EmitOutcome::NoChanges);
        }

        self.check_formatter()?;
        let formatter = if self.formatted {
            self.formatter.as_deref()
        } else {
            None
        };

        let artifact = Artifact {
            dialect: self.dialect,
            version: version.clone(),
            up: self.direction(up, formatter),
            down: self.direction(down, formatter),
        };

        debug!(
            "Emitted migration {} with {} statements",
            artifact.class_name(),
            artifact.statement_count()
        );

        Ok(EmitOutcome::Artifact(artifact))
    }

    fn direction(&self, statements: &[String], formatter: Option<&dyn SqlFormatter>) -> Vec<Step> {
        if statements.is_empty() {
            return Vec::new();
        }

        let max = self.max_statement_length();
        let mut steps = Vec::with_capacity(statements.len() + 1);
        steps.push(Step::Guard {
            platform: self.dialect.name().to_string(),
        });
        steps.extend(statements.iter().map(|sql| match formatter {
            Some(f) if sql.len() > max => Step::Sql(f.format(sql)),
            _ => Step::Sql(sql.clone()),
        }));
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::runtime::RecordingContext;
    use pretty_assertions::assert_eq;

    struct Shouting;

    impl SqlFormatter for Shouting {
        fn format(&self, sql: &str) -> String {
            format!("{}\n-- formatted", sql)
        }
    }

    fn version() -> VersionId {
        VersionId::parse("20240301100000").unwrap()
    }

    fn up() -> Vec<String> {
        vec!["ALTER TABLE \"t\" ADD \"name\" VARCHAR(255) NOT NULL".to_string()]
    }

    fn down() -> Vec<String> {
        vec!["ALTER TABLE \"t\" DROP \"name\"".to_string()]
    }

    fn artifact(outcome: EmitOutcome) -> Artifact {
        match outcome {
            EmitOutcome::Artifact(artifact) => artifact,
            EmitOutcome::NoChanges => panic!("expected an artifact"),
        }
    }

    #[test]
    fn test_empty_statements_are_no_changes() {
        let emitter = MigrationEmitter::new(Dialect::PostgreSql);
        assert_eq!(emitter.emit(&version(), &[], &[]).unwrap(), EmitOutcome::NoChanges);
    }

    #[test]
    fn test_each_direction_starts_with_guard() {
        let emitter = MigrationEmitter::new(Dialect::PostgreSql);
        let artifact = artifact(emitter.emit(&version(), &up(), &down()).unwrap());

        assert_eq!(
            artifact.up,
            vec![
                Step::Guard { platform: "postgresql".to_string() },
                Step::Sql(up()[0].clone()),
            ]
        );
        assert_eq!(artifact.down[0], Step::Guard { platform: "postgresql".to_string() });
        assert_eq!(artifact.statement_count(), 2);
    }

    #[test]
    fn test_replay_honours_guard() {
        let emitter = MigrationEmitter::new(Dialect::MySql);
        let artifact = artifact(emitter.emit(&version(), &up(), &down()).unwrap());

        let mut mysql = RecordingContext::new("mysql");
        artifact.replay(Direction::Down, &mut mysql).unwrap();
        assert_eq!(mysql.into_statements(), down());

        let mut postgres = RecordingContext::new("postgresql");
        assert!(artifact.replay(Direction::Up, &mut postgres).is_err());
        assert!(postgres.statements().is_empty());
    }

    #[test]
    fn test_render_escapes_sql_literals() {
        let tricky = "INSERT INTO \"t\" VALUES ('a\\b', \"c\")\n-- done".to_string();
        let emitter = MigrationEmitter::new(Dialect::Sqlite);
        let artifact = artifact(emitter.emit(&version(), &[tricky], &[]).unwrap());

        let source = artifact.render();

        assert!(source.contains("pub struct Version20240301100000;"));
        assert!(source.contains(
            "        ctx.abort_if(ctx.platform_name() != \"sqlite\", \
             \"Migration can only be executed safely on 'sqlite'.\")?;"
        ));
        assert!(source.contains(
            r#"        ctx.add_sql("INSERT INTO \"t\" VALUES ('a\\b', \"c\")\n-- done");"#
        ));
    }

    #[test]
    fn test_render_empty_direction_has_no_guard() {
        let emitter = MigrationEmitter::new(Dialect::Sqlite);
        let artifact = artifact(emitter.emit(&version(), &up(), &[]).unwrap());

        let source = artifact.render();

        assert_eq!(source.matches("abort_if").count(), 1);
        assert!(source.contains(
            "    fn up(&self, ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted> {"
        ));
        assert!(source.contains(
            "    fn down(&self, _ctx: &mut dyn MigrationContext) -> Result<(), MigrationAborted> {\n        Ok(())\n    }"
        ));
    }

    #[test]
    fn test_only_long_statements_are_formatted() {
        let long = format!("SELECT {} FROM t", vec!["col"; 40].join(", "));
        let emitter = MigrationEmitter::new(Dialect::PostgreSql)
            .with_formatter(Shouting)
            .formatted(true)
            .line_length(80);

        let artifact = artifact(emitter.emit(&version(), &[long.clone()], &down()).unwrap());

        assert_eq!(artifact.up[1], Step::Sql(format!("{}\n-- formatted", long)));
        assert_eq!(artifact.down[1], Step::Sql(down()[0].clone()));
    }

    #[test]
    fn test_formatting_without_formatter_is_configuration_error() {
        let emitter = MigrationEmitter::new(Dialect::PostgreSql)
            .without_formatter()
            .formatted(true);

        let err = emitter.emit(&version(), &up(), &down()).unwrap_err();
        assert!(matches!(err, DriftError::Configuration(_)));
    }

    #[cfg(feature = "pretty-sql")]
    #[test]
    fn test_pretty_sql_breaks_long_statements() {
        let sql = "SELECT a, b FROM t WHERE a = 1";
        assert!(PrettySql.format(sql).contains('\n'));
    }
}
