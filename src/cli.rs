//! Command-line surface
//!
//! Parses flags, resolves them against the settings and hands a fully
//! configured command to the pipeline.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use schemadrift::config::{Settings, DEFAULT_NAME};
use schemadrift::error::config_error;
use schemadrift::migration::FileMigrationWriter;
use schemadrift::pipeline::{DiffFileCommand, DiffOptions, RunOutcome};
use schemadrift::provider::JsonSchemaProvider;
use schemadrift::schema::TypeRegistry;
use schemadrift::snapshot::SnapshotStore;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "schemadrift")]
#[command(version)]
#[command(
    about = "Generate database migrations from schema snapshots",
    long_about = r#"Compares the schema exported by your ORM tooling with the last recorded
snapshot and generates a reversible migration for the differences.

Snapshots live in <migrations-dir>/SchemaVersion; every generated migration
records a new one.
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Cli {
    /// Settings file (defaults to ./schemadrift.toml when present)
    #[arg(long, global = true, env = "SCHEMADRIFT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a migration by comparing the current schema with the last snapshot
    #[command(name = "diff-file")]
    DiffFile(DiffFileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DiffFileArgs {
    /// Only report whether there are changes; exits with 1 when there are
    #[arg(long)]
    pub check: bool,

    /// Only consider tables whose name matches this regular expression
    #[arg(long, value_name = "RE")]
    pub filter_expression: Option<String>,

    /// Pretty-print long SQL statements
    #[arg(long)]
    pub formatted: bool,

    /// Maximum line length used with --formatted
    #[arg(long, value_name = "N")]
    pub line_length: Option<usize>,

    /// Connection to generate the migration for
    #[arg(long, value_name = "NAME")]
    pub db: Option<String>,

    /// Entity manager providing the schema
    #[arg(long, value_name = "NAME", default_value = DEFAULT_NAME)]
    pub em: String,

    /// Shard of the selected connection
    #[arg(long, value_name = "NAME")]
    pub shard: Option<String>,

    /// JSON schema exported by the ORM tooling
    #[arg(long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Directory receiving migrations and snapshots
    #[arg(long, value_name = "DIR")]
    pub migrations_dir: Option<PathBuf>,
}

/// Exit status when the run fails for any reason
pub const ERROR_EXIT_CODE: u8 = 2;

/// Process exit status: 0 done or nothing to do, 1 drift in check mode, 2 error
pub fn exit_status(result: &Result<RunOutcome>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_code() as u8,
        Err(_) => ERROR_EXIT_CODE,
    }
}

/// Run the selected subcommand
pub fn execute(cli: &Cli) -> Result<RunOutcome> {
    match &cli.command {
        Commands::DiffFile(args) => diff_file(args, cli.config.clone()),
    }
}

fn diff_file(args: &DiffFileArgs, config: Option<PathBuf>) -> Result<RunOutcome> {
    let settings = Settings::load(config.as_deref()).context("Failed to load settings")?;
    let target = settings.resolve_target(&args.em, args.db.as_deref(), args.shard.as_deref())?;
    debug!("Resolved target: {:?}", target);

    let schema_file = args
        .schema
        .clone()
        .or_else(|| target.schema_file.clone())
        .ok_or_else(|| {
            config_error(format!(
                "No schema file for entity manager '{}': pass --schema or set schema_file",
                args.em
            ))
        })?;
    let migrations_dir = args
        .migrations_dir
        .clone()
        .unwrap_or_else(|| settings.migrations_dir.clone());

    let options = DiffOptions {
        dialect: target.dialect,
        filter_expression: args
            .filter_expression
            .clone()
            .or_else(|| target.filter_expression.clone()),
        check: args.check,
        formatted: args.formatted,
        line_length: args.line_length.unwrap_or(settings.line_length),
        migrations_table: settings.migrations_table.clone(),
    };

    let provider = JsonSchemaProvider::new(schema_file);
    let store = SnapshotStore::for_migrations_dir(&migrations_dir);
    let writer = FileMigrationWriter::new(&migrations_dir);
    let registry = TypeRegistry::default();

    let outcome = DiffFileCommand::new(options, &provider, &store, &writer, &registry).run(Utc::now())?;
    Ok(outcome)
}
