//! Diff-file command
//!
//! One run of the tool: load the baseline snapshot, compare it with the
//! desired schema and either report drift (check mode) or write a
//! migration followed by a new snapshot (generate mode).

use crate::diff::{DiffEngine, DiffOutcome, Dialect, DEFAULT_MIGRATIONS_TABLE};
use crate::error::DriftResult;
use crate::migration::{EmitOutcome, MigrationEmitter, MigrationWriter, DEFAULT_LINE_LENGTH};
use crate::provider::SchemaProvider;
use crate::schema::{reconcile, AssetFilter, TypeRegistry};
use crate::snapshot::{SnapshotStore, VersionId};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Knobs of a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub dialect: Dialect,
    pub filter_expression: Option<String>,
    /// Only report whether changes exist; never writes anything
    pub check: bool,
    pub formatted: bool,
    pub line_length: usize,
    pub migrations_table: String,
}

impl DiffOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            filter_expression: None,
            check: false,
            formatted: false,
            line_length: DEFAULT_LINE_LENGTH,
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NoChanges,
    /// Check mode found differences
    ChangesDetected,
    Generated {
        version: VersionId,
        migration_path: PathBuf,
        snapshot_path: PathBuf,
    },
}

impl RunOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::ChangesDetected => 1,
            RunOutcome::NoChanges | RunOutcome::Generated { .. } => 0,
        }
    }
}

/// Generate or check a migration from schema differences
pub struct DiffFileCommand<'a> {
    options: DiffOptions,
    provider: &'a dyn SchemaProvider,
    store: &'a SnapshotStore,
    writer: &'a dyn MigrationWriter,
    registry: &'a TypeRegistry,
    emitter: MigrationEmitter,
}

impl<'a> DiffFileCommand<'a> {
    pub fn new(
        options: DiffOptions,
        provider: &'a dyn SchemaProvider,
        store: &'a SnapshotStore,
        writer: &'a dyn MigrationWriter,
        registry: &'a TypeRegistry,
    ) -> Self {
        let emitter = MigrationEmitter::new(options.dialect)
            .formatted(options.formatted)
            .line_length(options.line_length);

        Self {
            options,
            provider,
            store,
            writer,
            registry,
            emitter,
        }
    }

    /// Replace the emitter, e.g. to inject a different SQL formatter
    pub fn with_emitter(mut self, emitter: MigrationEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Run the command; `now` seeds the version id of a generated migration
    pub fn run(&self, now: DateTime<Utc>) -> DriftResult<RunOutcome> {
        // Configuration problems surface before anything is read
        let filter = AssetFilter::new(self.options.filter_expression.as_deref())?;
        self.emitter.check_formatter()?;

        let mut from = self.store.load_latest()?;
        let rewritten = reconcile(&mut from, self.registry)?;
        debug!("Reconciled {} column types of the stored snapshot", rewritten);

        let mut to = self.provider.create_schema()?;
        reconcile(&mut to, self.registry)?;
        filter.apply(&mut to);

        let engine = DiffEngine::new(self.registry, self.options.migrations_table.clone());
        let (up, down) = match engine.diff(&from, &to, self.options.dialect)? {
            DiffOutcome::NoChanges => {
                info!("No changes detected in the mapping information");
                return Ok(RunOutcome::NoChanges);
            }
            DiffOutcome::Changes { up, down } => (up, down),
        };

        if self.options.check {
            warn!(
                "Changes detected in the mapping information: {} up, {} down statements",
                up.len(),
                down.len()
            );
            return Ok(RunOutcome::ChangesDetected);
        }

        let version = self.store.next_version(now)?;
        let artifact = match self.emitter.emit(&version, &up, &down)? {
            EmitOutcome::NoChanges => return Ok(RunOutcome::NoChanges),
            EmitOutcome::Artifact(artifact) => artifact,
        };

        // The snapshot is the last write so a failed run leaves the history untouched
        let migration_path = self.writer.write(&artifact)?;
        let snapshot_path = self.store.save(&to, &version)?;

        info!(
            "Generated migration {} from schema differences",
            migration_path.display()
        );

        Ok(RunOutcome::Generated {
            version,
            migration_path,
            snapshot_path,
        })
    }
}
