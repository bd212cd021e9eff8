//! Diff engine
//!
//! Turns a structural schema diff into an ordered list of DDL statements
//! for one dialect. `diff_down` is the same computation with the two
//! schemas swapped, so applying up then down restores the original shape.

use crate::diff::comparator::{Comparator, SchemaDiff, TableDiff};
use crate::diff::platform::{Dialect, SqlPlatform};
use crate::error::DriftResult;
use crate::schema::{Schema, TypeRegistry};
use tracing::debug;

/// Default name of the table tracking executed migrations
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migration_versions";

/// Result of diffing two schemas in both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Both directions are empty
    NoChanges,
    Changes { up: Vec<String>, down: Vec<String> },
}

impl DiffOutcome {
    pub fn has_changes(&self) -> bool {
        matches!(self, DiffOutcome::Changes { .. })
    }
}

/// Computes forward and backward DDL between two schemas
pub struct DiffEngine<'a> {
    registry: &'a TypeRegistry,
    migrations_table: String,
}

impl<'a> DiffEngine<'a> {
    pub fn new(registry: &'a TypeRegistry, migrations_table: impl Into<String>) -> Self {
        Self {
            registry,
            migrations_table: migrations_table.into(),
        }
    }

    pub fn migrations_table(&self) -> &str {
        &self.migrations_table
    }

    /// Statements migrating a database from `from` to `to`
    pub fn diff_up(&self, from: &Schema, to: &Schema, dialect: Dialect) -> DriftResult<Vec<String>> {
        let diff = Comparator::new(self.registry, dialect).compare(from, to)?;
        let summary = diff.summary();
        debug!(
            "Schema diff: +{} -{} ~{} tables, +{} -{} ~{} columns",
            summary.tables_added,
            summary.tables_removed,
            summary.tables_modified,
            summary.columns_added,
            summary.columns_removed,
            summary.columns_modified
        );

        let platform = SqlPlatform::new(dialect, self.registry);
        let statements = build_statements(&platform, &diff)?;
        Ok(self.exclude_bookkeeping(statements))
    }

    /// Statements reverting what `diff_up` applies
    pub fn diff_down(&self, from: &Schema, to: &Schema, dialect: Dialect) -> DriftResult<Vec<String>> {
        self.diff_up(to, from, dialect)
    }

    /// Both directions at once, with "nothing to do" as its own outcome
    pub fn diff(&self, from: &Schema, to: &Schema, dialect: Dialect) -> DriftResult<DiffOutcome> {
        let up = self.diff_up(from, to, dialect)?;
        let down = self.diff_down(from, to, dialect)?;

        if up.is_empty() && down.is_empty() {
            Ok(DiffOutcome::NoChanges)
        } else {
            Ok(DiffOutcome::Changes { up, down })
        }
    }

    /// Drop every statement that mentions the migrations table
    fn exclude_bookkeeping(&self, statements: Vec<String>) -> Vec<String> {
        let needle = self.migrations_table.to_lowercase();
        if needle.is_empty() {
            return statements;
        }

        statements
            .into_iter()
            .filter(|sql| {
                let keep = !sql.to_lowercase().contains(&needle);
                if !keep {
                    debug!("Skipping bookkeeping statement: {}", sql);
                }
                keep
            })
            .collect()
    }
}

/// Order: namespaces, FK drops, new tables, dropped tables, table alterations,
/// FK additions, namespace drops. Names are sorted within each group.
fn build_statements(platform: &SqlPlatform<'_>, diff: &SchemaDiff) -> DriftResult<Vec<String>> {
    let dialect = platform.dialect();
    let mut sql = Vec::new();

    if dialect.supports_schemas() {
        for namespace in &diff.new_namespaces {
            sql.push(platform.create_namespace(namespace));
        }
    }

    if dialect.supports_alter_table() {
        for table in &diff.removed_tables {
            let mut fks: Vec<_> = table.foreign_keys.iter().collect();
            fks.sort_by(|a, b| a.name.cmp(&b.name));
            for fk in fks {
                sql.push(platform.drop_foreign_key(&table.name, fk));
            }
        }
        for table in &diff.changed_tables {
            for fk in &table.removed_foreign_keys {
                sql.push(platform.drop_foreign_key(table.name(), fk));
            }
            for (old, _) in &table.changed_foreign_keys {
                sql.push(platform.drop_foreign_key(table.name(), old));
            }
        }
    }

    for table in &diff.new_tables {
        sql.extend(platform.create_table(table)?);
    }

    for table in &diff.removed_tables {
        sql.push(platform.drop_table(&table.name));
    }

    for table in &diff.changed_tables {
        sql.extend(alter_table(platform, table)?);
    }

    if dialect.supports_alter_table() {
        for table in &diff.new_tables {
            let mut fks: Vec<_> = table.foreign_keys.iter().collect();
            fks.sort_by(|a, b| a.name.cmp(&b.name));
            for fk in fks {
                sql.push(platform.add_foreign_key(&table.name, fk));
            }
        }
        for table in &diff.changed_tables {
            for fk in &table.added_foreign_keys {
                sql.push(platform.add_foreign_key(table.name(), fk));
            }
            for (_, new) in &table.changed_foreign_keys {
                sql.push(platform.add_foreign_key(table.name(), new));
            }
        }
    }

    if dialect.supports_schemas() {
        for namespace in &diff.removed_namespaces {
            sql.push(platform.drop_namespace(namespace));
        }
    }

    Ok(sql)
}

fn alter_table(platform: &SqlPlatform<'_>, diff: &TableDiff) -> DriftResult<Vec<String>> {
    if platform.requires_rebuild(diff) {
        return platform.rebuild_table(diff);
    }

    let table = &diff.to;
    let mut sql = Vec::new();

    for index in &diff.removed_indexes {
        sql.push(platform.drop_index(&table.name, index));
    }
    for (old, _) in &diff.changed_indexes {
        sql.push(platform.drop_index(&table.name, old));
    }

    if let Some((Some(_), _)) = &diff.primary_key {
        sql.push(platform.drop_primary_key(&diff.from));
    }

    for column in &diff.added_columns {
        sql.push(platform.add_column(table, column)?);
    }
    for column in &diff.changed_columns {
        sql.extend(platform.alter_column(table, column)?);
    }
    for column in &diff.removed_columns {
        sql.push(platform.drop_column(&table.name, &column.name));
    }

    if let Some((_, Some(pk))) = &diff.primary_key {
        if !pk.columns.is_empty() {
            sql.push(platform.add_primary_key(table, &pk.columns));
        }
    }

    for index in &diff.added_indexes {
        sql.push(platform.create_index(&table.name, index));
    }
    for (_, new) in &diff.changed_indexes {
        sql.push(platform.create_index(&table.name, new));
    }

    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ForeignKey, Index, Table};
    use pretty_assertions::assert_eq;

    fn engine(registry: &TypeRegistry) -> DiffEngine<'_> {
        DiffEngine::new(registry, DEFAULT_MIGRATIONS_TABLE)
    }

    fn t_with_id() -> Table {
        Table::new("t").with_column(Column::new("id", "integer"))
    }

    #[test]
    fn test_identical_schemas_produce_no_changes() {
        let registry = TypeRegistry::default();
        let schema = Schema::new().with_table(t_with_id());

        let engine = engine(&registry);
        assert!(engine.diff_up(&schema, &schema, Dialect::PostgreSql).unwrap().is_empty());
        assert!(engine.diff_down(&schema, &schema, Dialect::PostgreSql).unwrap().is_empty());
        assert_eq!(
            engine.diff(&schema, &schema, Dialect::PostgreSql).unwrap(),
            DiffOutcome::NoChanges
        );
    }

    #[test]
    fn test_add_column_up_and_drop_column_down() {
        let registry = TypeRegistry::default();
        let from = Schema::new().with_table(t_with_id());
        let to = Schema::new().with_table(t_with_id().with_column(Column::new("name", "string")));
        let engine = engine(&registry);

        let expected = [
            (
                Dialect::PostgreSql,
                "ALTER TABLE \"t\" ADD \"name\" VARCHAR(255) NOT NULL",
                "ALTER TABLE \"t\" DROP \"name\"",
            ),
            (
                Dialect::MySql,
                "ALTER TABLE `t` ADD `name` VARCHAR(255) NOT NULL",
                "ALTER TABLE `t` DROP `name`",
            ),
            (
                Dialect::Sqlite,
                "ALTER TABLE \"t\" ADD COLUMN \"name\" VARCHAR(255) NOT NULL",
                "ALTER TABLE \"t\" DROP COLUMN \"name\"",
            ),
        ];

        for (dialect, add, drop) in expected {
            let up = engine.diff_up(&from, &to, dialect).unwrap();
            let down = engine.diff_down(&from, &to, dialect).unwrap();

            assert_eq!(up, vec![add], "{dialect}");
            assert_eq!(down, vec![drop], "{dialect}");
        }
    }

    #[test]
    fn test_sqlite_rebuilds_when_dropping_an_indexed_column() {
        let registry = TypeRegistry::default();
        let from = Schema::new().with_table(
            t_with_id()
                .with_column(Column::new("name", "string"))
                .with_index(Index::new("idx_name", ["name"])),
        );
        let to = Schema::new().with_table(t_with_id());

        let up = engine(&registry).diff_up(&from, &to, Dialect::Sqlite).unwrap();

        assert_eq!(
            up,
            vec![
                "DROP INDEX \"idx_name\"",
                "CREATE TEMPORARY TABLE \"__temp__t\" AS SELECT \"id\" FROM \"t\"",
                "DROP TABLE \"t\"",
                "CREATE TABLE \"t\" (\"id\" INTEGER NOT NULL)",
                "INSERT INTO \"t\" (\"id\") SELECT \"id\" FROM \"__temp__t\"",
                "DROP TABLE \"__temp__t\"",
            ]
        );
    }

    #[test]
    fn test_unsigned_toggle_is_silent_where_not_rendered() {
        let registry = TypeRegistry::default();
        let from = Schema::new()
            .with_table(t_with_id().with_column(Column::new("hits", "integer")));
        let to = Schema::new()
            .with_table(t_with_id().with_column(Column::new("hits", "integer").unsigned()));
        let engine = engine(&registry);

        for dialect in [Dialect::PostgreSql, Dialect::Sqlite] {
            assert!(engine.diff_up(&from, &to, dialect).unwrap().is_empty(), "{dialect}");
            assert_eq!(engine.diff(&from, &to, dialect).unwrap(), DiffOutcome::NoChanges);
        }

        assert_eq!(
            engine.diff_up(&from, &to, Dialect::MySql).unwrap(),
            vec!["ALTER TABLE `t` CHANGE `hits` `hits` INT UNSIGNED NOT NULL"]
        );
    }

    #[test]
    fn test_up_then_down_is_a_round_trip() {
        let registry = TypeRegistry::default();
        let from = Schema::new().with_table(t_with_id());
        let to = Schema::new().with_table(t_with_id().with_column(Column::new("name", "string")));
        let engine = engine(&registry);

        // down(from, to) is up(to, from): diffing the reverse pair yields the same plans swapped
        let up = engine.diff_up(&from, &to, Dialect::MySql).unwrap();
        let down = engine.diff_down(&from, &to, Dialect::MySql).unwrap();
        assert_eq!(engine.diff_down(&to, &from, Dialect::MySql).unwrap(), up);
        assert_eq!(engine.diff_up(&to, &from, Dialect::MySql).unwrap(), down);
    }

    #[test]
    fn test_bookkeeping_table_is_never_touched() {
        let registry = TypeRegistry::default();
        let from = Schema::new();
        let to = Schema::new()
            .with_table(t_with_id())
            .with_table(
                Table::new("Migration_Versions")
                    .with_column(Column::new("version", "string").with_length(191))
                    .with_primary_key(["version"]),
            );
        let engine = engine(&registry);

        for dialect in [Dialect::PostgreSql, Dialect::MySql, Dialect::Sqlite] {
            let up = engine.diff_up(&from, &to, dialect).unwrap();
            let down = engine.diff_down(&from, &to, dialect).unwrap();
            assert_eq!(up.len(), 1);
            assert_eq!(down.len(), 1);
            assert!(up
                .iter()
                .chain(down.iter())
                .all(|sql| !sql.to_lowercase().contains("migration_versions")));
        }
    }

    #[test]
    fn test_statement_order_is_stable() {
        let registry = TypeRegistry::default();
        let from = Schema::new()
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "integer"))
                    .with_column(Column::new("legacy", "text").nullable())
                    .with_primary_key(["id"])
                    .with_index(Index::new("idx_legacy", ["legacy"])),
            )
            .with_table(Table::new("old_stuff").with_column(Column::new("id", "integer")));
        let to = Schema::new()
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "integer"))
                    .with_column(Column::new("email", "string").with_length(180))
                    .with_primary_key(["id"])
                    .with_index(Index::new("uniq_email", ["email"]).unique()),
            )
            .with_table(
                Table::new("shop.orders")
                    .with_column(Column::new("id", "integer"))
                    .with_column(Column::new("user_id", "integer"))
                    .with_primary_key(["id"])
                    .with_foreign_key(
                        ForeignKey::new("fk_orders_user", ["user_id"], "users", ["id"])
                            .on_delete("CASCADE"),
                    ),
            );

        let up = engine(&registry)
            .diff_up(&from, &to, Dialect::PostgreSql)
            .unwrap();

        assert_eq!(
            up,
            vec![
                "CREATE SCHEMA \"shop\"",
                "CREATE TABLE \"shop\".\"orders\" (\"id\" INT NOT NULL, \"user_id\" INT NOT NULL, PRIMARY KEY (\"id\"))",
                "DROP TABLE \"old_stuff\"",
                "DROP INDEX \"idx_legacy\"",
                "ALTER TABLE \"users\" ADD \"email\" VARCHAR(180) NOT NULL",
                "ALTER TABLE \"users\" DROP \"legacy\"",
                "CREATE UNIQUE INDEX \"uniq_email\" ON \"users\" (\"email\")",
                "ALTER TABLE \"shop\".\"orders\" ADD CONSTRAINT \"fk_orders_user\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE",
            ]
        );

        let down = engine(&registry)
            .diff_down(&from, &to, Dialect::PostgreSql)
            .unwrap();

        assert_eq!(
            down,
            vec![
                "ALTER TABLE \"shop\".\"orders\" DROP CONSTRAINT \"fk_orders_user\"",
                "CREATE TABLE \"old_stuff\" (\"id\" INT NOT NULL)",
                "DROP TABLE \"shop\".\"orders\"",
                "DROP INDEX \"uniq_email\"",
                "ALTER TABLE \"users\" ADD \"legacy\" TEXT",
                "ALTER TABLE \"users\" DROP \"email\"",
                "CREATE INDEX \"idx_legacy\" ON \"users\" (\"legacy\")",
                "DROP SCHEMA \"shop\"",
            ]
        );
    }

    #[test]
    fn test_sqlite_rebuilds_altered_tables() {
        let registry = TypeRegistry::default();
        let from = Schema::new().with_table(
            t_with_id().with_column(Column::new("name", "string").with_length(50)),
        );
        let to = Schema::new().with_table(
            t_with_id().with_column(Column::new("name", "string").with_length(100)),
        );

        let up = engine(&registry).diff_up(&from, &to, Dialect::Sqlite).unwrap();

        assert_eq!(
            up,
            vec![
                "CREATE TEMPORARY TABLE \"__temp__t\" AS SELECT \"id\", \"name\" FROM \"t\"",
                "DROP TABLE \"t\"",
                "CREATE TABLE \"t\" (\"id\" INTEGER NOT NULL, \"name\" VARCHAR(100) NOT NULL)",
                "INSERT INTO \"t\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"__temp__t\"",
                "DROP TABLE \"__temp__t\"",
            ]
        );
    }

    #[test]
    fn test_sqlite_adds_columns_in_place() {
        let registry = TypeRegistry::default();
        let from = Schema::new().with_table(t_with_id());
        let to = Schema::new()
            .with_table(t_with_id().with_column(Column::new("flag", "boolean").with_default("0")));

        let up = engine(&registry).diff_up(&from, &to, Dialect::Sqlite).unwrap();

        assert_eq!(up, vec!["ALTER TABLE \"t\" ADD COLUMN \"flag\" BOOLEAN DEFAULT 0 NOT NULL"]);
    }
}
