//! SQL platforms
//!
//! Generates dialect-specific DDL statements for individual schema changes.

use crate::diff::comparator::{ColumnDiff, ColumnProperty, TableDiff};
use crate::error::{DriftError, DriftResult};
use crate::schema::{Column, ForeignKey, Index, Table, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSql,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Platform name reported by a connected database
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::PostgreSql => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Whether tables can live in separate namespaces (`CREATE SCHEMA`)
    pub fn supports_schemas(&self) -> bool {
        matches!(self, Dialect::PostgreSql)
    }

    /// Whether columns, keys and constraints can be altered in place
    pub fn supports_alter_table(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether numeric columns can be declared `UNSIGNED`
    pub fn supports_unsigned(&self) -> bool {
        matches!(self, Dialect::MySql)
    }

    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quote a possibly namespaced table name
    pub fn quote_table(&self, name: &str) -> String {
        match self {
            Dialect::Sqlite => self.quote_identifier(&name.replace('.', "__")),
            _ => name
                .split('.')
                .map(|part| self.quote_identifier(part))
                .collect::<Vec<_>>()
                .join("."),
        }
    }

    fn quote_columns(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = DriftError;

    /// Accepts platform names and URL schemes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pgsql" | "pdo_pgsql" => Ok(Dialect::PostgreSql),
            "mysql" | "mariadb" | "pdo_mysql" => Ok(Dialect::MySql),
            "sqlite" | "sqlite3" | "pdo_sqlite" => Ok(Dialect::Sqlite),
            other => Err(DriftError::Configuration(format!(
                "Unsupported database platform '{}'",
                other
            ))),
        }
    }
}

/// DDL generator for one dialect
pub struct SqlPlatform<'a> {
    dialect: Dialect,
    registry: &'a TypeRegistry,
}

impl<'a> SqlPlatform<'a> {
    pub fn new(dialect: Dialect, registry: &'a TypeRegistry) -> Self {
        Self { dialect, registry }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn q(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    fn qt(&self, table: &str) -> String {
        self.dialect.quote_table(table)
    }

    /// Native type of a column, without constraints
    fn type_declaration(&self, table: &str, column: &Column) -> DriftResult<String> {
        let ty = self.registry.type_of(table, column)?;
        Ok(ty.sql_declaration(column, self.dialect))
    }

    /// Full column definition: name, type, nullability, default, identity
    pub fn column_definition(&self, table: &Table, column: &Column) -> DriftResult<String> {
        let mut def = format!(
            "{} {}",
            self.q(&column.name),
            self.type_declaration(&table.name, column)?
        );

        if self.dialect == Dialect::Sqlite && self.is_inline_primary_key(table, column) {
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
            return Ok(def);
        }

        if let Some(ref default) = column.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }

        if !column.nullable {
            def.push_str(" NOT NULL");
        }

        if column.autoincrement {
            match self.dialect {
                Dialect::PostgreSql => def.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
                Dialect::MySql => def.push_str(" AUTO_INCREMENT"),
                Dialect::Sqlite => {}
            }
        }

        Ok(def)
    }

    /// SQLite declares an autoincrement key inline on its single column
    fn is_inline_primary_key(&self, table: &Table, column: &Column) -> bool {
        column.autoincrement
            && table
                .primary_key
                .as_ref()
                .is_some_and(|pk| pk.columns.len() == 1 && pk.columns[0] == column.name)
    }

    /// CREATE TABLE followed by the table's indexes
    pub fn create_table(&self, table: &Table) -> DriftResult<Vec<String>> {
        let mut parts = Vec::with_capacity(table.columns.len() + 1);
        for column in &table.columns {
            parts.push(self.column_definition(table, column)?);
        }

        if let Some(ref pk) = table.primary_key {
            let inline = self.dialect == Dialect::Sqlite
                && table
                    .columns
                    .iter()
                    .any(|c| self.is_inline_primary_key(table, c));
            if !inline && !pk.columns.is_empty() {
                parts.push(format!(
                    "PRIMARY KEY ({})",
                    self.dialect.quote_columns(&pk.columns)
                ));
            }
        }

        // SQLite cannot add constraints later, so they go inline
        if self.dialect == Dialect::Sqlite {
            let mut fks: Vec<&ForeignKey> = table.foreign_keys.iter().collect();
            fks.sort_by(|a, b| a.name.cmp(&b.name));
            for fk in fks {
                parts.push(self.foreign_key_definition(fk));
            }
        }

        let mut sql = format!("CREATE TABLE {} ({})", self.qt(&table.name), parts.join(", "));
        if self.dialect == Dialect::MySql {
            sql.push_str(" DEFAULT CHARACTER SET utf8mb4 COLLATE `utf8mb4_unicode_ci` ENGINE = InnoDB");
        }

        let mut statements = vec![sql];
        let mut indexes: Vec<&Index> = table.indexes.iter().collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        for index in indexes {
            statements.push(self.create_index(&table.name, index));
        }

        Ok(statements)
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.qt(table))
    }

    pub fn create_namespace(&self, namespace: &str) -> String {
        format!("CREATE SCHEMA {}", self.q(namespace))
    }

    pub fn drop_namespace(&self, namespace: &str) -> String {
        format!("DROP SCHEMA {}", self.q(namespace))
    }

    pub fn add_column(&self, table: &Table, column: &Column) -> DriftResult<String> {
        let keyword = if self.dialect == Dialect::Sqlite { "ADD COLUMN" } else { "ADD" };
        Ok(format!(
            "ALTER TABLE {} {} {}",
            self.qt(&table.name),
            keyword,
            self.column_definition(table, column)?
        ))
    }

    pub fn drop_column(&self, table: &str, column: &str) -> String {
        let keyword = if self.dialect == Dialect::Sqlite { "DROP COLUMN" } else { "DROP" };
        format!("ALTER TABLE {} {} {}", self.qt(table), keyword, self.q(column))
    }

    /// Statements altering a column in place
    pub fn alter_column(&self, table: &Table, diff: &ColumnDiff) -> DriftResult<Vec<String>> {
        let table_name = self.qt(&table.name);
        let column = self.q(&diff.to.name);

        if self.dialect == Dialect::MySql {
            return Ok(vec![format!(
                "ALTER TABLE {} CHANGE {} {}",
                table_name,
                column,
                self.column_definition(table, &diff.to)?
            )]);
        }

        let mut statements = Vec::new();
        let prefix = format!("ALTER TABLE {} ALTER {}", table_name, column);

        if diff.declaration_changed() {
            statements.push(format!(
                "{} TYPE {}",
                prefix,
                self.type_declaration(&table.name, &diff.to)?
            ));
        }

        if diff.has_changed(ColumnProperty::Default) {
            match diff.to.default {
                Some(ref default) => statements.push(format!("{} SET DEFAULT {}", prefix, default)),
                None => statements.push(format!("{} DROP DEFAULT", prefix)),
            }
        }

        if diff.has_changed(ColumnProperty::Nullable) {
            let action = if diff.to.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            statements.push(format!("{} {}", prefix, action));
        }

        if diff.has_changed(ColumnProperty::Autoincrement) {
            let action = if diff.to.autoincrement {
                "ADD GENERATED BY DEFAULT AS IDENTITY"
            } else {
                "DROP IDENTITY"
            };
            statements.push(format!("{} {}", prefix, action));
        }

        Ok(statements)
    }

    pub fn create_index(&self, table: &str, index: &Index) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.q(&index.name),
            self.qt(table),
            self.dialect.quote_columns(&index.columns)
        )
    }

    pub fn drop_index(&self, table: &str, index: &Index) -> String {
        match self.dialect {
            Dialect::MySql => format!("DROP INDEX {} ON {}", self.q(&index.name), self.qt(table)),
            Dialect::PostgreSql => {
                // Postgres indexes live in the table's namespace
                let qualified = match table.find('.') {
                    Some(pos) => format!("{}.{}", &table[..pos], index.name),
                    None => index.name.clone(),
                };
                format!("DROP INDEX {}", self.qt(&qualified))
            }
            Dialect::Sqlite => format!("DROP INDEX {}", self.q(&index.name)),
        }
    }

    pub fn drop_primary_key(&self, table: &Table) -> String {
        match self.dialect {
            Dialect::MySql => format!("ALTER TABLE {} DROP PRIMARY KEY", self.qt(&table.name)),
            _ => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qt(&table.name),
                self.q(&format!("{}_pkey", table.bare_name()))
            ),
        }
    }

    pub fn add_primary_key(&self, table: &Table, columns: &[String]) -> String {
        format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            self.qt(&table.name),
            self.dialect.quote_columns(columns)
        )
    }

    fn foreign_key_definition(&self, fk: &ForeignKey) -> String {
        let mut def = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.q(&fk.name),
            self.dialect.quote_columns(&fk.columns),
            self.qt(&fk.foreign_table),
            self.dialect.quote_columns(&fk.foreign_columns)
        );

        if let Some(ref on_delete) = fk.on_delete {
            def.push_str(&format!(" ON DELETE {}", on_delete));
        }

        if let Some(ref on_update) = fk.on_update {
            def.push_str(&format!(" ON UPDATE {}", on_update));
        }

        def
    }

    pub fn add_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.qt(table),
            self.foreign_key_definition(fk)
        )
    }

    pub fn drop_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        match self.dialect {
            Dialect::MySql => format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                self.qt(table),
                self.q(&fk.name)
            ),
            _ => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qt(table),
                self.q(&fk.name)
            ),
        }
    }

    /// Whether a table diff can only be applied by rebuilding the table
    pub fn requires_rebuild(&self, diff: &TableDiff) -> bool {
        !self.dialect.supports_alter_table()
            && (!diff.changed_columns.is_empty()
                || diff.primary_key.is_some()
                || diff.foreign_keys_changed()
                || diff
                    .removed_columns
                    .iter()
                    .any(|c| is_constrained(&diff.from, &c.name)))
    }

    /// Copy the data aside, recreate the table with its new definition and copy it back
    pub fn rebuild_table(&self, diff: &TableDiff) -> DriftResult<Vec<String>> {
        let temp = self.q(&format!("__temp__{}", diff.to.name.replace('.', "__")));
        let shared: Vec<String> = diff
            .to
            .columns
            .iter()
            .filter(|c| diff.from.column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect();
        let shared = self.dialect.quote_columns(&shared);
        let copy_data = !shared.is_empty();

        let mut statements: Vec<String> = diff
            .from
            .indexes
            .iter()
            .map(|index| self.drop_index(&diff.from.name, index))
            .collect();

        if copy_data {
            statements.push(format!(
                "CREATE TEMPORARY TABLE {} AS SELECT {} FROM {}",
                temp,
                shared,
                self.qt(&diff.from.name)
            ));
        }
        statements.push(self.drop_table(&diff.from.name));

        let mut create = self.create_table(&diff.to)?.into_iter();
        statements.extend(create.next());
        if copy_data {
            statements.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.qt(&diff.to.name),
                shared,
                shared,
                temp
            ));
            statements.push(format!("DROP TABLE {}", temp));
        }
        // remaining statements recreate the indexes
        statements.extend(create);

        Ok(statements)
    }
}

/// SQLite refuses `DROP COLUMN` on columns used by a key, an index or a foreign key
fn is_constrained(table: &Table, column: &str) -> bool {
    let named = |columns: &[String]| columns.iter().any(|c| c == column);
    table.primary_key.as_ref().is_some_and(|pk| named(&pk.columns))
        || table.indexes.iter().any(|i| named(&i.columns))
        || table.foreign_keys.iter().any(|fk| named(&fk.columns))
}
