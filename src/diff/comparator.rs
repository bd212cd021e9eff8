//! Schema comparator
//!
//! Detects what changed between two schemas. The result is purely
//! structural; turning it into DDL is the platform's job.

use crate::diff::platform::Dialect;
use crate::error::DriftResult;
use crate::schema::{Column, ForeignKey, Index, PrimaryKey, Schema, Table, TypeRegistry};
use std::collections::{BTreeMap, BTreeSet};

/// Column attributes that can differ between two versions of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnProperty {
    Type,
    Nullable,
    Default,
    Length,
    Precision,
    Scale,
    Unsigned,
    Autoincrement,
}

/// A column present on both sides with different attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDiff {
    pub from: Column,
    pub to: Column,
    pub changed: BTreeSet<ColumnProperty>,
}

impl ColumnDiff {
    pub fn has_changed(&self, property: ColumnProperty) -> bool {
        self.changed.contains(&property)
    }

    /// Type, length, precision, scale or signedness changed
    pub fn declaration_changed(&self) -> bool {
        self.changed.iter().any(|p| {
            matches!(
                p,
                ColumnProperty::Type
                    | ColumnProperty::Length
                    | ColumnProperty::Precision
                    | ColumnProperty::Scale
                    | ColumnProperty::Unsigned
            )
        })
    }
}

/// Changes within one table that exists on both sides
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    pub from: Table,
    pub to: Table,
    pub added_columns: Vec<Column>,
    pub changed_columns: Vec<ColumnDiff>,
    pub removed_columns: Vec<Column>,
    pub added_indexes: Vec<Index>,
    /// (old, new) pairs of indexes whose definition changed
    pub changed_indexes: Vec<(Index, Index)>,
    pub removed_indexes: Vec<Index>,
    /// Set when the primary key definition changed: (old, new)
    pub primary_key: Option<(Option<PrimaryKey>, Option<PrimaryKey>)>,
    pub added_foreign_keys: Vec<ForeignKey>,
    pub changed_foreign_keys: Vec<(ForeignKey, ForeignKey)>,
    pub removed_foreign_keys: Vec<ForeignKey>,
}

impl TableDiff {
    pub fn name(&self) -> &str {
        &self.to.name
    }

    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.changed_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.primary_key.is_none()
            && self.added_foreign_keys.is_empty()
            && self.changed_foreign_keys.is_empty()
            && self.removed_foreign_keys.is_empty()
    }

    pub fn foreign_keys_changed(&self) -> bool {
        !self.added_foreign_keys.is_empty()
            || !self.changed_foreign_keys.is_empty()
            || !self.removed_foreign_keys.is_empty()
    }
}

/// Complete structural diff between two schemas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub new_namespaces: Vec<String>,
    pub removed_namespaces: Vec<String>,
    pub new_tables: Vec<Table>,
    pub removed_tables: Vec<Table>,
    pub changed_tables: Vec<TableDiff>,
}

/// Summary statistics for the diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_removed: usize,
    pub tables_modified: usize,
    pub columns_added: usize,
    pub columns_removed: usize,
    pub columns_modified: usize,
    pub indexes_added: usize,
    pub indexes_removed: usize,
    pub fks_added: usize,
    pub fks_removed: usize,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.new_namespaces.is_empty()
            && self.removed_namespaces.is_empty()
            && self.new_tables.is_empty()
            && self.removed_tables.is_empty()
            && self.changed_tables.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary {
            tables_added: self.new_tables.len(),
            tables_removed: self.removed_tables.len(),
            tables_modified: self.changed_tables.len(),
            ..DiffSummary::default()
        };

        for table in &self.changed_tables {
            summary.columns_added += table.added_columns.len();
            summary.columns_removed += table.removed_columns.len();
            summary.columns_modified += table.changed_columns.len();
            summary.indexes_added += table.added_indexes.len() + table.changed_indexes.len();
            summary.indexes_removed += table.removed_indexes.len() + table.changed_indexes.len();
            summary.fks_added += table.added_foreign_keys.len() + table.changed_foreign_keys.len();
            summary.fks_removed +=
                table.removed_foreign_keys.len() + table.changed_foreign_keys.len();
        }

        summary
    }
}

/// Compares schemas using a type registry to decide which attributes matter.
/// Attributes the target dialect cannot express are not compared.
pub struct Comparator<'a> {
    registry: &'a TypeRegistry,
    dialect: Dialect,
}

impl<'a> Comparator<'a> {
    pub fn new(registry: &'a TypeRegistry, dialect: Dialect) -> Self {
        Self { registry, dialect }
    }

    /// Compare two schemas and return all differences, sorted by name
    pub fn compare(&self, from: &Schema, to: &Schema) -> DriftResult<SchemaDiff> {
        let mut diff = SchemaDiff::default();

        let from_namespaces = from.namespaces();
        let to_namespaces = to.namespaces();
        diff.new_namespaces = to_namespaces.difference(&from_namespaces).cloned().collect();
        diff.removed_namespaces = from_namespaces.difference(&to_namespaces).cloned().collect();

        for table in to.tables() {
            match from.table(&table.name) {
                None => diff.new_tables.push(table.clone()),
                Some(from_table) => {
                    let table_diff = self.diff_table(from_table, table)?;
                    if !table_diff.is_empty() {
                        diff.changed_tables.push(table_diff);
                    }
                }
            }
        }

        diff.removed_tables = from
            .tables()
            .filter(|t| !to.has_table(&t.name))
            .cloned()
            .collect();

        Ok(diff)
    }

    fn diff_table(&self, from: &Table, to: &Table) -> DriftResult<TableDiff> {
        let mut diff = TableDiff {
            from: from.clone(),
            to: to.clone(),
            added_columns: Vec::new(),
            changed_columns: Vec::new(),
            removed_columns: Vec::new(),
            added_indexes: Vec::new(),
            changed_indexes: Vec::new(),
            removed_indexes: Vec::new(),
            primary_key: None,
            added_foreign_keys: Vec::new(),
            changed_foreign_keys: Vec::new(),
            removed_foreign_keys: Vec::new(),
        };

        // Columns keep table order so generated statements follow the mapping
        for column in &to.columns {
            match from.column(&column.name) {
                None => diff.added_columns.push(column.clone()),
                Some(old) => {
                    let changed = self.compare_columns(&to.name, old, column)?;
                    if !changed.is_empty() {
                        diff.changed_columns.push(ColumnDiff {
                            from: old.clone(),
                            to: column.clone(),
                            changed,
                        });
                    }
                }
            }
        }
        diff.removed_columns = from
            .columns
            .iter()
            .filter(|c| to.column(&c.name).is_none())
            .cloned()
            .collect();

        let (added, changed, removed) = diff_named(&from.indexes, &to.indexes, |i| &i.name);
        diff.added_indexes = added;
        diff.changed_indexes = changed;
        diff.removed_indexes = removed;

        if from.primary_key != to.primary_key {
            diff.primary_key = Some((from.primary_key.clone(), to.primary_key.clone()));
        }

        let (added, changed, removed) =
            diff_named(&from.foreign_keys, &to.foreign_keys, |f| &f.name);
        diff.added_foreign_keys = added;
        diff.changed_foreign_keys = changed;
        diff.removed_foreign_keys = removed;

        Ok(diff)
    }

    fn compare_columns(
        &self,
        table: &str,
        from: &Column,
        to: &Column,
    ) -> DriftResult<BTreeSet<ColumnProperty>> {
        let mut changed = BTreeSet::new();

        let from_type = self.registry.type_of(table, from)?;
        let to_type = self.registry.type_of(table, to)?;

        if from_type.code() != to_type.code() {
            changed.insert(ColumnProperty::Type);
        }
        if from.nullable != to.nullable {
            changed.insert(ColumnProperty::Nullable);
        }
        if from.default != to.default {
            changed.insert(ColumnProperty::Default);
        }
        if from.unsigned != to.unsigned
            && to_type.is_numeric()
            && self.dialect.supports_unsigned()
        {
            changed.insert(ColumnProperty::Unsigned);
        }
        if from.autoincrement != to.autoincrement {
            changed.insert(ColumnProperty::Autoincrement);
        }

        // Length only matters for types that declare one; unset means the type default
        if let Some(default_length) = to_type.default_length() {
            let old = from.length.unwrap_or(default_length);
            let new = to.length.unwrap_or(default_length);
            if old != new {
                changed.insert(ColumnProperty::Length);
            }
        }

        if to_type.uses_precision() {
            if from.precision != to.precision {
                changed.insert(ColumnProperty::Precision);
            }
            if from.scale != to.scale {
                changed.insert(ColumnProperty::Scale);
            }
        }

        Ok(changed)
    }
}

/// Split two named collections into (added, changed, removed), each sorted by name
fn diff_named<T, F>(from: &[T], to: &[T], name: F) -> (Vec<T>, Vec<(T, T)>, Vec<T>)
where
    T: Clone + PartialEq,
    F: Fn(&T) -> &String,
{
    let from_map: BTreeMap<&String, &T> = from.iter().map(|item| (name(item), item)).collect();
    let to_map: BTreeMap<&String, &T> = to.iter().map(|item| (name(item), item)).collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for (key, new) in &to_map {
        match from_map.get(key) {
            None => added.push((*new).clone()),
            Some(old) if old != new => changed.push(((*old).clone(), (*new).clone())),
            Some(_) => {}
        }
    }

    let removed = from_map
        .iter()
        .filter(|(key, _)| !to_map.contains_key(*key))
        .map(|(_, item)| (*item).clone())
        .collect();

    (added, changed, removed)
}
