//! Schema model
//!
//! In-memory description of a database schema: tables keyed by their
//! (optionally namespaced) name, each with columns, keys and indexes.
//! Column types are referenced by their registry code, never by a
//! dialect-specific type name.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Stable code of a registered logical type (e.g. `integer`, `string`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeCode(String);

impl TypeCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl Borrow<str> for TypeCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complete schema: a set of tables with unique qualified names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema", into = "RawSchema")]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}

/// Wire shape of a schema; uniqueness is checked on the way in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawSchema {
    #[serde(default)]
    tables: Vec<Table>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = String;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        let mut schema = Schema::new();
        for table in raw.tables {
            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(format!(
                        "duplicate column '{}' in table '{}'",
                        column.name, table.name
                    ));
                }
            }
            if schema.tables.contains_key(&table.name) {
                return Err(format!("duplicate table '{}'", table.name));
            }
            schema.tables.insert(table.name.clone(), table);
        }
        Ok(schema)
    }
}

impl From<Schema> for RawSchema {
    fn from(schema: Schema) -> Self {
        RawSchema {
            tables: schema.tables.into_values().collect(),
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table insertion
    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Insert a table, replacing any table with the same qualified name
    pub fn add_table(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name.clone(), table)
    }

    pub fn drop_table(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables.values_mut()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Keep only the tables for which `keep` returns true
    pub fn retain_tables(&mut self, mut keep: impl FnMut(&Table) -> bool) {
        self.tables.retain(|_, table| keep(table));
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Namespaces referenced by namespaced table names
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.tables
            .values()
            .filter_map(|t| t.namespace().map(str::to_string))
            .collect()
    }
}

/// Strip an optional `namespace.` prefix from a qualified table name
pub fn resolve_table_name(name: &str) -> &str {
    match name.find('.') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Table representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Qualified name, `namespace.table` or `table`
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add a column, replacing an existing column of the same name in place
    pub fn with_column(mut self, column: Column) -> Self {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(PrimaryKey {
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.retain(|i| i.name != index.name);
        self.indexes.push(index);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.retain(|f| f.name != fk.name);
        self.foreign_keys.push(fk);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|f| f.name == name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.find('.').map(|pos| &self.name[..pos])
    }

    /// Table name without its namespace
    pub fn bare_name(&self) -> &str {
        resolve_table_name(&self.name)
    }
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: TypeCode,
    #[serde(default)]
    pub nullable: bool,
    /// SQL default expression, rendered verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default)]
    pub unsigned: bool,
    #[serde(default)]
    pub autoincrement: bool,
}

impl Column {
    /// A NOT NULL column of the given type with no attributes
    pub fn new(name: impl Into<String>, column_type: impl Into<TypeCode>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            nullable: false,
            default: None,
            length: None,
            precision: None,
            scale: None,
            unsigned: false,
            autoincrement: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }
}

/// Primary key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    pub columns: Vec<String>,
}

/// Index representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Foreign key relationship, owned by the referencing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

impl ForeignKey {
    pub fn new<I, S, J, T>(
        name: impl Into<String>,
        columns: I,
        foreign_table: impl Into<String>,
        foreign_columns: J,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            foreign_table: foreign_table.into(),
            foreign_columns: foreign_columns.into_iter().map(Into::into).collect(),
            on_delete: None,
            on_update: None,
        }
    }

    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }

    pub fn on_update(mut self, action: impl Into<String>) -> Self {
        self.on_update = Some(action.into());
        self
    }
}
