//! Logical type registry
//!
//! Types are stored at rest by their code. A loaded schema is canonicalized
//! against a registry before any comparison: legacy aliases are rewritten to
//! the canonical code and unknown codes abort the run.

use crate::diff::Dialect;
use crate::error::{DriftError, DriftResult};
use crate::schema::model::{Column, Schema, TypeCode};
use std::collections::BTreeMap;
use tracing::debug;

/// How a logical type maps onto native column types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Integer,
    BigInt,
    SmallInt,
    String,
    Text,
    Boolean,
    DateTime,
    DateTimeTz,
    Date,
    Time,
    Decimal,
    Float,
    Json,
    Guid,
    Binary,
    Blob,
    /// Application-defined type with a fixed native name per dialect
    Custom {
        postgresql: String,
        mysql: String,
        sqlite: String,
    },
}

/// A registered logical type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalType {
    code: TypeCode,
    kind: TypeKind,
}

const DEFAULT_STRING_LENGTH: u32 = 255;
const DEFAULT_PRECISION: u32 = 10;
const DEFAULT_SCALE: u32 = 0;

impl LogicalType {
    pub fn new(code: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            code: TypeCode::new(code),
            kind,
        }
    }

    pub fn code(&self) -> &TypeCode {
        &self.code
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Length used when a column does not set one; `None` if length is meaningless
    pub fn default_length(&self) -> Option<u32> {
        match self.kind {
            TypeKind::String | TypeKind::Binary => Some(DEFAULT_STRING_LENGTH),
            _ => None,
        }
    }

    pub fn uses_precision(&self) -> bool {
        self.kind == TypeKind::Decimal
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Integer
                | TypeKind::BigInt
                | TypeKind::SmallInt
                | TypeKind::Decimal
                | TypeKind::Float
        )
    }

    /// Native type declaration for `column` on `dialect`, without nullability or default
    pub fn sql_declaration(&self, column: &Column, dialect: Dialect) -> String {
        let length = column
            .length
            .or(self.default_length())
            .unwrap_or(DEFAULT_STRING_LENGTH);
        let precision = column.precision.unwrap_or(DEFAULT_PRECISION);
        let scale = column.scale.unwrap_or(DEFAULT_SCALE);
        let unsigned = if column.unsigned && dialect.supports_unsigned() && self.is_numeric() {
            " UNSIGNED"
        } else {
            ""
        };

        let base = match (&self.kind, dialect) {
            (TypeKind::Integer, Dialect::Sqlite) => "INTEGER".to_string(),
            (TypeKind::Integer, _) => "INT".to_string(),
            (TypeKind::BigInt, _) => "BIGINT".to_string(),
            (TypeKind::SmallInt, _) => "SMALLINT".to_string(),
            (TypeKind::String, _) => format!("VARCHAR({})", length),
            (TypeKind::Text, Dialect::MySql) => "LONGTEXT".to_string(),
            (TypeKind::Text, _) => "TEXT".to_string(),
            (TypeKind::Boolean, Dialect::MySql) => "TINYINT(1)".to_string(),
            (TypeKind::Boolean, _) => "BOOLEAN".to_string(),
            (TypeKind::DateTime, Dialect::PostgreSql) => {
                "TIMESTAMP(0) WITHOUT TIME ZONE".to_string()
            }
            (TypeKind::DateTimeTz, Dialect::PostgreSql) => {
                "TIMESTAMP(0) WITH TIME ZONE".to_string()
            }
            (TypeKind::DateTime | TypeKind::DateTimeTz, _) => "DATETIME".to_string(),
            (TypeKind::Date, _) => "DATE".to_string(),
            (TypeKind::Time, Dialect::PostgreSql) => "TIME(0) WITHOUT TIME ZONE".to_string(),
            (TypeKind::Time, _) => "TIME".to_string(),
            (TypeKind::Decimal, _) => format!("NUMERIC({}, {})", precision, scale),
            (TypeKind::Float, _) => "DOUBLE PRECISION".to_string(),
            (TypeKind::Json, Dialect::Sqlite) => "CLOB".to_string(),
            (TypeKind::Json, _) => "JSON".to_string(),
            (TypeKind::Guid, Dialect::PostgreSql) => "UUID".to_string(),
            (TypeKind::Guid, _) => "CHAR(36)".to_string(),
            (TypeKind::Binary, Dialect::PostgreSql) => "BYTEA".to_string(),
            (TypeKind::Binary, Dialect::MySql) => format!("VARBINARY({})", length),
            (TypeKind::Binary, Dialect::Sqlite) => "BLOB".to_string(),
            (TypeKind::Blob, Dialect::PostgreSql) => "BYTEA".to_string(),
            (TypeKind::Blob, Dialect::MySql) => "LONGBLOB".to_string(),
            (TypeKind::Blob, Dialect::Sqlite) => "BLOB".to_string(),
            (TypeKind::Custom { postgresql, .. }, Dialect::PostgreSql) => postgresql.clone(),
            (TypeKind::Custom { mysql, .. }, Dialect::MySql) => mysql.clone(),
            (TypeKind::Custom { sqlite, .. }, Dialect::Sqlite) => sqlite.clone(),
        };

        format!("{}{}", base, unsigned)
    }
}

/// Injectable registry mapping codes (and legacy aliases) to logical types
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<TypeCode, LogicalType>,
    aliases: BTreeMap<String, TypeCode>,
}

impl TypeRegistry {
    /// Registry without any types
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Register a new type; codes must be unique
    pub fn register(&mut self, ty: LogicalType) -> DriftResult<()> {
        if self.types.contains_key(ty.code()) || self.aliases.contains_key(ty.code().as_str()) {
            return Err(DriftError::Configuration(format!(
                "Type '{}' is already registered",
                ty.code()
            )));
        }
        self.types.insert(ty.code().clone(), ty);
        Ok(())
    }

    /// Register `alias` as a legacy name of an already registered code
    pub fn register_alias(&mut self, alias: impl Into<String>, code: &str) -> DriftResult<()> {
        let alias = alias.into();
        let target = TypeCode::new(code);
        if !self.types.contains_key(&target) {
            return Err(DriftError::Configuration(format!(
                "Cannot alias '{}' to unknown type '{}'",
                alias, code
            )));
        }
        if self.types.contains_key(alias.as_str()) {
            return Err(DriftError::Configuration(format!(
                "Alias '{}' shadows a registered type",
                alias
            )));
        }
        self.aliases.insert(alias, target);
        Ok(())
    }

    /// Look up a canonical code
    pub fn get(&self, code: &str) -> Option<&LogicalType> {
        self.types.get(code)
    }

    /// Look up a code or alias, returning the canonical type
    pub fn resolve(&self, code: &str) -> Option<&LogicalType> {
        self.types
            .get(code)
            .or_else(|| self.aliases.get(code).and_then(|c| self.types.get(c)))
    }

    /// Canonical type of a column, or a lookup error naming the column
    pub fn type_of(&self, table: &str, column: &Column) -> DriftResult<&LogicalType> {
        self.resolve(column.column_type.as_str())
            .ok_or_else(|| DriftError::Lookup {
                table: table.to_string(),
                column: column.name.clone(),
                code: column.column_type.to_string(),
            })
    }

    pub fn codes(&self) -> impl Iterator<Item = &TypeCode> {
        self.types.keys()
    }
}

impl Default for TypeRegistry {
    /// Registry with the built-in types and their legacy aliases
    fn default() -> Self {
        let mut registry = Self::empty();
        let builtins = [
            ("integer", TypeKind::Integer),
            ("bigint", TypeKind::BigInt),
            ("smallint", TypeKind::SmallInt),
            ("string", TypeKind::String),
            ("text", TypeKind::Text),
            ("boolean", TypeKind::Boolean),
            ("datetime", TypeKind::DateTime),
            ("datetimetz", TypeKind::DateTimeTz),
            ("date", TypeKind::Date),
            ("time", TypeKind::Time),
            ("decimal", TypeKind::Decimal),
            ("float", TypeKind::Float),
            ("json", TypeKind::Json),
            ("guid", TypeKind::Guid),
            ("binary", TypeKind::Binary),
            ("blob", TypeKind::Blob),
        ];
        for (code, kind) in builtins {
            registry.types.insert(TypeCode::new(code), LogicalType::new(code, kind));
        }

        let aliases = [
            ("int", "integer"),
            ("varchar", "string"),
            ("bool", "boolean"),
            ("double", "float"),
            ("uuid", "guid"),
            ("timestamp", "datetime"),
            ("json_array", "json"),
        ];
        for (alias, code) in aliases {
            registry
                .aliases
                .insert(alias.to_string(), TypeCode::new(code));
        }

        registry
    }
}

/// Rewrite every column's type code to the registry's canonical code.
///
/// Returns the number of columns rewritten; a second pass over the same
/// schema always returns 0. Fails on the first column whose code is unknown.
pub fn reconcile(schema: &mut Schema, registry: &TypeRegistry) -> DriftResult<usize> {
    let mut rewritten = 0;

    for table in schema.tables_mut() {
        for column in &mut table.columns {
            let canonical = registry.type_of(&table.name, column)?.code();
            if &column.column_type != canonical {
                debug!(
                    "Reconciled {}.{}: {} -> {}",
                    table.name, column.name, column.column_type, canonical
                );
                column.column_type = canonical.clone();
                rewritten += 1;
            }
        }
    }

    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::Table;

    fn legacy_schema() -> Schema {
        Schema::new().with_table(
            Table::new("users")
                .with_column(Column::new("id", "int"))
                .with_column(Column::new("name", "varchar").with_length(100))
                .with_column(Column::new("active", "boolean")),
        )
    }

    #[test]
    fn test_reconcile_rewrites_aliases() {
        let registry = TypeRegistry::default();
        let mut schema = legacy_schema();

        let rewritten = reconcile(&mut schema, &registry).unwrap();

        assert_eq!(rewritten, 2);
        let users = schema.table("users").unwrap();
        assert_eq!(users.column("id").unwrap().column_type.as_str(), "integer");
        assert_eq!(users.column("name").unwrap().column_type.as_str(), "string");
        assert_eq!(users.column("active").unwrap().column_type.as_str(), "boolean");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let registry = TypeRegistry::default();
        let mut schema = legacy_schema();

        reconcile(&mut schema, &registry).unwrap();
        let once = schema.clone();
        let rewritten = reconcile(&mut schema, &registry).unwrap();

        assert_eq!(rewritten, 0);
        assert_eq!(schema, once);
    }

    #[test]
    fn test_reconcile_unknown_type_fails() {
        let registry = TypeRegistry::default();
        let mut schema = Schema::new().with_table(
            Table::new("events").with_column(Column::new("payload", "hstore")),
        );

        match reconcile(&mut schema, &registry) {
            Err(DriftError::Lookup { table, column, code }) => {
                assert_eq!(table, "events");
                assert_eq!(column, "payload");
                assert_eq!(code, "hstore");
            }
            other => panic!("expected lookup error, got {:?}", other),
        }
    }

    #[test]
    fn test_isolated_registry_with_custom_type() {
        let mut registry = TypeRegistry::empty();
        registry
            .register(LogicalType::new(
                "money",
                TypeKind::Custom {
                    postgresql: "MONEY".into(),
                    mysql: "DECIMAL(19, 4)".into(),
                    sqlite: "NUMERIC".into(),
                },
            ))
            .unwrap();
        registry.register_alias("currency", "money").unwrap();

        let mut schema = Schema::new()
            .with_table(Table::new("orders").with_column(Column::new("total", "currency")));
        assert_eq!(reconcile(&mut schema, &registry).unwrap(), 1);

        let column = schema.table("orders").unwrap().column("total").unwrap().clone();
        let ty = registry.get("money").unwrap();
        assert_eq!(ty.sql_declaration(&column, Dialect::PostgreSql), "MONEY");
        assert_eq!(ty.sql_declaration(&column, Dialect::MySql), "DECIMAL(19, 4)");

        // built-ins are not visible in an isolated registry
        assert!(registry.resolve("integer").is_none());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = TypeRegistry::default();
        let err = registry
            .register(LogicalType::new("integer", TypeKind::Integer))
            .unwrap_err();
        assert!(matches!(err, DriftError::Configuration(_)));
        assert!(registry.register_alias("integer", "bigint").is_err());
        assert!(registry.register_alias("serial", "nope").is_err());
    }

    #[test]
    fn test_sql_declarations() {
        let registry = TypeRegistry::default();
        let name = Column::new("name", "string");
        let price = Column::new("price", "decimal").with_precision(8, 2);
        let hits = Column::new("hits", "integer").unsigned();

        let string = registry.get("string").unwrap();
        assert_eq!(string.sql_declaration(&name, Dialect::PostgreSql), "VARCHAR(255)");

        let decimal = registry.get("decimal").unwrap();
        assert_eq!(decimal.sql_declaration(&price, Dialect::MySql), "NUMERIC(8, 2)");

        let integer = registry.get("integer").unwrap();
        assert_eq!(integer.sql_declaration(&hits, Dialect::MySql), "INT UNSIGNED");
        assert_eq!(integer.sql_declaration(&hits, Dialect::PostgreSql), "INT");
        assert_eq!(integer.sql_declaration(&hits, Dialect::Sqlite), "INTEGER");
    }
}
