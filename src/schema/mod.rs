//! Schema Module
//!
//! The schema model, the logical type registry used to canonicalize loaded
//! schemas, and the asset filter applied to the desired schema.

pub mod filter;
pub mod model;
pub mod types;

pub use filter::AssetFilter;
pub use model::{
    resolve_table_name, Column, ForeignKey, Index, PrimaryKey, Schema, Table, TypeCode,
};
pub use types::{reconcile, LogicalType, TypeKind, TypeRegistry};
