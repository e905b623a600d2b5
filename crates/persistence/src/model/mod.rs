//! Resource relationship model.
//!
//! Each resource type is described by a [`ResourceSchema`]: its columns, the
//! parent types it may live under, and the types it references. The
//! [`SchemaRegistry`] derives the inverse relations (back-references) and is
//! the single source both the query builder and the row reconstructor read,
//! so every column the builder selects has a matching decode rule.

pub mod catalog;
mod registry;
mod schema;

pub use registry::{IDENTIFIER_PATTERN, SchemaRegistry};
pub use schema::{
    BackReferenceDef, BackReferenceKind, COMMON_COLUMNS, FieldDef, ReferenceDef, ResourceSchema,
    ResourceSchemaBuilder, common_column_kind, reference_table,
};
