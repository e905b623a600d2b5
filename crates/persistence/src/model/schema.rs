//! Declarative per-type schema descriptions.
//!
//! A [`ResourceSchema`] lists a type's own columns, the parent types it may
//! be created under, and its outbound references. Back-references are not
//! declared by hand; the [`SchemaRegistry`](super::SchemaRegistry) derives
//! them from the parents and references of every other type.

use crate::types::FieldKind;

/// Columns present in every resource table, in table order.
pub const COMMON_COLUMNS: &[(&str, FieldKind)] = &[
    ("uuid", FieldKind::String),
    ("fq_name", FieldKind::Json),
    ("display_name", FieldKind::String),
    ("parent_uuid", FieldKind::String),
    ("parent_type", FieldKind::String),
    ("owner", FieldKind::String),
    ("owner_access", FieldKind::Integer),
    ("group_name", FieldKind::String),
    ("group_access", FieldKind::Integer),
    ("global_access", FieldKind::Integer),
    ("share", FieldKind::Json),
    ("created", FieldKind::Timestamp),
    ("last_modified", FieldKind::Timestamp),
    ("creator", FieldKind::String),
];

/// Returns the kind of a common column.
pub fn common_column_kind(name: &str) -> Option<FieldKind> {
    COMMON_COLUMNS
        .iter()
        .find(|(column, _)| *column == name)
        .map(|(_, kind)| *kind)
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Storage kind.
    pub kind: FieldKind,
    /// Whether create requires a non-null value.
    pub required: bool,
}

impl FieldDef {
    /// Creates an optional column.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    /// Marks the column as required on create.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// An outbound reference group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDef {
    /// Referenced resource type.
    pub target: String,
    /// Edge attribute columns stored on the join table.
    pub attrs: Vec<FieldDef>,
}

impl ReferenceDef {
    /// Name of the join table for references from `source` to this target.
    pub fn table_name(&self, source: &str) -> String {
        reference_table(source, &self.target)
    }

    /// Returns the kind of an edge attribute.
    pub fn attr_kind(&self, name: &str) -> Option<FieldKind> {
        self.attrs.iter().find(|a| a.name == name).map(|a| a.kind)
    }

    /// Column alias used for this group in list queries.
    pub fn column_alias(&self) -> String {
        format!("ref_{}", self.target)
    }
}

/// Name of the join table holding references from `source` to `target`.
pub fn reference_table(source: &str, target: &str) -> String {
    format!("ref_{}_{}", source, target)
}

/// How a back-reference source points at the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackReferenceKind {
    /// The source is a child whose `parent_uuid` is the resource.
    Parent,
    /// The source holds a reference row targeting the resource.
    Reference,
}

/// A derived inbound relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackReferenceDef {
    /// Type of the resources pointing back.
    pub source: String,
    /// Whether they point back through parentage or a reference.
    pub kind: BackReferenceKind,
}

impl BackReferenceDef {
    /// Column alias used for this group in list queries.
    pub fn column_alias(&self) -> String {
        match self.kind {
            BackReferenceKind::Parent => format!("backref_parent_{}", self.source),
            BackReferenceKind::Reference => format!("backref_ref_{}", self.source),
        }
    }
}

/// Schema of one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) parents: Vec<String>,
    pub(crate) references: Vec<ReferenceDef>,
    pub(crate) back_references: Vec<BackReferenceDef>,
}

impl ResourceSchema {
    /// Starts a schema for the named type.
    pub fn builder(name: impl Into<String>) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder {
            schema: ResourceSchema {
                name: name.into(),
                fields: Vec::new(),
                parents: Vec::new(),
                references: Vec::new(),
                back_references: Vec::new(),
            },
        }
    }

    /// Type name, also the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type-specific columns.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Allowed parent types. Empty means root-level.
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// Returns `true` if the type has no parent.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Outbound reference groups.
    pub fn references(&self) -> &[ReferenceDef] {
        &self.references
    }

    /// Inbound relations, populated by the registry.
    pub fn back_references(&self) -> &[BackReferenceDef] {
        &self.back_references
    }

    /// Returns the reference group targeting `target`.
    pub fn reference(&self, target: &str) -> Option<&ReferenceDef> {
        self.references.iter().find(|r| r.target == target)
    }

    /// Returns the declared type-specific column.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the kind of any column, common or type-specific.
    pub fn column_kind(&self, name: &str) -> Option<FieldKind> {
        common_column_kind(name).or_else(|| self.field(name).map(|f| f.kind))
    }

    /// Iterates every column of the table in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, FieldKind)> + '_ {
        COMMON_COLUMNS
            .iter()
            .map(|(name, kind)| (*name, *kind))
            .chain(self.fields.iter().map(|f| (f.name.as_str(), f.kind)))
    }

    /// Returns `true` if resources of this type may be parented by `parent_type`.
    pub fn allows_parent(&self, parent_type: &str) -> bool {
        self.parents.iter().any(|p| p == parent_type)
    }
}

/// Builder for [`ResourceSchema`].
#[derive(Debug, Clone)]
pub struct ResourceSchemaBuilder {
    schema: ResourceSchema,
}

impl ResourceSchemaBuilder {
    /// Declares an optional column.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.fields.push(FieldDef::new(name, kind));
        self
    }

    /// Declares a column that must be set on create.
    pub fn required_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.fields.push(FieldDef::new(name, kind).required());
        self
    }

    /// Declares an allowed parent type.
    pub fn parent(mut self, parent_type: impl Into<String>) -> Self {
        self.schema.parents.push(parent_type.into());
        self
    }

    /// Declares a reference group without edge attributes.
    pub fn reference(self, target: impl Into<String>) -> Self {
        self.reference_with_attrs(target, Vec::new())
    }

    /// Declares a reference group whose edges carry attributes.
    pub fn reference_with_attrs(mut self, target: impl Into<String>, attrs: Vec<FieldDef>) -> Self {
        self.schema.references.push(ReferenceDef {
            target: target.into(),
            attrs,
        });
        self
    }

    /// Finishes the schema. Validation happens on registration.
    pub fn build(self) -> ResourceSchema {
        self.schema
    }
}
