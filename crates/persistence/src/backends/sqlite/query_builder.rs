//! List query builder.
//!
//! Produces one `SELECT` per list request: the base columns of the target
//! table, one correlated sub-select per reference group returning a JSON
//! array of `{to, <edge attrs>}` objects, and one correlated sub-select per
//! back-reference group returning a JSON array of the referring rows. The
//! [`ColumnIndex`] returned with the SQL records the role of every selected
//! column; the row reconstructor decodes by that index and nothing else.

use std::collections::HashMap;

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as SqliteValue};

use crate::error::{StorageResult, ValidationError};
use crate::model::{BackReferenceDef, BackReferenceKind, ResourceSchema, SchemaRegistry};
use crate::types::{FieldKind, FieldValue, ListSpec};

use super::codec;

/// Alias of the primary table in generated queries.
pub const BASE_ALIAS: &str = "t";

const CHILD_ALIAS: &str = "c";
const EDGE_ALIAS: &str = "r";

/// A fragment of SQL with bound parameters.
///
/// Placeholders are anonymous `?`, so fragments compose by concatenation as
/// long as parameters are appended in textual order.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::from(s.as_str()),
            SqlParam::Integer(i) => ToSqlOutput::from(*i),
            SqlParam::Null => ToSqlOutput::Owned(SqliteValue::Null),
        })
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Combines with another fragment using AND.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Combines with another fragment using OR.
    pub fn or(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) OR ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Quotes an identifier that has already passed registry validation.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// Returns `?, ?, ...` with `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// How a selected column is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    /// A base column of the given kind.
    Field(FieldKind),
    /// A JSON array of reference stubs to `target`.
    Reference {
        /// Referenced type.
        target: String,
    },
    /// A JSON array of `source` rows pointing back at the resource.
    BackReference {
        /// Referring type.
        source: String,
        /// Parentage or reference.
        kind: BackReferenceKind,
    },
}

/// One selected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name or synthetic alias.
    pub name: String,
    /// Decode rule.
    pub role: ColumnRole,
}

/// Authoritative position of every selected column.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    columns: Vec<ColumnSpec>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    fn push(&mut self, name: impl Into<String>, role: ColumnRole) {
        let name = name.into();
        self.positions.insert(name.clone(), self.columns.len());
        self.columns.push(ColumnSpec { name, role });
    }

    /// Returns the position of a column.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Iterates `(position, column)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ColumnSpec)> {
        self.columns.iter().enumerate()
    }

    /// Number of selected columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A generated list statement.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// SQL text.
    pub sql: String,
    /// Bound values in placeholder order.
    pub params: Vec<SqlParam>,
    /// Column positions and decode rules.
    pub columns: ColumnIndex,
}

/// Builds list and count statements for one resource type.
pub struct QueryBuilder<'a> {
    registry: &'a SchemaRegistry,
    schema: &'a ResourceSchema,
    permission: Option<SqlFragment>,
    child_permission: Option<SqlFragment>,
    parent_uuid: Option<String>,
    limit: Option<usize>,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder for `schema`.
    pub fn new(registry: &'a SchemaRegistry, schema: &'a ResourceSchema) -> Self {
        Self {
            registry,
            schema,
            permission: None,
            child_permission: None,
            parent_uuid: None,
            limit: None,
        }
    }

    /// Restricts primary rows to those matching `predicate` (alias `t`).
    pub fn with_permission(mut self, predicate: Option<SqlFragment>) -> Self {
        self.permission = predicate;
        self
    }

    /// Restricts back-referenced rows to those matching `predicate` (alias `c`).
    pub fn with_child_permission(mut self, predicate: Option<SqlFragment>) -> Self {
        self.child_permission = predicate;
        self
    }

    /// Restricts to children of a resolved parent.
    pub fn with_parent_uuid(mut self, uuid: Option<String>) -> Self {
        self.parent_uuid = uuid;
        self
    }

    /// Sets the effective row limit. `None` or `Some(0)` is unlimited.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Builds the list statement.
    pub fn build(&self, spec: &ListSpec) -> StorageResult<ListQuery> {
        let mut columns = ColumnIndex::default();
        let mut select = SqlFragment::default();
        let mut parts = Vec::new();

        for (name, kind) in self.base_columns(spec)? {
            parts.push(format!("{}.{}", BASE_ALIAS, quote(name)));
            columns.push(name, ColumnRole::Field(kind));
        }

        if spec.detail {
            for reference in self.schema.references() {
                let alias = reference.column_alias();
                parts.push(format!(
                    "{} AS {}",
                    self.reference_subselect(&reference.target),
                    quote(&alias)
                ));
                columns.push(
                    alias,
                    ColumnRole::Reference {
                        target: reference.target.clone(),
                    },
                );
            }
            for back_reference in self.schema.back_references() {
                let alias = back_reference.column_alias();
                let sub = self.back_reference_subselect(back_reference)?;
                parts.push(format!("{} AS {}", sub.sql, quote(&alias)));
                select.params.extend(sub.params);
                columns.push(
                    alias,
                    ColumnRole::BackReference {
                        source: back_reference.source.clone(),
                        kind: back_reference.kind,
                    },
                );
            }
        }
        select.sql = parts.join(", ");

        let filter = self.where_clause(spec)?;
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            select.sql,
            quote(self.schema.name()),
            BASE_ALIAS
        );
        let mut params = select.params;
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.sql);
            params.extend(filter.params);
        }
        sql.push_str(&format!(" ORDER BY {}.\"uuid\"", BASE_ALIAS));
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            sql.push_str(" LIMIT ?");
            params.push(SqlParam::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        Ok(ListQuery {
            sql,
            params,
            columns,
        })
    }

    /// Builds a `count(*)` statement with the same filters and no pagination.
    pub fn build_count(&self, spec: &ListSpec) -> StorageResult<SqlFragment> {
        let mut spec = spec.clone();
        spec.marker = None;
        let filter = self.where_clause(&spec)?;
        let mut sql = format!(
            "SELECT count(*) FROM {} {}",
            quote(self.schema.name()),
            BASE_ALIAS
        );
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.sql);
        }
        Ok(SqlFragment::with_params(sql, filter.params))
    }

    fn base_columns(&self, spec: &ListSpec) -> StorageResult<Vec<(&'a str, FieldKind)>> {
        if spec.fields.is_empty() {
            return Ok(self.schema.columns().collect());
        }
        let mut selected: Vec<(&'a str, FieldKind)> = vec![("uuid", FieldKind::String)];
        for field in &spec.fields {
            let column = self
                .schema
                .columns()
                .find(|(name, _)| *name == field.as_str())
                .ok_or_else(|| ValidationError::UnknownField {
                    resource_type: self.schema.name().to_string(),
                    field: field.clone(),
                })?;
            if !selected.iter().any(|(name, _)| *name == column.0) {
                selected.push(column);
            }
        }
        Ok(selected)
    }

    fn where_clause(&self, spec: &ListSpec) -> StorageResult<SqlFragment> {
        let mut clause = SqlFragment::default();

        for (field, values) in &spec.filters {
            let kind = self.schema.column_kind(field).ok_or_else(|| {
                ValidationError::InvalidFilter {
                    resource_type: self.schema.name().to_string(),
                    field: field.clone(),
                }
            })?;
            if !kind.is_filterable() {
                return Err(ValidationError::InvalidFilterValue {
                    field: field.clone(),
                    value: values.join(","),
                    message: format!("{} columns cannot be filtered", kind),
                }
                .into());
            }
            if values.is_empty() {
                return Err(ValidationError::InvalidFilterValue {
                    field: field.clone(),
                    value: String::new(),
                    message: "no accepted values given".to_string(),
                }
                .into());
            }
            let mut params = Vec::with_capacity(values.len());
            for value in values {
                let parsed = FieldValue::parse(kind, value).map_err(|e| {
                    ValidationError::InvalidFilterValue {
                        field: field.clone(),
                        value: value.clone(),
                        message: e.to_string(),
                    }
                })?;
                params.push(codec::to_param(&parsed));
            }
            clause = clause.and(SqlFragment::with_params(
                format!(
                    "{}.{} IN ({})",
                    BASE_ALIAS,
                    quote(field),
                    placeholders(params.len())
                ),
                params,
            ));
        }

        if !spec.parent_uuids.is_empty() {
            clause = clause.and(SqlFragment::with_params(
                format!(
                    "{}.\"parent_uuid\" IN ({})",
                    BASE_ALIAS,
                    placeholders(spec.parent_uuids.len())
                ),
                spec.parent_uuids.iter().map(SqlParam::string).collect(),
            ));
        }
        if let Some(parent_uuid) = &self.parent_uuid {
            clause = clause.and(SqlFragment::with_params(
                format!("{}.\"parent_uuid\" = ?", BASE_ALIAS),
                vec![SqlParam::string(parent_uuid)],
            ));
        }
        if let Some(parent_type) = &spec.parent_type {
            clause = clause.and(SqlFragment::with_params(
                format!("{}.\"parent_type\" = ?", BASE_ALIAS),
                vec![SqlParam::string(parent_type)],
            ));
        }
        if let Some(marker) = &spec.marker {
            clause = clause.and(SqlFragment::with_params(
                format!("{}.\"uuid\" > ?", BASE_ALIAS),
                vec![SqlParam::string(marker)],
            ));
        }
        if let Some(permission) = &self.permission {
            clause = clause.and(permission.clone());
        }
        Ok(clause)
    }

    fn reference_subselect(&self, target: &str) -> String {
        let mut pairs = vec![format!("'to', {}.\"to\"", EDGE_ALIAS)];
        if let Some(reference) = self.schema.reference(target) {
            for attr in &reference.attrs {
                pairs.push(format!("'{}', {}.{}", attr.name, EDGE_ALIAS, quote(&attr.name)));
            }
        }
        format!(
            "(SELECT json_group_array(json_object({})) FROM {} {} WHERE {}.\"from\" = {}.\"uuid\")",
            pairs.join(", "),
            quote(&crate::model::reference_table(self.schema.name(), target)),
            EDGE_ALIAS,
            EDGE_ALIAS,
            BASE_ALIAS
        )
    }

    fn back_reference_subselect(
        &self,
        back_reference: &BackReferenceDef,
    ) -> StorageResult<SqlFragment> {
        let source = self.registry.get(&back_reference.source)?;
        let pairs: Vec<String> = source
            .columns()
            .map(|(name, _)| format!("'{}', {}.{}", name, CHILD_ALIAS, quote(name)))
            .collect();
        let object = format!("json_group_array(json_object({}))", pairs.join(", "));

        let mut sql = match back_reference.kind {
            BackReferenceKind::Parent => format!(
                "(SELECT {} FROM {} {} WHERE {}.\"parent_uuid\" = {}.\"uuid\"",
                object,
                quote(source.name()),
                CHILD_ALIAS,
                CHILD_ALIAS,
                BASE_ALIAS
            ),
            BackReferenceKind::Reference => format!(
                "(SELECT {} FROM {} {} JOIN {} {} ON {}.\"from\" = {}.\"uuid\" \
                 WHERE {}.\"to\" = {}.\"uuid\"",
                object,
                quote(source.name()),
                CHILD_ALIAS,
                quote(&crate::model::reference_table(source.name(), self.schema.name())),
                EDGE_ALIAS,
                EDGE_ALIAS,
                CHILD_ALIAS,
                EDGE_ALIAS,
                BASE_ALIAS
            ),
        };
        let mut params = Vec::new();
        if let Some(permission) = &self.child_permission {
            sql.push_str(&format!(" AND ({})", permission.sql));
            params.extend(permission.params.iter().cloned());
        }
        sql.push(')');
        Ok(SqlFragment::with_params(sql, params))
    }
}
