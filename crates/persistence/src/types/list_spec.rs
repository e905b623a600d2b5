//! List query specification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Filter, pagination and detail options for a list query.
///
/// Equality filters map a column name to the set of accepted values,
/// supplied as text and converted to the column's kind before binding.
/// Filters on columns the resource type does not declare are rejected.
///
/// # Examples
///
/// ```
/// use cfgstore_persistence::types::ListSpec;
///
/// let spec = ListSpec::new()
///     .with_filter("display_name", ["net1", "net2"])
///     .with_parent_fq_name(["default-domain", "admin"])
///     .with_limit(50)
///     .with_detail(true);
///
/// assert_eq!(spec.filters["display_name"].len(), 2);
/// assert!(spec.detail);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListSpec {
    /// Equality filters: column name to accepted values.
    pub filters: BTreeMap<String, Vec<String>>,
    /// Restrict to children of the resource with this fully-qualified name.
    pub parent_fq_name: Option<Vec<String>>,
    /// Restrict to children of parents of this type.
    pub parent_type: Option<String>,
    /// Restrict to children of these parents.
    pub parent_uuids: Vec<String>,
    /// Maximum number of rows. `None` uses the backend's default page size.
    /// `Some(0)` asks for every row, still clamped to the backend's maximum
    /// page size when one is configured.
    pub limit: Option<usize>,
    /// Return only resources whose uuid sorts after this one.
    pub marker: Option<String>,
    /// Include reference and back-reference sub-selects.
    pub detail: bool,
    /// Base columns to return. Empty means all; `uuid` is always returned.
    pub fields: Vec<String>,
}

impl ListSpec {
    /// Creates an empty specification that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds accepted values for a column.
    pub fn with_filter<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Restricts to children of the named parent.
    pub fn with_parent_fq_name<I, S>(mut self, fq_name: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parent_fq_name = Some(fq_name.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to children of parents of the given type.
    pub fn with_parent_type(mut self, parent_type: impl Into<String>) -> Self {
        self.parent_type = Some(parent_type.into());
        self
    }

    /// Restricts to children of the given parent.
    pub fn with_parent_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.parent_uuids.push(uuid.into());
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the pagination marker.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Enables or disables reference and back-reference detail.
    pub fn with_detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    /// Restricts the returned base columns.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}
