//! Partial update descriptor.

use std::collections::BTreeMap;

use super::resource::{PermissionDescriptor, Reference};
use super::value::FieldValue;

/// A partial update of a resource.
///
/// Only the parts that are set are written. Reference groups are replaced
/// as a whole: naming a target type with an empty list removes every
/// reference to that type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// Type-specific fields to overwrite.
    pub fields: BTreeMap<String, FieldValue>,
    /// New permission descriptor.
    pub perms: Option<PermissionDescriptor>,
    /// Reference groups to replace, keyed by target type.
    pub references: BTreeMap<String, Vec<Reference>>,
}

impl ResourceUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Overwrites a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Replaces the permission descriptor.
    pub fn with_perms(mut self, perms: PermissionDescriptor) -> Self {
        self.perms = Some(perms);
        self
    }

    /// Replaces every reference to `target_type`.
    pub fn with_references(
        mut self,
        target_type: impl Into<String>,
        references: Vec<Reference>,
    ) -> Self {
        self.references.insert(target_type.into(), references);
        self
    }

    /// Returns `true` if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.fields.is_empty()
            && self.perms.is_none()
            && self.references.is_empty()
    }
}
