//! Registry of resource schemas with derived back-references.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use crate::error::{StorageResult, ValidationError};

use super::schema::{
    BackReferenceDef, BackReferenceKind, COMMON_COLUMNS, ResourceSchema, common_column_kind,
};

/// Pattern every type, column and reference name must match before it is
/// spliced into SQL text.
pub const IDENTIFIER_PATTERN: &str = "^[a-z][a-z0-9_]*$";

const RESERVED_TABLES: &[&str] = &["metadata", "schema_version"];
const RESERVED_EDGE_COLUMNS: &[&str] = &["from", "to"];

/// The set of registered resource types.
///
/// Built once from a list of [`ResourceSchema`]s. Construction validates
/// every identifier and every parent or reference target, then fills in
/// each schema's back-references: a type that lists `T` as a parent adds a
/// parent back-reference to `T`, and a type that references `T` adds a
/// reference back-reference to `T`.
///
/// # Examples
///
/// ```
/// use cfgstore_persistence::model::{BackReferenceKind, ResourceSchema, SchemaRegistry};
/// use cfgstore_persistence::types::FieldKind;
///
/// let registry = SchemaRegistry::new(vec![
///     ResourceSchema::builder("config_root").build(),
///     ResourceSchema::builder("network")
///         .parent("config_root")
///         .field("mtu", FieldKind::Integer)
///         .build(),
/// ])
/// .unwrap();
///
/// let root = registry.get("config_root").unwrap();
/// assert_eq!(root.back_references().len(), 1);
/// assert_eq!(root.back_references()[0].kind, BackReferenceKind::Parent);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    /// Validates `schemas` and derives their back-references.
    pub fn new(schemas: impl IntoIterator<Item = ResourceSchema>) -> Result<Self, ValidationError> {
        let pattern = Regex::new(IDENTIFIER_PATTERN).map_err(|e| {
            ValidationError::InvalidIdentifier {
                identifier: IDENTIFIER_PATTERN.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut by_name: BTreeMap<String, ResourceSchema> = BTreeMap::new();
        for mut schema in schemas {
            validate_schema(&pattern, &schema)?;
            schema.back_references.clear();
            if by_name.contains_key(&schema.name) {
                return Err(ValidationError::InvalidIdentifier {
                    identifier: schema.name.clone(),
                    message: "resource type registered twice".to_string(),
                });
            }
            by_name.insert(schema.name.clone(), schema);
        }

        let mut derived: Vec<(String, BackReferenceDef)> = Vec::new();
        for schema in by_name.values() {
            for parent in &schema.parents {
                if !by_name.contains_key(parent) {
                    return Err(ValidationError::InvalidParent {
                        resource_type: schema.name.clone(),
                        parent_type: parent.clone(),
                    });
                }
                derived.push((
                    parent.clone(),
                    BackReferenceDef {
                        source: schema.name.clone(),
                        kind: BackReferenceKind::Parent,
                    },
                ));
            }
            for reference in &schema.references {
                if !by_name.contains_key(&reference.target) {
                    return Err(ValidationError::UnknownReference {
                        resource_type: schema.name.clone(),
                        target_type: reference.target.clone(),
                    });
                }
                derived.push((
                    reference.target.clone(),
                    BackReferenceDef {
                        source: schema.name.clone(),
                        kind: BackReferenceKind::Reference,
                    },
                ));
            }
        }
        for (target, back_reference) in derived {
            if let Some(schema) = by_name.get_mut(&target) {
                schema.back_references.push(back_reference);
            }
        }

        tracing::info!(resource_types = by_name.len(), "Loaded schema registry");

        Ok(Self {
            schemas: by_name
                .into_iter()
                .map(|(name, schema)| (name, Arc::new(schema)))
                .collect(),
        })
    }

    /// Returns the schema of `resource_type`.
    pub fn get(&self, resource_type: &str) -> StorageResult<&Arc<ResourceSchema>> {
        self.schemas.get(resource_type).ok_or_else(|| {
            ValidationError::UnknownResourceType {
                resource_type: resource_type.to_string(),
            }
            .into()
        })
    }

    /// Returns `true` if `resource_type` is registered.
    pub fn contains(&self, resource_type: &str) -> bool {
        self.schemas.contains_key(resource_type)
    }

    /// Iterates the registered schemas in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceSchema>> {
        self.schemas.values()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn check_identifier(pattern: &Regex, identifier: &str) -> Result<(), ValidationError> {
    if pattern.is_match(identifier) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            identifier: identifier.to_string(),
            message: format!("must match {}", IDENTIFIER_PATTERN),
        })
    }
}

fn validate_schema(pattern: &Regex, schema: &ResourceSchema) -> Result<(), ValidationError> {
    check_identifier(pattern, &schema.name)?;
    let reserved = schema.name.starts_with("ref_")
        || schema.name.starts_with("sqlite_")
        || RESERVED_TABLES.contains(&schema.name.as_str());
    if reserved {
        return Err(ValidationError::InvalidIdentifier {
            identifier: schema.name.clone(),
            message: "reserved table name".to_string(),
        });
    }

    let mut seen: HashSet<&str> = COMMON_COLUMNS.iter().map(|(name, _)| *name).collect();
    for field in &schema.fields {
        check_identifier(pattern, &field.name)?;
        if common_column_kind(&field.name).is_some() || !seen.insert(field.name.as_str()) {
            return Err(ValidationError::InvalidIdentifier {
                identifier: format!("{}.{}", schema.name, field.name),
                message: "column declared twice".to_string(),
            });
        }
    }

    for parent in &schema.parents {
        check_identifier(pattern, parent)?;
    }

    let mut targets = HashSet::new();
    for reference in &schema.references {
        check_identifier(pattern, &reference.target)?;
        if !targets.insert(reference.target.as_str()) {
            return Err(ValidationError::InvalidIdentifier {
                identifier: format!("{}.ref_{}", schema.name, reference.target),
                message: "reference declared twice".to_string(),
            });
        }
        let mut attrs = HashSet::new();
        for attr in &reference.attrs {
            check_identifier(pattern, &attr.name)?;
            if RESERVED_EDGE_COLUMNS.contains(&attr.name.as_str())
                || !attrs.insert(attr.name.as_str())
            {
                return Err(ValidationError::InvalidIdentifier {
                    identifier: format!("{}.{}", reference.table_name(&schema.name), attr.name),
                    message: "invalid edge attribute name".to_string(),
                });
            }
        }
    }
    Ok(())
}
