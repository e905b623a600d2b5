//! Row reconstruction.
//!
//! Turns one row produced by a [`ListQuery`](super::query_builder::ListQuery)
//! into a [`Resource`]. Decoding is driven entirely by the query's
//! [`ColumnIndex`]: base columns go through the scalar codec, reference
//! columns become identity stubs, and back-reference columns become fully
//! decoded one-level-deep resources.

use rusqlite::Row;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::model::{BackReferenceKind, ResourceSchema, SchemaRegistry};
use crate::tenant::TenantId;
use crate::types::{FieldValue, Reference, Resource, ShareEntry};

use super::codec;
use super::query_builder::{ColumnIndex, ColumnRole};

fn corruption(table: &str, column: &str, uuid: &str, message: impl Into<String>) -> StorageError {
    StorageError::Backend(BackendError::Corruption {
        table: table.to_string(),
        column: column.to_string(),
        uuid: uuid.to_string(),
        message: message.into(),
    })
}

/// Decodes one result row.
pub fn reconstruct(
    registry: &SchemaRegistry,
    schema: &ResourceSchema,
    columns: &ColumnIndex,
    row: &Row<'_>,
) -> StorageResult<Resource> {
    let uuid = match columns.position("uuid") {
        Some(position) => match row.get_ref(position)? {
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            _ => String::new(),
        },
        None => String::new(),
    };
    let table = schema.name();
    let mut resource = Resource::new(table);

    for (position, column) in columns.iter() {
        let raw = row.get_ref(position)?;
        match &column.role {
            ColumnRole::Field(kind) => {
                let value = codec::from_sql(*kind, raw)
                    .map_err(|e| corruption(table, &column.name, &uuid, e.to_string()))?;
                apply_column(&mut resource, &column.name, value)
                    .map_err(|message| corruption(table, &column.name, &uuid, message))?;
            }
            ColumnRole::Reference { target } => {
                let entries = json_array(raw)
                    .map_err(|message| corruption(table, &column.name, &uuid, message))?;
                let stubs = decode_references(schema, target, &entries)
                    .map_err(|message| corruption(table, &column.name, &uuid, message))?;
                if !stubs.is_empty() {
                    resource.references.insert(target.clone(), stubs);
                }
            }
            ColumnRole::BackReference { source, kind } => {
                let source_schema = registry.get(source)?;
                let entries = json_array(raw)
                    .map_err(|message| corruption(table, &column.name, &uuid, message))?;
                let mut related = Vec::with_capacity(entries.len());
                for entry in &entries {
                    let Some(object) = entry.as_object() else {
                        return Err(corruption(
                            table,
                            &column.name,
                            &uuid,
                            "back-reference entry is not an object",
                        ));
                    };
                    if let Some(child) = decode_object(source_schema, object)? {
                        related.push(child);
                    }
                }
                if related.is_empty() {
                    continue;
                }
                related.sort_by(|a, b| a.uuid.cmp(&b.uuid));
                let target = match kind {
                    BackReferenceKind::Parent => &mut resource.children,
                    BackReferenceKind::Reference => &mut resource.back_refs,
                };
                target.entry(source.clone()).or_default().extend(related);
            }
        }
    }

    Ok(resource)
}

/// Decodes one aggregated back-reference object.
///
/// Entries without an identity are placeholders and yield `None`.
fn decode_object(
    schema: &ResourceSchema,
    object: &Map<String, Value>,
) -> StorageResult<Option<Resource>> {
    let uuid = match object.get("uuid") {
        Some(Value::String(uuid)) if !uuid.is_empty() => uuid.clone(),
        _ => return Ok(None),
    };
    let mut resource = Resource::new(schema.name());
    for (name, kind) in schema.columns() {
        let Some(raw) = object.get(name) else {
            continue;
        };
        let value = FieldValue::from_json(kind, raw)
            .map_err(|e| corruption(schema.name(), name, &uuid, e.to_string()))?;
        apply_column(&mut resource, name, value)
            .map_err(|message| corruption(schema.name(), name, &uuid, message))?;
    }
    Ok(Some(resource))
}

fn decode_references(
    schema: &ResourceSchema,
    target: &str,
    entries: &[Value],
) -> Result<Vec<Reference>, String> {
    let definition = schema.reference(target);
    let mut stubs = Vec::with_capacity(entries.len());
    for entry in entries {
        let object = entry
            .as_object()
            .ok_or_else(|| "reference entry is not an object".to_string())?;
        let to = match object.get("to") {
            Some(Value::String(to)) if !to.is_empty() => to,
            _ => continue,
        };
        let mut stub = Reference::new(to.clone());
        if let Some(definition) = definition {
            for attr in &definition.attrs {
                let Some(raw) = object.get(&attr.name) else {
                    continue;
                };
                let value = FieldValue::from_json(attr.kind, raw)
                    .map_err(|e| format!("edge attribute {}: {}", attr.name, e))?;
                if !value.is_null() {
                    stub.attrs.insert(attr.name.clone(), value);
                }
            }
        }
        stubs.push(stub);
    }
    Ok(stubs)
}

fn json_array(raw: ValueRef<'_>) -> Result<Vec<Value>, String> {
    match raw {
        ValueRef::Null => Ok(Vec::new()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            serde_json::from_slice::<Vec<Value>>(bytes).map_err(|e| e.to_string())
        }
        other => Err(format!("expected JSON array, got {:?}", other.data_type())),
    }
}

fn text(value: FieldValue) -> Result<Option<String>, String> {
    match value {
        FieldValue::Null => Ok(None),
        FieldValue::String(s) => Ok(Some(s)),
        other => Err(format!("expected text, got {:?}", other)),
    }
}

fn access_bits(value: FieldValue) -> Result<u8, String> {
    match value {
        FieldValue::Null => Ok(0),
        FieldValue::Integer(i) => {
            u8::try_from(i).map_err(|_| format!("access bits {} out of range", i))
        }
        other => Err(format!("expected access bits, got {:?}", other)),
    }
}

/// Stores a decoded column on the resource.
///
/// Common columns populate the identity, hierarchy, permission and
/// timestamp attributes; everything else lands in `fields`. Nulls leave
/// the attribute at its default.
fn apply_column(resource: &mut Resource, name: &str, value: FieldValue) -> Result<(), String> {
    match name {
        "uuid" => resource.uuid = text(value)?.unwrap_or_default(),
        "fq_name" => {
            resource.fq_name = match value {
                FieldValue::Null => Vec::new(),
                FieldValue::Json(v) => serde_json::from_value(v).map_err(|e| e.to_string())?,
                other => return Err(format!("expected name list, got {:?}", other)),
            }
        }
        "display_name" => resource.display_name = text(value)?.unwrap_or_default(),
        "parent_uuid" => resource.parent_uuid = text(value)?.filter(|s| !s.is_empty()),
        "parent_type" => resource.parent_type = text(value)?.filter(|s| !s.is_empty()),
        "owner" => resource.perms.owner = TenantId::new(text(value)?.unwrap_or_default()),
        "owner_access" => resource.perms.owner_access = access_bits(value)?,
        "group_name" => resource.perms.group = text(value)?.filter(|s| !s.is_empty()),
        "group_access" => resource.perms.group_access = access_bits(value)?,
        "global_access" => resource.perms.global_access = access_bits(value)?,
        "share" => {
            resource.perms.share = match value {
                FieldValue::Null => Vec::new(),
                FieldValue::Json(v) => {
                    serde_json::from_value::<Vec<ShareEntry>>(v).map_err(|e| e.to_string())?
                }
                other => return Err(format!("expected share list, got {:?}", other)),
            }
        }
        "created" => resource.created = value.as_timestamp().copied(),
        "last_modified" => resource.last_modified = value.as_timestamp().copied(),
        "creator" => resource.creator = text(value)?.filter(|s| !s.is_empty()),
        _ => {
            if !value.is_null() {
                resource.fields.insert(name.to_string(), value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sqlite::query_builder::QueryBuilder;
    use crate::backends::sqlite::schema::initialize_schema;
    use crate::model::FieldDef;
    use crate::types::{FieldKind, ListSpec};
    use rusqlite::Connection;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(vec![
            ResourceSchema::builder("network")
                .field("mtu", FieldKind::Integer)
                .field("route_targets", FieldKind::Json)
                .build(),
            ResourceSchema::builder("subnet")
                .parent("network")
                .field("cidr", FieldKind::String)
                .field("dhcp", FieldKind::Boolean)
                .build(),
            ResourceSchema::builder("port")
                .field("mac", FieldKind::String)
                .reference_with_attrs(
                    "network",
                    vec![FieldDef::new("vlan", FieldKind::Integer)],
                )
                .build(),
        ])
        .unwrap()
    }

    fn setup() -> (Connection, SchemaRegistry) {
        let conn = Connection::open_in_memory().unwrap();
        let registry = registry();
        initialize_schema(&conn, &registry).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO network
                (uuid, fq_name, display_name, owner, owner_access, share, mtu, route_targets)
                VALUES ('net1', '["net1"]', 'net1', 'projA', 7,
                        '[{"tenant":"projB","tenant_access":4}]', 1500, '["64512:1"]');
            INSERT INTO subnet
                (uuid, fq_name, display_name, parent_uuid, parent_type, owner, owner_access,
                 cidr, dhcp)
                VALUES ('sub2', '["net1","sub2"]', 'sub2', 'net1', 'network', 'projA', 7,
                        '10.0.2.0/24', 0);
            INSERT INTO subnet
                (uuid, fq_name, display_name, parent_uuid, parent_type, owner, owner_access,
                 cidr, dhcp)
                VALUES ('sub1', '["net1","sub1"]', 'sub1', 'net1', 'network', 'projA', 7,
                        '10.0.1.0/24', 1);
            INSERT INTO port (uuid, fq_name, display_name, owner, owner_access, mac)
                VALUES ('p1', '["p1"]', 'p1', 'projA', 7, 'aa:bb');
            INSERT INTO ref_port_network ("from", "to", vlan) VALUES ('p1', 'net1', 100);
            "#,
        )
        .unwrap();
        (conn, registry)
    }

    fn load(
        conn: &Connection,
        registry: &SchemaRegistry,
        resource_type: &str,
    ) -> StorageResult<Vec<Resource>> {
        let schema = registry.get(resource_type).unwrap();
        let query = QueryBuilder::new(registry, schema)
            .build(&ListSpec::new().with_detail(true))
            .unwrap();
        let mut stmt = conn.prepare(&query.sql).unwrap();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(query.params.iter()))
            .unwrap();
        let mut out = Vec::new();
        while let Some(row) = rows.next().unwrap() {
            out.push(reconstruct(registry, schema, &query.columns, row)?);
        }
        Ok(out)
    }

    #[test]
    fn test_scalars_and_structured_fields() {
        let (conn, registry) = setup();
        let networks = load(&conn, &registry, "network").unwrap();
        assert_eq!(networks.len(), 1);

        let net = &networks[0];
        assert_eq!(net.uuid, "net1");
        assert_eq!(net.fq_name, vec!["net1"]);
        assert_eq!(net.perms.owner.as_str(), "projA");
        assert_eq!(net.perms.share, vec![ShareEntry::new("projB", 4)]);
        assert_eq!(net.field("mtu"), Some(&FieldValue::Integer(1500)));
        assert_eq!(
            net.field("route_targets"),
            Some(&FieldValue::Json(json!(["64512:1"])))
        );
    }

    #[test]
    fn test_children_are_fully_decoded_and_sorted() {
        let (conn, registry) = setup();
        let net = load(&conn, &registry, "network").unwrap().remove(0);

        let subnets = net.children_of("subnet");
        assert_eq!(subnets.len(), 2);
        assert_eq!(subnets[0].uuid, "sub1");
        assert_eq!(subnets[0].parent_uuid.as_deref(), Some("net1"));
        assert_eq!(subnets[0].fq_name, vec!["net1", "sub1"]);
        assert_eq!(subnets[0].field("dhcp"), Some(&FieldValue::Boolean(true)));
        assert_eq!(subnets[1].field("dhcp"), Some(&FieldValue::Boolean(false)));
        assert!(subnets[0].children.is_empty());

        let ports = net.back_refs_from("port");
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].field("mac"), Some(&FieldValue::from("aa:bb")));
    }

    #[test]
    fn test_reference_stubs_carry_edge_attributes() {
        let (conn, registry) = setup();
        let port = load(&conn, &registry, "port").unwrap().remove(0);
        let refs = port.references_to("network");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uuid, "net1");
        assert_eq!(refs[0].attrs.get("vlan"), Some(&FieldValue::Integer(100)));
    }

    #[test]
    fn test_empty_aggregations_yield_nothing() {
        let (conn, registry) = setup();
        conn.execute("DELETE FROM ref_port_network", []).unwrap();
        let port = load(&conn, &registry, "port").unwrap().remove(0);
        assert!(port.references.is_empty());
        assert!(port.children.is_empty());
    }

    #[test]
    fn test_entries_without_identity_are_skipped() {
        let registry = registry();
        let schema = registry.get("subnet").unwrap();
        let object = json!({"uuid": null, "cidr": "10.0.0.0/8"});
        assert!(
            decode_object(schema, object.as_object().unwrap())
                .unwrap()
                .is_none()
        );

        let port = registry.get("port").unwrap();
        let stubs = decode_references(port, "network", &[json!({"to": null})]).unwrap();
        assert!(stubs.is_empty());
    }

    #[test]
    fn test_corrupt_structured_column_is_reported() {
        let (conn, registry) = setup();
        conn.execute(
            "UPDATE network SET route_targets = '{broken' WHERE uuid = 'net1'",
            [],
        )
        .unwrap();
        let err = load(&conn, &registry, "network").unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("route_targets"));
        assert!(err.to_string().contains("net1"));
    }

    #[test]
    fn test_corrupt_child_column_is_reported() {
        let (conn, registry) = setup();
        conn.execute(
            "UPDATE subnet SET fq_name = 'nope' WHERE uuid = 'sub1'",
            [],
        )
        .unwrap();
        let err = load(&conn, &registry, "network").unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("sub1"));
    }
}
