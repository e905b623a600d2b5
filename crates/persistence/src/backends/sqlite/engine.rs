//! Resource operations over a single SQLite connection.
//!
//! Functions here issue statements on the connection they are given and
//! leave the transaction scope to the caller; mutations are expected to run
//! inside [`with_transaction`](super::transaction::with_transaction). Every
//! statement is preceded by a cancellation check.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{Connection, params_from_iter};

use crate::error::{ResourceError, StorageResult, ValidationError};
use crate::model::catalog::PROJECT;
use crate::model::{
    BackReferenceDef, BackReferenceKind, ResourceSchema, SchemaRegistry, reference_table,
};
use crate::tenant::{Operation, TenantContext};
use crate::types::{ACCESS_READ, FieldValue, ListSpec, Reference, Resource, ResourceUpdate};

use super::codec;
use super::metadata::{self, MetadataEntry, MetadataKey};
use super::permission::{ensure_writable, has_access, read_predicate};
use super::query_builder::{BASE_ALIAS, ListQuery, QueryBuilder, SqlParam, placeholders, quote};
use super::reconstruct::reconstruct;
use super::statement_error;

/// Names a statement for logging and error context.
#[derive(Debug, Clone, Copy)]
struct Statement<'a> {
    operation: &'a str,
    resource_type: &'a str,
    identifier: &'a str,
}

fn execute(
    conn: &Connection,
    tenant: &TenantContext,
    stmt: Statement<'_>,
    sql: &str,
    params: &[SqlParam],
) -> StorageResult<usize> {
    tenant.cancellation().check()?;
    tracing::debug!(
        operation = stmt.operation,
        resource_type = stmt.resource_type,
        sql,
        binds = params.len(),
        "Executing statement"
    );
    conn.execute(sql, params_from_iter(params.iter()))
        .map_err(statement_error(stmt.operation, stmt.resource_type, stmt.identifier))
}

fn count_rows(
    conn: &Connection,
    tenant: &TenantContext,
    stmt: Statement<'_>,
    sql: &str,
    params: &[SqlParam],
) -> StorageResult<u64> {
    tenant.cancellation().check()?;
    tracing::debug!(
        operation = stmt.operation,
        resource_type = stmt.resource_type,
        sql,
        binds = params.len(),
        "Executing count"
    );
    let count: i64 = conn
        .query_row(sql, params_from_iter(params.iter()), |row| row.get(0))
        .map_err(statement_error(stmt.operation, stmt.resource_type, stmt.identifier))?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Runs a list statement and reconstructs every row.
fn run_query(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    query: &ListQuery,
) -> StorageResult<Vec<Resource>> {
    tenant.cancellation().check()?;
    tracing::debug!(
        resource_type = schema.name(),
        sql = %query.sql,
        binds = query.params.len(),
        "Executing list"
    );
    let on_error = || statement_error("list", schema.name(), "*");
    let mut statement = conn.prepare(&query.sql).map_err(on_error())?;
    let mut rows = statement
        .query(params_from_iter(query.params.iter()))
        .map_err(on_error())?;

    let mut resources = Vec::new();
    while let Some(row) = rows.next().map_err(on_error())? {
        tenant.cancellation().check()?;
        resources.push(reconstruct(registry, schema, &query.columns, row)?);
    }
    Ok(resources)
}

/// Loads one resource with its relationships.
///
/// With `check_read` unset the base row is fetched regardless of the
/// caller's grants; embedded back-references are always filtered.
fn fetch(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    uuid: &str,
    check_read: bool,
) -> StorageResult<Resource> {
    let spec = ListSpec::new().with_filter("uuid", [uuid]).with_detail(true);
    let base = if check_read {
        read_predicate(tenant, BASE_ALIAS)
    } else {
        None
    };
    let query = QueryBuilder::new(registry, schema)
        .with_permission(base)
        .with_child_permission(read_predicate(tenant, "c"))
        .build(&spec)?;

    run_query(conn, registry, tenant, schema, &query)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ResourceError::NotFound {
                resource_type: schema.name().to_string(),
                uuid: uuid.to_string(),
            }
            .into()
        })
}

/// Returns `true` if `tenant` may read the parent named by `entry`.
fn parent_visible(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    entry: &MetadataEntry,
) -> StorageResult<bool> {
    let schema = registry.get(&entry.resource_type)?;
    has_access(conn, tenant, schema, &entry.uuid, ACCESS_READ, "resolve parent")
}

/// Resolves `parent_fq_name` in `spec` to a parent uuid.
///
/// A parent the caller cannot read does not resolve.
fn resolve_list_parent(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    spec: &ListSpec,
) -> StorageResult<Option<String>> {
    let Some(fq_name) = &spec.parent_fq_name else {
        return Ok(None);
    };
    let types = match &spec.parent_type {
        Some(parent_type) => vec![parent_type.clone()],
        None => schema.parents().to_vec(),
    };
    tenant.cancellation().check()?;
    let entry = metadata::get(
        conn,
        MetadataKey::FqName {
            types: &types,
            fq_name,
        },
    )?;
    match entry {
        Some(entry) if parent_visible(conn, registry, tenant, &entry)? => Ok(Some(entry.uuid)),
        _ => Err(ResourceError::ParentNotFound {
            parent: fq_name.join(":"),
        }
        .into()),
    }
}

/// Lists resources of one type visible to `tenant`.
///
/// `limit` is the already-clamped page size; `None` returns every row.
pub fn list_resources(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    resource_type: &str,
    spec: &ListSpec,
    limit: Option<usize>,
) -> StorageResult<Vec<Resource>> {
    tenant.check_permission(Operation::List, resource_type)?;
    let schema = registry.get(resource_type)?;
    let parent_uuid = resolve_list_parent(conn, registry, tenant, schema, spec)?;

    let query = QueryBuilder::new(registry, schema)
        .with_permission(read_predicate(tenant, BASE_ALIAS))
        .with_child_permission(read_predicate(tenant, "c"))
        .with_parent_uuid(parent_uuid)
        .with_limit(limit)
        .build(spec)?;
    run_query(conn, registry, tenant, schema, &query)
}

/// Counts resources of one type visible to `tenant`, ignoring pagination.
pub fn count_resources(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    resource_type: &str,
    spec: &ListSpec,
) -> StorageResult<u64> {
    tenant.check_permission(Operation::List, resource_type)?;
    let schema = registry.get(resource_type)?;
    let parent_uuid = resolve_list_parent(conn, registry, tenant, schema, spec)?;

    let query = QueryBuilder::new(registry, schema)
        .with_permission(read_predicate(tenant, BASE_ALIAS))
        .with_parent_uuid(parent_uuid)
        .build_count(spec)?;
    count_rows(
        conn,
        tenant,
        Statement {
            operation: "count",
            resource_type,
            identifier: "*",
        },
        &query.sql,
        &query.params,
    )
}

/// Reads one resource. Absent and unreadable resources are both `NotFound`.
pub fn get_resource(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    resource_type: &str,
    uuid: &str,
) -> StorageResult<Resource> {
    tenant.check_permission(Operation::Read, resource_type)?;
    let schema = registry.get(resource_type)?;
    fetch(conn, registry, tenant, schema, uuid, true)
}

/// Parent fq_name and candidate parent types for a resource created
/// without a parent uuid.
///
/// The parent is named by the resource's own fq_name or, failing that, is
/// the caller's project `[domain, project]` when the type may live under one.
fn parent_name(
    tenant: &TenantContext,
    schema: &ResourceSchema,
    resource: &Resource,
) -> Option<(Vec<String>, Vec<String>)> {
    let types = match &resource.parent_type {
        Some(parent_type) => vec![parent_type.clone()],
        None => schema.parents().to_vec(),
    };
    if resource.fq_name.len() >= 2 {
        let name = resource.fq_name[..resource.fq_name.len() - 1].to_vec();
        return Some((name, types));
    }
    if !resource.fq_name.is_empty() || !schema.allows_parent(PROJECT) {
        return None;
    }
    if resource.parent_type.as_deref().is_some_and(|t| t != PROJECT) {
        return None;
    }
    let domain = tenant.domain_id()?;
    let name = vec![
        domain.as_str().to_string(),
        tenant.tenant_id().as_str().to_string(),
    ];
    Some((name, vec![PROJECT.to_string()]))
}

/// Finds the parent of a new resource and checks it is an allowed type.
///
/// Parents the caller cannot read are reported exactly like missing ones.
fn resolve_parent(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    resource: &Resource,
) -> StorageResult<Option<MetadataEntry>> {
    let invalid_parent = |parent_type: &str| ValidationError::InvalidParent {
        resource_type: schema.name().to_string(),
        parent_type: parent_type.to_string(),
    };

    if schema.is_root() {
        if resource.parent_uuid.is_some() || resource.parent_type.is_some() {
            let parent_type = resource.parent_type.as_deref().unwrap_or("<none>");
            return Err(invalid_parent(parent_type).into());
        }
        return Ok(None);
    }

    tenant.cancellation().check()?;
    let (entry, requested) = if let Some(parent_uuid) = &resource.parent_uuid {
        let entry = metadata::get(conn, MetadataKey::Uuid(parent_uuid))?;
        (entry, parent_uuid.clone())
    } else if let Some((name, types)) = parent_name(tenant, schema, resource) {
        let entry = metadata::get(
            conn,
            MetadataKey::FqName {
                types: &types,
                fq_name: &name,
            },
        )?;
        (entry, name.join(":"))
    } else {
        return Err(ValidationError::MissingRequiredField {
            field: "parent_uuid".to_string(),
        }
        .into());
    };

    let entry = match entry {
        Some(entry) if parent_visible(conn, registry, tenant, &entry)? => entry,
        _ => return Err(ResourceError::ParentNotFound { parent: requested }.into()),
    };

    if !schema.allows_parent(&entry.resource_type) {
        return Err(invalid_parent(&entry.resource_type).into());
    }
    if let Some(declared) = &resource.parent_type {
        if declared != &entry.resource_type {
            return Err(invalid_parent(declared).into());
        }
    }
    Ok(Some(entry))
}

/// Validates and encodes one reference group as `(to, attrs...)` rows.
fn encode_references(
    schema: &ResourceSchema,
    target: &str,
    references: &[Reference],
) -> StorageResult<Vec<Vec<SqlParam>>> {
    let definition = schema
        .reference(target)
        .ok_or_else(|| ValidationError::UnknownReference {
            resource_type: schema.name().to_string(),
            target_type: target.to_string(),
        })?;
    let table = definition.table_name(schema.name());

    let mut seen = BTreeSet::new();
    let mut rows = Vec::with_capacity(references.len());
    for reference in references {
        if reference.uuid.is_empty() || !seen.insert(reference.uuid.as_str()) {
            return Err(ValidationError::InvalidFieldValue {
                field: definition.column_alias(),
                expected: "distinct, non-empty target uuids".to_string(),
            }
            .into());
        }
        if let Some(unknown) = reference
            .attrs
            .keys()
            .find(|name| definition.attr_kind(name).is_none())
        {
            return Err(ValidationError::UnknownField {
                resource_type: table.clone(),
                field: unknown.clone(),
            }
            .into());
        }

        let mut row = vec![SqlParam::string(&reference.uuid)];
        for attr in &definition.attrs {
            let value = reference.attrs.get(&attr.name).unwrap_or(&FieldValue::Null);
            row.push(codec::encode_field(&table, attr, value)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Inserts the edges of one reference group.
fn insert_references(
    conn: &Connection,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    from: &str,
    target: &str,
    rows: Vec<Vec<SqlParam>>,
) -> StorageResult<()> {
    let Some(definition) = schema.reference(target) else {
        return Ok(());
    };
    let table = definition.table_name(schema.name());
    let mut columns = vec![quote("from"), quote("to")];
    columns.extend(definition.attrs.iter().map(|attr| quote(&attr.name)));
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(&table),
        columns.join(", "),
        placeholders(columns.len())
    );

    for row in rows {
        let mut params = Vec::with_capacity(row.len() + 1);
        params.push(SqlParam::string(from));
        params.extend(row);
        execute(
            conn,
            tenant,
            Statement {
                operation: "insert reference",
                resource_type: &table,
                identifier: from,
            },
            &sql,
            &params,
        )?;
    }
    Ok(())
}

/// Creates a resource, its outbound references and its metadata entry.
///
/// Returns the stored resource as read back from the database.
pub fn create_resource(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    mut resource: Resource,
) -> StorageResult<Resource> {
    tenant.check_permission(Operation::Create, &resource.resource_type)?;
    let schema = registry.get(&resource.resource_type)?;

    if resource.uuid.is_empty() {
        resource.uuid = uuid::Uuid::new_v4().to_string();
    }

    let parent = resolve_parent(conn, registry, tenant, schema, &resource)?;
    match (&parent, resource.fq_name.is_empty()) {
        (_, true) if resource.display_name.is_empty() => {
            return Err(ValidationError::MissingRequiredField {
                field: "fq_name".to_string(),
            }
            .into());
        }
        (Some(parent), true) => {
            resource.fq_name = parent.fq_name.clone();
            resource.fq_name.push(resource.display_name.clone());
        }
        (None, true) => resource.fq_name = vec![resource.display_name.clone()],
        (Some(parent), false) => {
            let consistent = resource.fq_name.len() == parent.fq_name.len() + 1
                && resource.fq_name.starts_with(&parent.fq_name);
            if !consistent {
                return Err(ValidationError::InvalidFieldValue {
                    field: "fq_name".to_string(),
                    expected: format!("{}:<name>", parent.fq_name.join(":")),
                }
                .into());
            }
        }
        (None, false) => {}
    }
    if resource.display_name.is_empty() {
        resource.display_name = resource.fq_name.last().cloned().unwrap_or_default();
    }
    if let Some(parent) = &parent {
        resource.parent_uuid = Some(parent.uuid.clone());
        resource.parent_type = Some(parent.resource_type.clone());
    }

    tenant.cancellation().check()?;
    if metadata::get(conn, MetadataKey::Uuid(&resource.uuid))?.is_some() {
        return Err(ResourceError::AlreadyExists {
            resource_type: resource.resource_type.clone(),
            uuid: resource.uuid.clone(),
        }
        .into());
    }
    let own_type = [resource.resource_type.clone()];
    let taken = metadata::get(
        conn,
        MetadataKey::FqName {
            types: &own_type,
            fq_name: &resource.fq_name,
        },
    )?;
    if taken.is_some() {
        return Err(ResourceError::FqNameConflict {
            resource_type: resource.resource_type.clone(),
            fq_name: resource.fq_name_string(),
        }
        .into());
    }

    if !tenant.is_admin() || resource.perms.owner.as_str().is_empty() {
        resource.perms.owner = tenant.tenant_id().clone();
    }
    resource.creator = tenant.user_id().map(str::to_string);
    let now = Utc::now();
    resource.created = Some(now);
    resource.last_modified = Some(now);

    let mut edges = Vec::with_capacity(resource.references.len());
    for (target, references) in &resource.references {
        edges.push((target.as_str(), encode_references(schema, target, references)?));
    }

    let row = codec::encode_row(schema, &resource)?;
    let (columns, params): (Vec<String>, Vec<SqlParam>) = row.into_iter().unzip();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(schema.name()),
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
        placeholders(columns.len())
    );
    execute(
        conn,
        tenant,
        Statement {
            operation: "create",
            resource_type: schema.name(),
            identifier: &resource.uuid,
        },
        &sql,
        &params,
    )?;

    for (target, rows) in edges {
        insert_references(conn, tenant, schema, &resource.uuid, target, rows)?;
    }

    tenant.cancellation().check()?;
    metadata::put(
        conn,
        &MetadataEntry {
            uuid: resource.uuid.clone(),
            resource_type: resource.resource_type.clone(),
            fq_name: resource.fq_name.clone(),
        },
    )?;

    tracing::debug!(
        resource_type = schema.name(),
        uuid = %resource.uuid,
        fq_name = %resource.fq_name_string(),
        "Created resource"
    );
    fetch(conn, registry, tenant, schema, &resource.uuid, false)
}

/// Applies a partial update to a writable resource.
///
/// Reference groups named in the update replace the stored group wholesale.
/// Unprivileged callers cannot transfer ownership; the stored owner is kept.
pub fn update_resource(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    resource_type: &str,
    uuid: &str,
    update: ResourceUpdate,
) -> StorageResult<Resource> {
    tenant.check_permission(Operation::Update, resource_type)?;
    let schema = registry.get(resource_type)?;
    ensure_writable(conn, tenant, schema, uuid, "update")?;

    let mut assignments: Vec<(String, SqlParam)> = Vec::new();
    if let Some(display_name) = &update.display_name {
        assignments.push(("display_name".to_string(), SqlParam::string(display_name)));
    }
    for (name, value) in &update.fields {
        let field = schema.field(name).ok_or_else(|| ValidationError::UnknownField {
            resource_type: schema.name().to_string(),
            field: name.clone(),
        })?;
        assignments.push((name.clone(), codec::encode_field(schema.name(), field, value)?));
    }
    if let Some(perms) = &update.perms {
        if tenant.is_admin() && !perms.owner.as_str().is_empty() {
            assignments.push(("owner".to_string(), SqlParam::string(perms.owner.as_str())));
        }
        assignments.push((
            "owner_access".to_string(),
            SqlParam::integer(i64::from(perms.owner_access)),
        ));
        assignments.push((
            "group_name".to_string(),
            perms.group.as_ref().map_or(SqlParam::Null, SqlParam::string),
        ));
        assignments.push((
            "group_access".to_string(),
            SqlParam::integer(i64::from(perms.group_access)),
        ));
        assignments.push((
            "global_access".to_string(),
            SqlParam::integer(i64::from(perms.global_access)),
        ));
        assignments.push((
            "share".to_string(),
            SqlParam::String(serde_json::to_string(&perms.share)?),
        ));
    }

    let mut edges = Vec::with_capacity(update.references.len());
    for (target, references) in &update.references {
        edges.push((target.as_str(), encode_references(schema, target, references)?));
    }

    assignments.push((
        "last_modified".to_string(),
        codec::to_param(&FieldValue::Timestamp(Utc::now())),
    ));
    let (columns, mut params): (Vec<String>, Vec<SqlParam>) = assignments.into_iter().unzip();
    params.push(SqlParam::string(uuid));
    let sql = format!(
        "UPDATE {} SET {} WHERE \"uuid\" = ?",
        quote(schema.name()),
        columns
            .iter()
            .map(|c| format!("{} = ?", quote(c)))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let stmt = Statement {
        operation: "update",
        resource_type: schema.name(),
        identifier: uuid,
    };
    execute(conn, tenant, stmt, &sql, &params)?;

    for (target, rows) in edges {
        let table = reference_table(schema.name(), target);
        execute(
            conn,
            tenant,
            Statement {
                operation: "replace references",
                resource_type: &table,
                identifier: uuid,
            },
            &format!("DELETE FROM {} WHERE \"from\" = ?", quote(&table)),
            &[SqlParam::string(uuid)],
        )?;
        insert_references(conn, tenant, schema, uuid, target, rows)?;
    }

    tracing::debug!(resource_type = schema.name(), uuid, "Updated resource");
    fetch(conn, registry, tenant, schema, uuid, false)
}

/// Counts the rows depending on `uuid` through one back-reference, and how
/// many of those `tenant` can read.
fn count_dependents(
    conn: &Connection,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    back_reference: &BackReferenceDef,
    uuid: &str,
) -> StorageResult<(u64, u64)> {
    let source = quote(&back_reference.source);
    let (table, from) = match back_reference.kind {
        BackReferenceKind::Parent => (
            back_reference.source.clone(),
            format!("{} d WHERE d.\"parent_uuid\" = ?", source),
        ),
        BackReferenceKind::Reference => {
            let table = reference_table(&back_reference.source, schema.name());
            let from = format!(
                "{} r LEFT JOIN {} d ON d.\"uuid\" = r.\"from\" WHERE r.\"to\" = ?",
                quote(&table),
                source
            );
            (table, from)
        }
    };
    let mut params = Vec::new();
    let visible = match read_predicate(tenant, "d") {
        Some(predicate) => {
            params.extend(predicate.params);
            format!(
                "COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0)",
                predicate.sql
            )
        }
        None => "count(*)".to_string(),
    };
    params.push(SqlParam::string(uuid));
    let sql = format!("SELECT count(*), {} FROM {}", visible, from);

    tenant.cancellation().check()?;
    tracing::debug!(
        resource_type = %table,
        sql = %sql,
        binds = params.len(),
        "Counting dependents"
    );
    let (total, visible): (i64, i64) = conn
        .query_row(&sql, params_from_iter(params.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .map_err(statement_error("count dependents", &table, uuid))?;
    Ok((
        u64::try_from(total).unwrap_or_default(),
        u64::try_from(visible).unwrap_or_default(),
    ))
}

/// Deletes a writable resource that has no children or inbound references.
pub fn delete_resource(
    conn: &Connection,
    registry: &SchemaRegistry,
    tenant: &TenantContext,
    resource_type: &str,
    uuid: &str,
) -> StorageResult<()> {
    tenant.check_permission(Operation::Delete, resource_type)?;
    let schema = registry.get(resource_type)?;
    ensure_writable(conn, tenant, schema, uuid, "delete")?;

    let mut dependents = Vec::new();
    let mut hidden = 0;
    for back_reference in schema.back_references() {
        let (total, visible) = count_dependents(conn, tenant, schema, back_reference, uuid)?;
        if visible > 0 {
            let label = match back_reference.kind {
                BackReferenceKind::Parent => "children",
                BackReferenceKind::Reference => "references",
            };
            dependents.push(format!("{} {} {}", visible, back_reference.source, label));
        }
        hidden += total.saturating_sub(visible);
    }
    if hidden > 0 {
        dependents.push(format!("{} not visible to the caller", hidden));
    }
    if !dependents.is_empty() {
        return Err(ResourceError::HasDependents {
            resource_type: schema.name().to_string(),
            uuid: uuid.to_string(),
            dependents: dependents.join(", "),
        }
        .into());
    }

    for reference in schema.references() {
        let table = reference.table_name(schema.name());
        execute(
            conn,
            tenant,
            Statement {
                operation: "delete references",
                resource_type: &table,
                identifier: uuid,
            },
            &format!("DELETE FROM {} WHERE \"from\" = ?", quote(&table)),
            &[SqlParam::string(uuid)],
        )?;
    }

    execute(
        conn,
        tenant,
        Statement {
            operation: "delete",
            resource_type: schema.name(),
            identifier: uuid,
        },
        &format!("DELETE FROM {} WHERE \"uuid\" = ?", quote(schema.name())),
        &[SqlParam::string(uuid)],
    )?;

    tenant.cancellation().check()?;
    metadata::delete(conn, uuid)?;

    tracing::debug!(resource_type = schema.name(), uuid, "Deleted resource");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sqlite::schema::initialize_schema;
    use crate::core::Cancellation;
    use crate::model::ResourceSchema;
    use crate::tenant::{TenantId, TenantPermissions};
    use crate::types::{FieldKind, PermissionDescriptor};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(vec![
            ResourceSchema::builder("config_root").build(),
            ResourceSchema::builder("network")
                .parent("config_root")
                .field("mtu", FieldKind::Integer)
                .build(),
            ResourceSchema::builder("subnet")
                .parent("network")
                .field("cidr", FieldKind::String)
                .build(),
            ResourceSchema::builder("port")
                .parent("network")
                .reference("subnet")
                .build(),
        ])
        .unwrap()
    }

    fn setup() -> (Connection, SchemaRegistry) {
        let conn = Connection::open_in_memory().unwrap();
        let registry = registry();
        initialize_schema(&conn, &registry).unwrap();
        (conn, registry)
    }

    fn admin() -> TenantContext {
        TenantContext::admin(TenantId::new("cloud-admin"))
    }

    fn member(project: &str) -> TenantContext {
        TenantContext::new(TenantId::new(project), TenantPermissions::full_access())
    }

    fn seed(conn: &Connection, registry: &SchemaRegistry) -> (Resource, Resource) {
        let root = create_resource(
            conn,
            registry,
            &admin(),
            Resource::new("config_root")
                .with_uuid("root")
                .with_display_name("root")
                .with_perms(PermissionDescriptor::default().with_global_access(ACCESS_READ)),
        )
        .unwrap();
        let net = create_resource(
            conn,
            registry,
            &member("projA"),
            Resource::new("network")
                .with_uuid("net1")
                .with_fq_name(["root", "net1"])
                .with_field("mtu", 1500i64),
        )
        .unwrap();
        (root, net)
    }

    #[test]
    fn test_create_derives_identity() {
        let (conn, registry) = setup();
        let (root, net) = seed(&conn, &registry);

        assert_eq!(root.fq_name, vec!["root".to_string()]);
        assert_eq!(net.parent_uuid.as_deref(), Some("root"));
        assert_eq!(net.parent_type.as_deref(), Some("config_root"));
        assert_eq!(net.display_name, "net1");
        assert_eq!(net.perms.owner.as_str(), "projA");
        assert!(net.created.is_some());

        let subnet = create_resource(
            &conn,
            &registry,
            &member("projA"),
            Resource::new("subnet")
                .with_display_name("s1")
                .with_parent("network", "net1"),
        )
        .unwrap();
        assert!(!subnet.uuid.is_empty());
        assert_eq!(subnet.fq_name_string(), "root:net1:s1");
    }

    #[test]
    fn test_create_conflicts() {
        let (conn, registry) = setup();
        seed(&conn, &registry);

        let err = create_resource(
            &conn,
            &registry,
            &member("projA"),
            Resource::new("network")
                .with_uuid("net1")
                .with_fq_name(["root", "other"]),
        )
        .unwrap_err();
        assert!(err.is_conflict());

        let err = create_resource(
            &conn,
            &registry,
            &member("projA"),
            Resource::new("network")
                .with_uuid("net2")
                .with_fq_name(["root", "net1"]),
        )
        .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_create_parent_checks() {
        let (conn, registry) = setup();
        seed(&conn, &registry);

        let err = create_resource(
            &conn,
            &registry,
            &member("projA"),
            Resource::new("subnet").with_fq_name(["root", "missing", "s1"]),
        )
        .unwrap_err();
        assert!(err.is_not_found());

        let err = create_resource(
            &conn,
            &registry,
            &member("projA"),
            Resource::new("subnet")
                .with_display_name("s1")
                .with_parent("config_root", "root"),
        )
        .unwrap_err();
        assert!(err.is_validation());

        let err = create_resource(
            &conn,
            &registry,
            &member("projA"),
            Resource::new("subnet").with_display_name("orphan"),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_list_applies_permissions() {
        let (conn, registry) = setup();
        seed(&conn, &registry);

        let spec = ListSpec::new();
        let own =
            list_resources(&conn, &registry, &member("projA"), "network", &spec, None).unwrap();
        assert_eq!(own.len(), 1);

        let other =
            list_resources(&conn, &registry, &member("projB"), "network", &spec, None).unwrap();
        assert!(other.is_empty());
        assert_eq!(
            count_resources(&conn, &registry, &member("projB"), "network", &spec).unwrap(),
            0
        );

        let err = get_resource(&conn, &registry, &member("projB"), "network", "net1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_by_parent_name() {
        let (conn, registry) = setup();
        seed(&conn, &registry);

        let spec = ListSpec::new().with_parent_fq_name(["root"]);
        let found = list_resources(&conn, &registry, &admin(), "network", &spec, None).unwrap();
        assert_eq!(found.len(), 1);

        let spec = ListSpec::new().with_parent_fq_name(["nowhere"]);
        let err = list_resources(&conn, &registry, &admin(), "network", &spec, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_fields_and_references() {
        let (conn, registry) = setup();
        seed(&conn, &registry);
        let tenant = member("projA");
        create_resource(
            &conn,
            &registry,
            &tenant,
            Resource::new("subnet")
                .with_uuid("s1")
                .with_parent("network", "net1")
                .with_display_name("s1"),
        )
        .unwrap();
        create_resource(
            &conn,
            &registry,
            &tenant,
            Resource::new("port")
                .with_uuid("p1")
                .with_parent("network", "net1")
                .with_display_name("p1"),
        )
        .unwrap();

        let updated = update_resource(
            &conn,
            &registry,
            &tenant,
            "port",
            "p1",
            ResourceUpdate::new()
                .with_display_name("renamed")
                .with_references("subnet", vec![Reference::new("s1")]),
        )
        .unwrap();
        assert_eq!(updated.display_name, "renamed");
        assert_eq!(updated.references_to("subnet").len(), 1);

        let subnet = get_resource(&conn, &registry, &tenant, "subnet", "s1").unwrap();
        assert_eq!(subnet.back_refs_from("port").len(), 1);

        let err = update_resource(
            &conn,
            &registry,
            &tenant,
            "network",
            "net1",
            ResourceUpdate::new().with_field("colour", "red"),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_update_keeps_owner_for_members() {
        let (conn, registry) = setup();
        seed(&conn, &registry);

        let updated = update_resource(
            &conn,
            &registry,
            &member("projA"),
            "network",
            "net1",
            ResourceUpdate::new()
                .with_perms(PermissionDescriptor::owned_by("projB").with_global_access(4)),
        )
        .unwrap();
        assert_eq!(updated.perms.owner.as_str(), "projA");
        assert_eq!(updated.perms.global_access, 4);

        let visible =
            list_resources(&conn, &registry, &member("projB"), "network", &ListSpec::new(), None)
                .unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn test_delete_refuses_dependents() {
        let (conn, registry) = setup();
        seed(&conn, &registry);

        let err = delete_resource(&conn, &registry, &admin(), "config_root", "root").unwrap_err();
        assert!(err.is_conflict());

        delete_resource(&conn, &registry, &member("projA"), "network", "net1").unwrap();
        assert!(metadata::get(&conn, MetadataKey::Uuid("net1")).unwrap().is_none());
        delete_resource(&conn, &registry, &admin(), "config_root", "root").unwrap();
    }

    #[test]
    fn test_cancelled_tenant_runs_nothing() {
        let (conn, registry) = setup();
        let token = Cancellation::new();
        token.cancel();
        let tenant = admin().with_cancellation(token);

        let err = create_resource(
            &conn,
            &registry,
            &tenant,
            Resource::new("config_root").with_display_name("root"),
        )
        .unwrap_err();
        assert!(err.is_cancelled());
        let rows: i64 = conn
            .query_row("SELECT count(*) FROM config_root", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
