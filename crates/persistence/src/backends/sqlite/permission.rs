//! Ownership and sharing predicates.
//!
//! Privileged callers get no predicate at all. Everyone else is limited to
//! rows where at least one grant carries the required access bit:
//!
//! ```sql
//! (t.owner = ? AND (t.owner_access & ?) != 0)
//! OR (t.group_name IN (?, ...) AND (t.group_access & ?) != 0)
//! OR (t.global_access & ?) != 0
//! OR <share list contains the caller's project with the bit set>
//! ```

use rusqlite::Connection;

use crate::error::{ResourceError, StorageResult};
use crate::model::ResourceSchema;
use crate::tenant::TenantContext;
use crate::types::{ACCESS_READ, ACCESS_WRITE};

use super::query_builder::{SqlFragment, SqlParam, placeholders, quote};
use super::statement_error;

/// Predicate granting `bit` to `tenant` on rows aliased as `alias`.
///
/// Returns `None` for privileged callers.
pub fn access_predicate(tenant: &TenantContext, alias: &str, bit: u8) -> Option<SqlFragment> {
    if tenant.is_admin() {
        return None;
    }
    let bit = SqlParam::integer(i64::from(bit));
    let project = SqlParam::string(tenant.tenant_id().as_str());

    let mut predicate = SqlFragment::with_params(
        format!("{a}.\"owner\" = ? AND ({a}.\"owner_access\" & ?) != 0", a = alias),
        vec![project.clone(), bit.clone()],
    );

    if !tenant.groups().is_empty() {
        let mut params: Vec<SqlParam> = tenant.groups().iter().map(SqlParam::string).collect();
        params.push(bit.clone());
        predicate = predicate.or(SqlFragment::with_params(
            format!(
                "{a}.\"group_name\" IN ({p}) AND ({a}.\"group_access\" & ?) != 0",
                a = alias,
                p = placeholders(tenant.groups().len())
            ),
            params,
        ));
    }

    predicate = predicate.or(SqlFragment::with_params(
        format!("({}.\"global_access\" & ?) != 0", alias),
        vec![bit.clone()],
    ));

    // json_each raises on malformed text
    predicate = predicate.or(SqlFragment::with_params(
        format!(
            "CASE WHEN json_valid({a}.\"share\") THEN EXISTS (\
             SELECT 1 FROM json_each({a}.\"share\") s \
             WHERE json_extract(s.value, '$.tenant') = ? \
             AND (json_extract(s.value, '$.tenant_access') & ?) != 0) ELSE 0 END",
            a = alias
        ),
        vec![project, bit],
    ));

    Some(predicate)
}

/// Predicate for list and get.
pub fn read_predicate(tenant: &TenantContext, alias: &str) -> Option<SqlFragment> {
    access_predicate(tenant, alias, ACCESS_READ)
}

/// Predicate for update and delete.
pub fn write_predicate(tenant: &TenantContext, alias: &str) -> Option<SqlFragment> {
    access_predicate(tenant, alias, ACCESS_WRITE)
}

/// Returns `true` if `uuid` exists and grants `bit` to `tenant`.
pub fn has_access(
    conn: &Connection,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    uuid: &str,
    bit: u8,
    operation: &str,
) -> StorageResult<bool> {
    let mut check = SqlFragment::with_params("t.\"uuid\" = ?", vec![SqlParam::string(uuid)]);
    if let Some(predicate) = access_predicate(tenant, "t", bit) {
        check = check.and(predicate);
    }
    let sql = format!(
        "SELECT count(t.\"uuid\") FROM {} t WHERE {}",
        quote(schema.name()),
        check.sql
    );

    tenant.cancellation().check()?;
    let count: i64 = conn
        .query_row(&sql, rusqlite::params_from_iter(check.params.iter()), |row| {
            row.get(0)
        })
        .map_err(statement_error(operation, schema.name(), uuid))?;
    Ok(count > 0)
}

/// Confirms that `uuid` exists and is writable by `tenant`.
///
/// Absence and lack of access are both reported as
/// [`ResourceError::NotFound`], so hidden resources look absent.
pub fn ensure_writable(
    conn: &Connection,
    tenant: &TenantContext,
    schema: &ResourceSchema,
    uuid: &str,
    operation: &str,
) -> StorageResult<()> {
    if has_access(conn, tenant, schema, uuid, ACCESS_WRITE, operation)? {
        return Ok(());
    }
    tracing::debug!(
        resource_type = schema.name(),
        uuid,
        tenant = %tenant.tenant_id(),
        "Resource absent or not writable"
    );
    Err(ResourceError::NotFound {
        resource_type: schema.name().to_string(),
        uuid: uuid.to_string(),
    }
    .into())
}
