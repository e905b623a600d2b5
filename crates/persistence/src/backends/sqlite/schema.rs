//! SQLite table definitions generated from the schema registry.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::model::{ReferenceDef, ResourceSchema, SchemaRegistry};

use super::query_builder::quote;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// DDL of the metadata index.
pub(crate) const METADATA_DDL: &str = "CREATE TABLE IF NOT EXISTS metadata (
    uuid TEXT PRIMARY KEY NOT NULL,
    type TEXT NOT NULL,
    fq_name TEXT NOT NULL,
    UNIQUE (type, fq_name)
);";

fn ddl_error(what: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message: format!("Failed to create {}: {}", what, e),
        source: Some(Box::new(e)),
    })
}

/// Creates every table and index the registry needs. Idempotent.
pub fn initialize_schema(conn: &Connection, registry: &SchemaRegistry) -> StorageResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| ddl_error("schema_version table", e))?;

    conn.execute_batch(METADATA_DDL)
        .map_err(|e| ddl_error("metadata table", e))?;

    for schema in registry.iter() {
        conn.execute_batch(&resource_table_ddl(schema))
            .map_err(|e| ddl_error(&format!("table {}", schema.name()), e))?;
        for reference in schema.references() {
            conn.execute_batch(&reference_table_ddl(schema, reference))
                .map_err(|e| ddl_error(&reference.table_name(schema.name()), e))?;
        }
    }

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| ddl_error("schema_version row", e))?;
    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )
        .map_err(|e| ddl_error("schema_version row", e))?;
    }

    tracing::info!(
        resource_types = registry.len(),
        version = SCHEMA_VERSION,
        "Initialized SQLite schema"
    );
    Ok(())
}

/// DDL for a resource table and its parent index.
pub fn resource_table_ddl(schema: &ResourceSchema) -> String {
    let columns: Vec<String> = schema
        .columns()
        .map(|(name, kind)| match name {
            "uuid" => format!("    {} TEXT PRIMARY KEY NOT NULL", quote(name)),
            "fq_name" => format!("    {} TEXT NOT NULL", quote(name)),
            _ => format!("    {} {}", quote(name), kind.sql_type()),
        })
        .collect();
    let table = schema.name();
    format!(
        "CREATE TABLE IF NOT EXISTS {table_q} (\n{columns}\n);\n\
         CREATE INDEX IF NOT EXISTS {index} ON {table_q} (\"parent_uuid\");",
        table_q = quote(table),
        columns = columns.join(",\n"),
        index = quote(&format!("idx_{}_parent_uuid", table)),
    )
}

/// DDL for a reference join table and its inbound index.
pub fn reference_table_ddl(schema: &ResourceSchema, reference: &ReferenceDef) -> String {
    let table = reference.table_name(schema.name());
    let mut columns = vec![
        "    \"from\" TEXT NOT NULL".to_string(),
        "    \"to\" TEXT NOT NULL".to_string(),
    ];
    columns.extend(
        reference
            .attrs
            .iter()
            .map(|attr| format!("    {} {}", quote(&attr.name), attr.kind.sql_type())),
    );
    columns.push("    PRIMARY KEY (\"from\", \"to\")".to_string());
    format!(
        "CREATE TABLE IF NOT EXISTS {table_q} (\n{columns}\n);\n\
         CREATE INDEX IF NOT EXISTS {index} ON {table_q} (\"to\");",
        table_q = quote(&table),
        columns = columns.join(",\n"),
        index = quote(&format!("idx_{}_to", table)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::catalog;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = catalog::registry().unwrap();
        initialize_schema(&conn, &registry).unwrap();
        initialize_schema(&conn, &registry).unwrap();

        let versions: i64 = conn
            .query_row("SELECT count(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_unreadable_version_row_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version TEXT NOT NULL);
             INSERT INTO schema_version (version) VALUES ('one');",
        )
        .unwrap();

        let err = initialize_schema(&conn, &catalog::registry().unwrap()).unwrap_err();
        assert!(err.to_string().contains("schema_version"));
        let versions: i64 = conn
            .query_row("SELECT count(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_creates_resource_and_reference_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = catalog::registry().unwrap();
        initialize_schema(&conn, &registry).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"metadata".to_string()));
        assert!(tables.contains(&"virtual_network".to_string()));
        assert!(tables.contains(&"ref_virtual_network_network_ipam".to_string()));
        assert!(tables.contains(&"ref_global_system_config_bgp_router".to_string()));
    }

    #[test]
    fn test_reference_table_has_edge_columns() {
        let registry = catalog::registry().unwrap();
        let vn = registry.get("virtual_network").unwrap();
        let ddl = reference_table_ddl(vn, vn.reference("network_ipam").unwrap());
        assert!(ddl.contains("\"ipam_subnets\" TEXT"));
        assert!(ddl.contains("PRIMARY KEY (\"from\", \"to\")"));
    }
}
