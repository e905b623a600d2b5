//! Metadata index: uuid, type and fully-qualified name of every resource.
//!
//! Entries are written and removed in the same transaction as the resource
//! row, so the index and the resource tables never disagree. Lookups by
//! name resolve hierarchical parents; lookups by uuid find a resource
//! without knowing its type.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{BackendError, StorageError, StorageResult};

use super::codec::fq_name_text;
use super::statement_error;

/// Name of the index table.
pub const METADATA_TABLE: &str = "metadata";

/// One index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// Resource uuid.
    pub uuid: String,
    /// Resource type.
    pub resource_type: String,
    /// Fully-qualified name.
    pub fq_name: Vec<String>,
}

/// Key for [`get`].
#[derive(Debug, Clone, Copy)]
pub enum MetadataKey<'a> {
    /// Look up by uuid.
    Uuid(&'a str),
    /// Look up by name among resources of the given types.
    FqName {
        /// Candidate types; empty matches any type.
        types: &'a [String],
        /// Name to match.
        fq_name: &'a [String],
    },
}

/// Inserts an entry.
pub fn put(conn: &Connection, entry: &MetadataEntry) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO metadata (uuid, type, fq_name) VALUES (?1, ?2, ?3)",
        params![entry.uuid, entry.resource_type, fq_name_text(&entry.fq_name)],
    )
    .map_err(statement_error("insert metadata", &entry.resource_type, &entry.uuid))?;
    Ok(())
}

/// Looks up an entry by uuid or name.
pub fn get(conn: &Connection, key: MetadataKey<'_>) -> StorageResult<Option<MetadataEntry>> {
    match key {
        MetadataKey::Uuid(uuid) => conn
            .query_row(
                "SELECT uuid, type, fq_name FROM metadata WHERE uuid = ?1",
                params![uuid],
                read_entry,
            )
            .optional()
            .map_err(statement_error("get metadata", "metadata", uuid))?
            .transpose(),
        MetadataKey::FqName { types, fq_name } => {
            let name = fq_name_text(fq_name);
            let mut sql = "SELECT uuid, type, fq_name FROM metadata WHERE fq_name = ?".to_string();
            let mut values: Vec<&str> = vec![name.as_str()];
            if !types.is_empty() {
                sql.push_str(&format!(
                    " AND type IN ({})",
                    super::query_builder::placeholders(types.len())
                ));
                values.extend(types.iter().map(String::as_str));
            }
            sql.push_str(" ORDER BY type LIMIT 1");
            conn.query_row(&sql, rusqlite::params_from_iter(values), read_entry)
                .optional()
                .map_err(statement_error("get metadata", "metadata", &name))?
                .transpose()
        }
    }
}

/// Removes an entry. Returns `true` if one existed.
pub fn delete(conn: &Connection, uuid: &str) -> StorageResult<bool> {
    let removed = conn
        .execute("DELETE FROM metadata WHERE uuid = ?1", params![uuid])
        .map_err(statement_error("delete metadata", "metadata", uuid))?;
    Ok(removed > 0)
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StorageResult<MetadataEntry>> {
    let uuid: String = row.get(0)?;
    let resource_type: String = row.get(1)?;
    let fq_name_raw: String = row.get(2)?;
    Ok(serde_json::from_str::<Vec<String>>(&fq_name_raw)
        .map(|fq_name| MetadataEntry {
            uuid: uuid.clone(),
            resource_type,
            fq_name,
        })
        .map_err(|e| {
            StorageError::Backend(BackendError::Corruption {
                table: METADATA_TABLE.to_string(),
                column: "fq_name".to_string(),
                uuid,
                message: e.to_string(),
            })
        }))
}
