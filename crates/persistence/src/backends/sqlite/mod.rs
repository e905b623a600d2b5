//! SQLite backend implementation.
//!
//! Each registered resource type gets its own table of common columns plus
//! the type's declared fields. Every reference edge type gets a
//! `ref_<source>_<target>` table, and a `metadata` table indexes every
//! resource by uuid and fully-qualified name.
//!
//! Reads are single statements: the [`query_builder`] emits one `SELECT`
//! whose projection embeds references, children and inbound references as
//! JSON aggregation sub-selects, and the row reconstructor turns each
//! result row back into a [`Resource`](crate::types::Resource).
//!
//! # Example
//!
//! ```no_run
//! use cfgstore_persistence::backends::sqlite::SqliteBackend;
//! use cfgstore_persistence::model::catalog;
//! use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory(catalog::registry()?)?;
//! backend.init_schema()?;
//!
//! let tenant = TenantContext::new(
//!     TenantId::new("projA"),
//!     TenantPermissions::full_access(),
//! );
//! # let _ = tenant;
//! # Ok(())
//! # }
//! ```

mod backend;
pub(crate) mod codec;
pub mod engine;
pub mod metadata;
pub(crate) mod permission;
pub mod query_builder;
pub(crate) mod reconstruct;
pub(crate) mod schema;
mod storage;
pub mod transaction;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use query_builder::{ListQuery, QueryBuilder, SqlFragment, SqlParam};

use crate::error::{BackendError, StorageError, TransactionError, is_interrupted};

/// Maps a failed statement to a [`StorageError`] naming what was attempted.
pub(crate) fn statement_error<'a>(
    operation: &'a str,
    resource_type: &'a str,
    identifier: &'a str,
) -> impl FnOnce(rusqlite::Error) -> StorageError + 'a {
    move |err| {
        if is_interrupted(&err) {
            return StorageError::Transaction(TransactionError::Cancelled);
        }
        StorageError::Backend(BackendError::Statement {
            operation: operation.to_string(),
            resource_type: resource_type.to_string(),
            identifier: identifier.to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}
