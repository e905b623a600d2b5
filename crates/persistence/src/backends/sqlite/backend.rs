//! SQLite backend: connection pool, configuration and blocking execution.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::model::SchemaRegistry;
use crate::tenant::TenantContext;
use crate::types::ListSpec;

use super::schema;
use super::transaction::with_transaction;

const BACKEND_NAME: &str = "sqlite";

/// SQLite backend for configuration resources.
///
/// Cloning is cheap; clones share the pool and the schema registry.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    registry: Arc<SchemaRegistry>,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("resource_types", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,

    /// Page size used when a list request gives no limit. 0 means unlimited.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound applied to every list request. 0 disables the bound.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    0
}

fn default_max_page_size() -> usize {
    10000
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl SqliteBackendConfig {
    /// Resolves the row limit for a list request.
    ///
    /// Returns `None` when the result is unbounded.
    pub fn effective_limit(&self, spec: &ListSpec) -> Option<usize> {
        let requested = spec.limit.unwrap_or(self.default_page_size);
        let limit = match (requested, self.max_page_size) {
            (0, 0) => 0,
            (0, max) => max,
            (requested, 0) => requested,
            (requested, max) => requested.min(max),
        };
        (limit > 0).then_some(limit)
    }
}

pub(crate) fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        message,
        source: None,
    })
}

impl SqliteBackend {
    /// Creates a private in-memory database.
    pub fn in_memory(registry: SchemaRegistry) -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default(), registry)
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P, registry: SchemaRegistry) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default(), registry)
    }

    /// Creates a backend with custom configuration.
    ///
    /// `":memory:"` opens a uniquely named shared-cache database so that every
    /// pooled connection sees the same store; it lives as long as the pool
    /// keeps one connection open.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
        registry: SchemaRegistry,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_string_lossy();
        if path == ":memory:" {
            let uri = format!(
                "file:cfgstore-{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4().simple()
            );
            return Self::build(&uri, true, config, registry);
        }
        Self::build(&path, false, config, registry)
    }

    fn build(
        path: &str,
        is_memory: bool,
        config: SqliteBackendConfig,
        registry: SchemaRegistry,
    ) -> StorageResult<Self> {
        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;

        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                if foreign_keys {
                    conn.execute_batch("PRAGMA foreign_keys = ON")?;
                }
                if wal {
                    conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
                        row.get::<_, String>(0)
                    })?;
                }
                Ok(())
            });

        let mut builder = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }
        let pool = builder.build(manager).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })?;

        tracing::info!(
            path = if is_memory { "<memory>" } else { path },
            max_connections = config.max_connections,
            "Opened SQLite backend"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
            registry: Arc::new(registry),
        })
    }

    /// Creates the metadata, resource and reference tables.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn, &self.registry)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Returns the schema registry.
    pub fn schema_registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Runs `f` on a pooled connection off the async executor.
    ///
    /// While `f` runs, cancelling the tenant's token interrupts the
    /// statement in flight. Events emitted by `f` carry the caller's project,
    /// correlation id and user.
    pub async fn run<T, F>(&self, tenant: &TenantContext, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &SchemaRegistry, &TenantContext) -> StorageResult<T>
            + Send
            + 'static,
    {
        let backend = self.clone();
        let tenant = tenant.clone();
        let span = tracing::debug_span!(
            "sqlite",
            tenant = %tenant.tenant_id(),
            correlation_id = tenant.correlation_id(),
            user = tenant.user_id(),
        );
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            tenant.cancellation().check()?;
            let mut conn = backend.get_connection()?;
            let interrupt = conn.get_interrupt_handle();
            let _guard = tenant.cancellation().on_cancel(move || interrupt.interrupt());
            f(&mut *conn, backend.schema_registry(), &tenant)
        })
        .await
        .map_err(|e| internal_error(format!("Blocking task failed: {}", e)))?
    }

    /// Runs `f` inside one transaction on a pooled connection.
    ///
    /// Commits if `f` succeeds; rolls back on error or cancellation.
    pub async fn transaction<T, F>(&self, tenant: &TenantContext, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Transaction<'_>, &SchemaRegistry, &TenantContext) -> StorageResult<T>
            + Send
            + 'static,
    {
        self.run(tenant, move |conn, registry, tenant| {
            with_transaction(conn, tenant, |tx| f(tx, registry, tenant))
        })
        .await
    }
}
