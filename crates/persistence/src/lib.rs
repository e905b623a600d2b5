//! Configuration Store Persistence Layer
//!
//! This crate stores the typed configuration objects of a multi-tenant
//! network configuration service in a relational database. Resources form a
//! forest through parent links, point at each other through typed
//! references that may carry attributes, and are read back with their
//! references, children and inbound references in a single statement.
//!
//! # Features
//!
//! - **Schema-driven tables**: one table per resource type, one join table per
//!   reference edge, derived from a [`SchemaRegistry`](model::SchemaRegistry)
//! - **Single-statement reads**: references and back-references are embedded as
//!   JSON aggregation sub-selects and decoded by a row reconstructor
//! - **Ownership and sharing**: owner, group, global and per-project share grants
//!   compiled into every read and write predicate; a parent the caller cannot
//!   read is reported as missing
//! - **Metadata index**: uuid and fully-qualified-name lookup of any resource
//! - **Cancellation**: a token on the caller context aborts in-flight statements
//!
//! # Architecture
//!
//! - [`tenant`] - Caller identity and operation-level permissions
//! - [`types`] - Resources, field values, list specifications and updates
//! - [`model`] - Resource schemas, the schema registry and a built-in catalog
//! - [`error`] - Error types for all operations
//! - [`core`] - The storage trait and cancellation tokens
//! - [`backends`] - Backend implementations (SQLite)
//!
//! # Quick Start
//!
//! ```no_run
//! use cfgstore_persistence::backends::sqlite::SqliteBackend;
//! use cfgstore_persistence::core::ResourceStorage;
//! use cfgstore_persistence::model::catalog;
//! use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
//! use cfgstore_persistence::types::{ListSpec, Resource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory(catalog::registry()?)?;
//! backend.init_schema()?;
//!
//! let admin = TenantContext::admin(TenantId::new("cloud-admin"));
//! backend
//!     .create(&admin, Resource::new("config_root").with_display_name("config-root"))
//!     .await?;
//!
//! let caller = TenantContext::new(TenantId::new("projA"), TenantPermissions::full_access());
//! let visible = backend.list(&caller, "config_root", &ListSpec::new()).await?;
//! assert!(visible.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! # Permissions
//!
//! Every storage operation takes a [`TenantContext`](tenant::TenantContext).
//!
//! ```
//! use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions, Operation};
//!
//! let member = TenantContext::new(
//!     TenantId::new("projA"),
//!     TenantPermissions::full_access(),
//! );
//! let reader = TenantContext::new(
//!     TenantId::new("projA"),
//!     TenantPermissions::read_only(),
//! );
//!
//! assert!(member.check_permission(Operation::Create, "virtual_network").is_ok());
//! assert!(reader.check_permission(Operation::Create, "virtual_network").is_err());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod model;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use model::{ResourceSchema, SchemaRegistry};
pub use tenant::{TenantContext, TenantId, TenantPermissions};
pub use types::{FieldValue, ListSpec, Resource, ResourceUpdate};

pub use core::{Cancellation, ResourceStorage};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
