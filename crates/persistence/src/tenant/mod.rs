//! Caller identity and privilege.
//!
//! Every storage operation takes a [`TenantContext`] describing who is asking:
//! the caller's project, optional domain and groups, and the
//! [`TenantPermissions`] deciding which operations are allowed and whether
//! the caller is privileged. Ownership and sharing predicates are derived
//! from this context by the permission filter.
//!
//! ```
//! use cfgstore_persistence::tenant::{Operation, TenantContext, TenantId, TenantPermissions};
//!
//! let ctx = TenantContext::new(TenantId::new("projA"), TenantPermissions::read_only());
//! assert!(ctx.check_permission(Operation::List, "virtual_network").is_ok());
//! assert!(ctx.check_permission(Operation::Delete, "virtual_network").is_err());
//! ```

mod context;
mod id;
mod permissions;

pub use context::TenantContext;
pub use id::TenantId;
pub use permissions::{Operation, TenantPermissions, TenantPermissionsBuilder};
