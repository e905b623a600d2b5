//! Tenant permission types.
//!
//! This module defines the operation-level permission model for callers and
//! the privileged (administrator) flag that disables ownership filtering.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operations that can be performed on resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create new resources.
    Create,
    /// Read a single resource.
    Read,
    /// Update existing resources.
    Update,
    /// Delete resources.
    Delete,
    /// List resources.
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::List => write!(f, "list"),
        }
    }
}

/// Permissions granted to a caller.
///
/// Operation and resource-type allow-lists gate what a caller may attempt at
/// all; the `admin` flag marks a privileged caller whose queries and mutations
/// are not restricted to owned or shared resources.
///
/// # Examples
///
/// ```
/// use cfgstore_persistence::tenant::{TenantPermissions, Operation};
///
/// let member = TenantPermissions::full_access();
/// assert!(member.can_perform(Operation::Delete, "virtual_network"));
/// assert!(!member.is_admin());
///
/// let reader = TenantPermissions::read_only();
/// assert!(reader.can_perform(Operation::List, "virtual_network"));
/// assert!(!reader.can_perform(Operation::Create, "virtual_network"));
///
/// assert!(TenantPermissions::admin().is_admin());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPermissions {
    /// Allowed operations. If None, all operations are allowed.
    allowed_operations: Option<HashSet<Operation>>,

    /// Allowed resource types. If None, all resource types are allowed.
    allowed_resource_types: Option<HashSet<String>>,

    /// Privileged callers bypass ownership and sharing predicates.
    admin: bool,
}

impl TenantPermissions {
    /// Creates ordinary (non-privileged) permissions for all operations.
    pub fn full_access() -> Self {
        Self {
            allowed_operations: None,
            allowed_resource_types: None,
            admin: false,
        }
    }

    /// Creates privileged permissions.
    pub fn admin() -> Self {
        Self {
            allowed_operations: None,
            allowed_resource_types: None,
            admin: true,
        }
    }

    /// Creates read-only permissions (read and list only).
    pub fn read_only() -> Self {
        let mut ops = HashSet::new();
        ops.insert(Operation::Read);
        ops.insert(Operation::List);

        Self {
            allowed_operations: Some(ops),
            allowed_resource_types: None,
            admin: false,
        }
    }

    /// Creates a builder for custom permissions.
    pub fn builder() -> TenantPermissionsBuilder {
        TenantPermissionsBuilder::new()
    }

    /// Returns `true` if the given operation is permitted on the given resource type.
    pub fn can_perform(&self, operation: Operation, resource_type: &str) -> bool {
        if let Some(ref allowed_ops) = self.allowed_operations {
            if !allowed_ops.contains(&operation) {
                return false;
            }
        }

        if let Some(ref allowed_types) = self.allowed_resource_types {
            if !allowed_types.contains(resource_type) {
                return false;
            }
        }

        true
    }

    /// Returns `true` for privileged callers.
    pub fn is_admin(&self) -> bool {
        self.admin
    }
}

impl Default for TenantPermissions {
    fn default() -> Self {
        Self::full_access()
    }
}

/// Builder for creating custom tenant permissions.
#[derive(Default)]
pub struct TenantPermissionsBuilder {
    allowed_operations: Option<HashSet<Operation>>,
    allowed_resource_types: Option<HashSet<String>>,
    admin: bool,
}

impl TenantPermissionsBuilder {
    /// Creates a new builder allowing everything, without privilege.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the allowed operations.
    pub fn allow_operations(mut self, operations: Vec<Operation>) -> Self {
        self.allowed_operations = Some(operations.into_iter().collect());
        self
    }

    /// Sets the allowed resource types.
    pub fn allow_resource_types(mut self, types: Vec<&str>) -> Self {
        self.allowed_resource_types = Some(types.into_iter().map(String::from).collect());
        self
    }

    /// Marks the caller as privileged.
    pub fn admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Builds the permissions.
    pub fn build(self) -> TenantPermissions {
        TenantPermissions {
            allowed_operations: self.allowed_operations,
            allowed_resource_types: self.allowed_resource_types,
            admin: self.admin,
        }
    }
}
