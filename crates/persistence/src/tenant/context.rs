//! Caller context for storage operations.
//!
//! This module defines [`TenantContext`], the identity of the caller on whose
//! behalf an operation runs. Every storage operation takes one explicitly;
//! there is no process-wide authentication state.

use std::sync::Arc;

use super::id::TenantId;
use super::permissions::{Operation, TenantPermissions};
use crate::core::Cancellation;
use crate::error::TenantError;

/// The identity and privilege of the caller.
///
/// The project (`tenant_id`) is the value matched against a resource's owner
/// and share entries; `groups` are matched against its group grant. The
/// permissions decide which operations may be attempted and whether the
/// caller is privileged.
///
/// ```
/// use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
///
/// let ctx = TenantContext::new(TenantId::new("projA"), TenantPermissions::full_access())
///     .with_domain(TenantId::new("default-domain"))
///     .with_group("netops");
///
/// assert_eq!(ctx.tenant_id().as_str(), "projA");
/// assert!(!ctx.is_admin());
/// assert!(TenantContext::admin(TenantId::new("cloud-admin")).is_admin());
/// ```
#[derive(Debug, Clone)]
pub struct TenantContext {
    tenant_id: TenantId,
    /// Domain of the project; with the project it names the default parent
    /// of project-scoped resources.
    domain_id: Option<TenantId>,
    groups: Vec<String>,
    permissions: Arc<TenantPermissions>,
    /// Optional correlation ID, attached to every log event of an operation.
    correlation_id: Option<String>,
    /// Optional user ID, stored as the creator of new resources.
    user_id: Option<String>,
    cancellation: Cancellation,
}

impl TenantContext {
    /// Creates a new context for the given project and permissions.
    pub fn new(tenant_id: TenantId, permissions: TenantPermissions) -> Self {
        Self {
            tenant_id,
            domain_id: None,
            groups: Vec::new(),
            permissions: Arc::new(permissions),
            correlation_id: None,
            user_id: None,
            cancellation: Cancellation::new(),
        }
    }

    /// Creates a privileged context.
    pub fn admin(tenant_id: TenantId) -> Self {
        Self::new(tenant_id, TenantPermissions::admin())
    }

    /// Sets the caller's domain.
    pub fn with_domain(mut self, domain_id: TenantId) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    /// Adds a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Creates a context with the specified correlation ID for tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Creates a context with the specified user ID for auditing.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attaches a cancellation token observed by every operation run with
    /// this context.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns the caller's project.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the caller's domain, if known.
    pub fn domain_id(&self) -> Option<&TenantId> {
        self.domain_id.as_ref()
    }

    /// Returns the caller's group memberships.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Returns the permissions for this context.
    pub fn permissions(&self) -> &TenantPermissions {
        &self.permissions
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user ID, if set.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the cancellation token.
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Returns `true` for privileged callers.
    pub fn is_admin(&self) -> bool {
        self.permissions.is_admin()
    }

    /// Checks if the given operation is permitted on the given resource type.
    pub fn check_permission(
        &self,
        operation: Operation,
        resource_type: &str,
    ) -> Result<(), TenantError> {
        if self.permissions.can_perform(operation, resource_type) {
            Ok(())
        } else {
            Err(TenantError::OperationNotPermitted {
                tenant_id: self.tenant_id.clone(),
                operation: operation.to_string(),
                resource_type: resource_type.to_string(),
            })
        }
    }
}
