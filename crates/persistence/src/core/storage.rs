//! Core resource storage trait.
//!
//! This module defines the [`ResourceStorage`] trait, the operations every
//! backend offers over the resource forest. All operations take a
//! [`TenantContext`]; visibility and mutation rights are derived from it.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::model::SchemaRegistry;
use crate::tenant::TenantContext;
use crate::types::{ListSpec, Resource, ResourceUpdate};

/// Storage of typed resources with parent, reference and back-reference
/// relations.
///
/// # Visibility
///
/// Non-privileged callers only see resources they own, that grant their
/// group or everyone read access, or that are shared with their project.
/// Update and delete require the corresponding write grant. A resource the
/// caller may not touch is reported as not found, exactly like one that
/// does not exist.
///
/// # Example
///
/// ```ignore
/// use cfgstore_persistence::core::ResourceStorage;
/// use cfgstore_persistence::error::StorageError;
/// use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
/// use cfgstore_persistence::types::{ListSpec, Resource};
///
/// async fn example<S: ResourceStorage>(storage: &S) -> Result<(), StorageError> {
///     let caller = TenantContext::new(TenantId::new("projA"), TenantPermissions::full_access());
///
///     let widget = Resource::new("widget").with_uuid("w1").with_display_name("w1");
///     storage.create(&caller, widget).await?;
///
///     let all = storage.list(&caller, "widget", &ListSpec::new()).await?;
///     assert_eq!(all.len(), 1);
///
///     storage.delete(&caller, "widget", "w1").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Returns the schemas this storage serves.
    fn registry(&self) -> &SchemaRegistry;

    /// Creates a resource and returns it as stored.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation` - unknown type, field, reference or parent type
    /// * `StorageError::Resource(ParentNotFound)` - the parent does not resolve
    /// * `StorageError::Resource(AlreadyExists | FqNameConflict)` - duplicate identity
    /// * `StorageError::Tenant` - the caller may not create this type
    async fn create(&self, tenant: &TenantContext, resource: Resource) -> StorageResult<Resource>;

    /// Reads one resource with references and back-references.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - absent or not visible to the caller
    async fn get(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
    ) -> StorageResult<Resource>;

    /// Lists resources matching `spec`, ordered by uuid.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation` - a filter names an undeclared column
    /// * `StorageError::Resource(ParentNotFound)` - `parent_fq_name` does not resolve
    async fn list(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        spec: &ListSpec,
    ) -> StorageResult<Vec<Resource>>;

    /// Counts resources matching `spec`, ignoring pagination.
    async fn count(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        spec: &ListSpec,
    ) -> StorageResult<u64>;

    /// Applies a partial update and returns the updated resource.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - absent or not writable by the caller
    /// * `StorageError::Validation` - the update names an undeclared field or reference
    async fn update(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
        update: ResourceUpdate,
    ) -> StorageResult<Resource>;

    /// Deletes a resource with its outbound references and metadata entry.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - absent or not writable by the caller
    /// * `StorageError::Resource(HasDependents)` - children or referrers remain
    async fn delete(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
    ) -> StorageResult<()>;

    /// Checks whether a resource exists and is visible to the caller.
    async fn exists(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
    ) -> StorageResult<bool> {
        match self.get(tenant, resource_type, uuid).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
