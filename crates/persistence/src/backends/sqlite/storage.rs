//! ResourceStorage implementation for SQLite.
//!
//! Reads run as single statements on a pooled connection; mutations run
//! inside one transaction each.

use async_trait::async_trait;
use tracing::instrument;

use crate::core::ResourceStorage;
use crate::error::StorageResult;
use crate::model::SchemaRegistry;
use crate::tenant::TenantContext;
use crate::types::{ListSpec, Resource, ResourceUpdate};

use super::SqliteBackend;
use super::engine;

#[async_trait]
impl ResourceStorage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn registry(&self) -> &SchemaRegistry {
        self.schema_registry()
    }

    #[instrument(skip_all, fields(resource_type = %resource.resource_type))]
    async fn create(&self, tenant: &TenantContext, resource: Resource) -> StorageResult<Resource> {
        self.transaction(tenant, move |tx, registry, tenant| {
            engine::create_resource(tx, registry, tenant, resource)
        })
        .await
    }

    #[instrument(skip_all, fields(resource_type = %resource_type, uuid = %uuid))]
    async fn get(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
    ) -> StorageResult<Resource> {
        let resource_type = resource_type.to_string();
        let uuid = uuid.to_string();
        self.run(tenant, move |conn, registry, tenant| {
            engine::get_resource(conn, registry, tenant, &resource_type, &uuid)
        })
        .await
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn list(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        spec: &ListSpec,
    ) -> StorageResult<Vec<Resource>> {
        let resource_type = resource_type.to_string();
        let limit = self.config().effective_limit(spec);
        let spec = spec.clone();
        self.run(tenant, move |conn, registry, tenant| {
            engine::list_resources(conn, registry, tenant, &resource_type, &spec, limit)
        })
        .await
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn count(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        spec: &ListSpec,
    ) -> StorageResult<u64> {
        let resource_type = resource_type.to_string();
        let spec = spec.clone();
        self.run(tenant, move |conn, registry, tenant| {
            engine::count_resources(conn, registry, tenant, &resource_type, &spec)
        })
        .await
    }

    #[instrument(skip_all, fields(resource_type = %resource_type, uuid = %uuid))]
    async fn update(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
        update: ResourceUpdate,
    ) -> StorageResult<Resource> {
        let resource_type = resource_type.to_string();
        let uuid = uuid.to_string();
        self.transaction(tenant, move |tx, registry, tenant| {
            engine::update_resource(tx, registry, tenant, &resource_type, &uuid, update)
        })
        .await
    }

    #[instrument(skip_all, fields(resource_type = %resource_type, uuid = %uuid))]
    async fn delete(
        &self,
        tenant: &TenantContext,
        resource_type: &str,
        uuid: &str,
    ) -> StorageResult<()> {
        let resource_type = resource_type.to_string();
        let uuid = uuid.to_string();
        self.transaction(tenant, move |tx, registry, tenant| {
            engine::delete_resource(tx, registry, tenant, &resource_type, &uuid)
        })
        .await
    }
}
