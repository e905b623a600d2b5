//! Shared fixtures for the SQLite integration tests.
//!
//! The test schema is a small resource forest:
//!
//! ```text
//! config_root            widget (root-level)
//!   └── network
//!         ├── subnet
//!         └── port ──ref──> subnet (attr: priority)
//!                  ──ref──> network
//! ```

#![allow(dead_code)]

use cfgstore_persistence::backends::sqlite::SqliteBackend;
use cfgstore_persistence::core::ResourceStorage;
use cfgstore_persistence::error::StorageError;
use cfgstore_persistence::model::{FieldDef, ResourceSchema, SchemaRegistry};
use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
use cfgstore_persistence::types::{ACCESS_READ, FieldKind, PermissionDescriptor, Resource};

pub const ROOT_UUID: &str = "config-root";
pub const NET_UUID: &str = "net1";

pub fn test_registry() -> SchemaRegistry {
    SchemaRegistry::new(vec![
        ResourceSchema::builder("config_root").build(),
        ResourceSchema::builder("network")
            .parent("config_root")
            .field("mtu", FieldKind::Integer)
            .field("description", FieldKind::String)
            .field("route_targets", FieldKind::Json)
            .build(),
        ResourceSchema::builder("subnet")
            .parent("network")
            .field("cidr", FieldKind::String)
            .field("enabled", FieldKind::Boolean)
            .field("allocation", FieldKind::Json)
            .build(),
        ResourceSchema::builder("port")
            .parent("network")
            .field("mac_address", FieldKind::String)
            .reference_with_attrs("subnet", vec![FieldDef::new("priority", FieldKind::Integer)])
            .reference("network")
            .build(),
        ResourceSchema::builder("widget")
            .field("size", FieldKind::Integer)
            .build(),
    ])
    .expect("test registry is valid")
}

pub fn create_backend() -> SqliteBackend {
    let backend =
        SqliteBackend::in_memory(test_registry()).expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

pub fn create_tenant(id: &str) -> TenantContext {
    TenantContext::new(TenantId::new(id), TenantPermissions::full_access())
}

pub fn admin_tenant() -> TenantContext {
    TenantContext::admin(TenantId::new("cloud-admin"))
}

/// Creates `config-root` (fq_name `["root"]`, readable by everyone) and `net1`
/// under it, owned by `owner`.
pub async fn seed_network(backend: &SqliteBackend, owner: &TenantContext) -> Resource {
    backend
        .create(
            &admin_tenant(),
            Resource::new("config_root")
                .with_uuid(ROOT_UUID)
                .with_display_name("root")
                .with_perms(PermissionDescriptor::default().with_global_access(ACCESS_READ)),
        )
        .await
        .expect("create config_root");

    backend
        .create(
            owner,
            Resource::new("network")
                .with_uuid(NET_UUID)
                .with_fq_name(["root", "net1"])
                .with_field("mtu", 1500i64),
        )
        .await
        .expect("create net1")
}

pub fn subnet(uuid: &str, cidr: &str) -> Resource {
    Resource::new("subnet")
        .with_uuid(uuid)
        .with_display_name(uuid)
        .with_parent("network", NET_UUID)
        .with_field("cidr", cidr)
        .with_field("enabled", true)
}

pub fn port(uuid: &str) -> Resource {
    Resource::new("port")
        .with_uuid(uuid)
        .with_display_name(uuid)
        .with_parent("network", NET_UUID)
}

pub fn uuids(resources: &[Resource]) -> Vec<&str> {
    resources.iter().map(|r| r.uuid.as_str()).collect()
}

pub fn assert_not_found(result: Result<impl std::fmt::Debug, StorageError>) {
    match result {
        Err(err) => assert!(err.is_not_found(), "expected not found, got {:?}", err),
        Ok(value) => panic!("expected not found, got {:?}", value),
    }
}

pub fn assert_validation(result: Result<impl std::fmt::Debug, StorageError>) {
    match result {
        Err(err) => assert!(err.is_validation(), "expected validation error, got {:?}", err),
        Ok(value) => panic!("expected validation error, got {:?}", value),
    }
}

pub fn assert_conflict(result: Result<impl std::fmt::Debug, StorageError>) {
    match result {
        Err(err) => assert!(err.is_conflict(), "expected conflict, got {:?}", err),
        Ok(value) => panic!("expected conflict, got {:?}", value),
    }
}
