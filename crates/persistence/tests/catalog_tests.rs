//! End-to-end tests against the built-in catalog.

use serde_json::json;

use cfgstore_persistence::backends::sqlite::SqliteBackend;
use cfgstore_persistence::core::ResourceStorage;
use cfgstore_persistence::model::catalog;
use cfgstore_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
use cfgstore_persistence::types::{
    ACCESS_READ, FieldValue, ListSpec, PermissionDescriptor, Reference, Resource,
};

fn create_backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory(catalog::registry().expect("catalog is valid"))
        .expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

async fn bootstrap(backend: &SqliteBackend) {
    let admin = TenantContext::admin(TenantId::new("cloud-admin"));
    backend
        .create(
            &admin,
            Resource::new("config_root")
                .with_uuid("root")
                .with_display_name("config-root"),
        )
        .await
        .unwrap();
    backend
        .create(
            &admin,
            Resource::new("domain")
                .with_display_name("default-domain")
                .with_perms(PermissionDescriptor::default().with_global_access(ACCESS_READ)),
        )
        .await
        .unwrap();
    backend
        .create(
            &admin,
            Resource::new("project")
                .with_uuid("proj-a")
                .with_fq_name(["default-domain", "projA"])
                .with_perms(PermissionDescriptor::owned_by("projA")),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_virtual_network_with_ipam_attributes() {
    let backend = create_backend();
    bootstrap(&backend).await;
    let tenant = TenantContext::new(TenantId::new("projA"), TenantPermissions::full_access());

    backend
        .create(
            &tenant,
            Resource::new("network_ipam")
                .with_uuid("ipam1")
                .with_display_name("default-ipam")
                .with_parent("project", "proj-a")
                .with_field("ipam_subnet_method", "user-defined-subnet"),
        )
        .await
        .unwrap();

    let subnets = json!([{"subnet": {"ip_prefix": "10.0.0.0", "ip_prefix_len": 24}}]);
    let vn = backend
        .create(
            &tenant,
            Resource::new("virtual_network")
                .with_uuid("vn1")
                .with_display_name("blue")
                .with_parent("project", "proj-a")
                .with_field("mtu", 1450i64)
                .with_field("route_target_list", json!({"route_target": ["target:64512:100"]}))
                .with_reference(
                    "network_ipam",
                    Reference::new("ipam1").with_attr("ipam_subnets", subnets.clone()),
                ),
        )
        .await
        .unwrap();

    assert_eq!(vn.fq_name, vec!["default-domain", "projA", "blue"]);
    let ipam_refs = vn.references_to("network_ipam");
    assert_eq!(ipam_refs.len(), 1);
    assert_eq!(
        ipam_refs[0].attrs.get("ipam_subnets"),
        Some(&FieldValue::Json(subnets))
    );

    let ipam = backend.get(&tenant, "network_ipam", "ipam1").await.unwrap();
    let referrers = ipam.back_refs_from("virtual_network");
    assert_eq!(referrers.len(), 1);
    assert_eq!(referrers[0].field("mtu"), Some(&FieldValue::Integer(1450)));

    let listed = backend
        .list(
            &tenant,
            "virtual_network",
            &ListSpec::new().with_parent_fq_name(["default-domain", "projA"]),
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_project_scoped_type_defaults_to_callers_project() {
    let backend = create_backend();
    bootstrap(&backend).await;
    let tenant = TenantContext::new(TenantId::new("projA"), TenantPermissions::full_access())
        .with_domain(TenantId::new("default-domain"));

    let vn = backend
        .create(&tenant, Resource::new("virtual_network").with_display_name("red"))
        .await
        .unwrap();
    assert_eq!(vn.parent_uuid.as_deref(), Some("proj-a"));
    assert_eq!(vn.parent_type.as_deref(), Some("project"));
    assert_eq!(vn.fq_name, vec!["default-domain", "projA", "red"]);

    let no_domain = TenantContext::new(TenantId::new("projA"), TenantPermissions::full_access());
    let err = backend
        .create(&no_domain, Resource::new("virtual_network").with_display_name("green"))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let stranger = TenantContext::new(TenantId::new("projB"), TenantPermissions::full_access())
        .with_domain(TenantId::new("default-domain"));
    let err = backend
        .create(&stranger, Resource::new("virtual_network").with_display_name("blue"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_required_field_enforced() {
    let backend = create_backend();
    bootstrap(&backend).await;
    let admin = TenantContext::admin(TenantId::new("cloud-admin"));

    let err = backend
        .create(
            &admin,
            Resource::new("global_system_config")
                .with_display_name("default-global-system-config")
                .with_parent("config_root", "root"),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let created = backend
        .create(
            &admin,
            Resource::new("global_system_config")
                .with_display_name("default-global-system-config")
                .with_parent("config_root", "root")
                .with_field("autonomous_system", 64512i64),
        )
        .await
        .unwrap();
    assert_eq!(
        created.field("autonomous_system"),
        Some(&FieldValue::Integer(64512))
    );
}

#[tokio::test]
async fn test_alarm_accepts_either_parent_type() {
    let backend = create_backend();
    bootstrap(&backend).await;
    let admin = TenantContext::admin(TenantId::new("cloud-admin"));

    backend
        .create(
            &admin,
            Resource::new("alarm")
                .with_display_name("disk-usage")
                .with_parent("project", "proj-a")
                .with_field("alarm_severity", 1i64),
        )
        .await
        .unwrap();

    let err = backend
        .create(
            &admin,
            Resource::new("alarm")
                .with_display_name("misplaced")
                .with_parent("config_root", "root"),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let count = backend
        .count(&admin, "alarm", &ListSpec::new().with_parent_type("project"))
        .await
        .unwrap();
    assert_eq!(count, 1);
}
