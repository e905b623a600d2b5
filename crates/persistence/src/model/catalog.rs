//! Built-in network and routing resource types.
//!
//! Two trees: tenant objects live under `domain`, so a project's fq_name is
//! `[domain, project]`; system-wide objects live under `config_root`.
//!
//! ```text
//! domain                                  config_root
//! └── project                             └── global_system_config ──ref──▶ bgp_router
//!     ├── network_ipam                        └── alarm
//!     ├── virtual_network ──ref──▶ network_ipam
//!     ├── virtual_machine_interface ──ref──▶ virtual_network
//!     ├── bgp_router
//!     └── alarm
//! ```

use crate::error::ValidationError;
use crate::types::FieldKind;

use super::registry::SchemaRegistry;
use super::schema::{FieldDef, ResourceSchema};

/// Type name of a project.
///
/// Project-scoped types created without parent information default to the
/// caller's own project.
pub const PROJECT: &str = "project";

/// Returns the built-in schemas.
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        ResourceSchema::builder("config_root").build(),
        ResourceSchema::builder("domain")
            .field("domain_limits", FieldKind::Json)
            .build(),
        ResourceSchema::builder(PROJECT)
            .parent("domain")
            .field("description", FieldKind::String)
            .field("quota", FieldKind::Json)
            .field("vxlan_routing", FieldKind::Boolean)
            .build(),
        ResourceSchema::builder("global_system_config")
            .parent("config_root")
            .required_field("autonomous_system", FieldKind::Integer)
            .field("ibgp_auto_mesh", FieldKind::Boolean)
            .field("config_version", FieldKind::String)
            .field("mac_aging_time", FieldKind::Integer)
            .field("graceful_restart_parameters", FieldKind::Json)
            .reference("bgp_router")
            .build(),
        ResourceSchema::builder("bgp_router")
            .parent(PROJECT)
            .field("address", FieldKind::String)
            .field("autonomous_system", FieldKind::Integer)
            .field("vendor", FieldKind::String)
            .field("hold_time", FieldKind::Integer)
            .field("bgp_router_parameters", FieldKind::Json)
            .build(),
        ResourceSchema::builder("alarm")
            .parent("global_system_config")
            .parent(PROJECT)
            .field("uve_keys", FieldKind::Json)
            .field("alarm_severity", FieldKind::Integer)
            .field("alarm_rules", FieldKind::Json)
            .build(),
        ResourceSchema::builder("network_ipam")
            .parent(PROJECT)
            .field("ipam_subnet_method", FieldKind::String)
            .field("dns_method", FieldKind::String)
            .build(),
        ResourceSchema::builder("virtual_network")
            .parent(PROJECT)
            .field("virtual_network_network_id", FieldKind::Integer)
            .field("is_shared", FieldKind::Boolean)
            .field("mtu", FieldKind::Integer)
            .field("route_target_list", FieldKind::Json)
            .reference_with_attrs(
                "network_ipam",
                vec![
                    FieldDef::new("ipam_subnets", FieldKind::Json),
                    FieldDef::new("host_routes", FieldKind::Json),
                ],
            )
            .build(),
        ResourceSchema::builder("virtual_machine_interface")
            .parent(PROJECT)
            .field("mac_addresses", FieldKind::Json)
            .field("port_security_enabled", FieldKind::Boolean)
            .field("device_owner", FieldKind::String)
            .reference("virtual_network")
            .build(),
    ]
}

/// Builds a registry of the built-in schemas.
pub fn registry() -> Result<SchemaRegistry, ValidationError> {
    SchemaRegistry::new(schemas())
}
