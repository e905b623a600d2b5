//! Resource, reference and permission descriptor types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::{TenantContext, TenantId};

use super::value::FieldValue;

/// Execute permission bit.
pub const ACCESS_EXECUTE: u8 = 1;
/// Write permission bit, required by update and delete.
pub const ACCESS_WRITE: u8 = 2;
/// Read permission bit, required by list and get.
pub const ACCESS_READ: u8 = 4;
/// All permission bits.
pub const ACCESS_ALL: u8 = ACCESS_READ | ACCESS_WRITE | ACCESS_EXECUTE;

/// A grant of access to a single project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEntry {
    /// The project the resource is shared with.
    pub tenant: TenantId,
    /// Access bits granted to that project.
    pub tenant_access: u8,
}

impl ShareEntry {
    /// Creates a share entry.
    pub fn new(tenant: impl Into<TenantId>, tenant_access: u8) -> Self {
        Self {
            tenant: tenant.into(),
            tenant_access,
        }
    }
}

/// Ownership and sharing descriptor of a resource.
///
/// A caller's effective access is the bitwise OR of every grant that
/// applies to it: the owner bits if it is the owning project, the group
/// bits if it belongs to the resource's group, the global bits, and the
/// bits of any share entry naming its project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDescriptor {
    /// The owning project.
    pub owner: TenantId,
    /// Access bits for the owner.
    pub owner_access: u8,
    /// Group that receives `group_access`.
    pub group: Option<String>,
    /// Access bits for members of `group`.
    pub group_access: u8,
    /// Access bits for every caller.
    pub global_access: u8,
    /// Per-project grants.
    pub share: Vec<ShareEntry>,
}

impl Default for PermissionDescriptor {
    fn default() -> Self {
        Self {
            owner: TenantId::new(""),
            owner_access: ACCESS_ALL,
            group: None,
            group_access: 0,
            global_access: 0,
            share: Vec::new(),
        }
    }
}

impl PermissionDescriptor {
    /// Creates a descriptor owned by `owner` with full owner access.
    pub fn owned_by(owner: impl Into<TenantId>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Sets the global access bits.
    pub fn with_global_access(mut self, bits: u8) -> Self {
        self.global_access = bits;
        self
    }

    /// Sets the group and its access bits.
    pub fn with_group(mut self, group: impl Into<String>, bits: u8) -> Self {
        self.group = Some(group.into());
        self.group_access = bits;
        self
    }

    /// Adds a share entry.
    pub fn with_share(mut self, tenant: impl Into<TenantId>, bits: u8) -> Self {
        self.share.push(ShareEntry::new(tenant, bits));
        self
    }

    /// Computes the access bits `caller` holds on this resource.
    pub fn access_for(&self, caller: &TenantContext) -> u8 {
        if caller.is_admin() {
            return ACCESS_ALL;
        }
        let mut bits = self.global_access;
        if &self.owner == caller.tenant_id() {
            bits |= self.owner_access;
        }
        if let Some(group) = &self.group {
            if caller.groups().iter().any(|g| g == group) {
                bits |= self.group_access;
            }
        }
        for entry in &self.share {
            if &entry.tenant == caller.tenant_id() {
                bits |= entry.tenant_access;
            }
        }
        bits & ACCESS_ALL
    }

    /// Returns `true` if `caller` holds every bit in `required`.
    pub fn allows(&self, caller: &TenantContext, required: u8) -> bool {
        self.access_for(caller) & required == required
    }
}

/// An outbound reference stub: target identity plus edge attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    /// Uuid of the referenced resource.
    pub uuid: String,
    /// Edge attributes declared on the reference.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, FieldValue>,
}

impl Reference {
    /// Creates a reference to `uuid` with no attributes.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Adds an edge attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }
}

/// A typed node in the configuration forest.
///
/// Read paths fill `references` with identity stubs and `children` /
/// `back_refs` with fully decoded one-level-deep resources. Nested
/// resources never carry their own references or back-references.
///
/// # Examples
///
/// ```
/// use cfgstore_persistence::types::{FieldValue, Reference, Resource};
///
/// let vn = Resource::new("virtual_network")
///     .with_uuid("net1")
///     .with_fq_name(["default-domain", "admin", "net1"])
///     .with_field("mtu", 9000i64)
///     .with_reference("network_ipam", Reference::new("ipam1"));
///
/// assert_eq!(vn.fq_name_string(), "default-domain:admin:net1");
/// assert_eq!(vn.field("mtu"), Some(&FieldValue::Integer(9000)));
/// assert_eq!(vn.references_to("network_ipam").len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// Registered type name.
    pub resource_type: String,
    /// Globally unique identifier.
    pub uuid: String,
    /// Fully-qualified name segments.
    pub fq_name: Vec<String>,
    /// Human readable name.
    pub display_name: String,
    /// Uuid of the parent, `None` for root-level resources.
    pub parent_uuid: Option<String>,
    /// Type of the parent.
    pub parent_type: Option<String>,
    /// Ownership and sharing.
    pub perms: PermissionDescriptor,
    /// Creation time, set by the store.
    pub created: Option<DateTime<Utc>>,
    /// Last modification time, set by the store.
    pub last_modified: Option<DateTime<Utc>>,
    /// User that created the resource, set by the store from the caller.
    pub creator: Option<String>,
    /// Type-specific fields.
    pub fields: BTreeMap<String, FieldValue>,
    /// Outbound references keyed by target type.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Vec<Reference>>,
    /// Child resources keyed by child type.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Vec<Resource>>,
    /// Referring resources keyed by referring type.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub back_refs: BTreeMap<String, Vec<Resource>>,
}

impl Resource {
    /// Creates an empty resource of the given type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            uuid: String::new(),
            fq_name: Vec::new(),
            display_name: String::new(),
            parent_uuid: None,
            parent_type: None,
            perms: PermissionDescriptor::default(),
            created: None,
            last_modified: None,
            creator: None,
            fields: BTreeMap::new(),
            references: BTreeMap::new(),
            children: BTreeMap::new(),
            back_refs: BTreeMap::new(),
        }
    }

    /// Sets the uuid.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Sets the fully-qualified name.
    pub fn with_fq_name<I, S>(mut self, fq_name: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fq_name = fq_name.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Sets the parent.
    pub fn with_parent(mut self, parent_type: impl Into<String>, uuid: impl Into<String>) -> Self {
        self.parent_type = Some(parent_type.into());
        self.parent_uuid = Some(uuid.into());
        self
    }

    /// Sets the permission descriptor.
    pub fn with_perms(mut self, perms: PermissionDescriptor) -> Self {
        self.perms = perms;
        self
    }

    /// Sets a type-specific field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds an outbound reference to a resource of `target_type`.
    pub fn with_reference(mut self, target_type: impl Into<String>, reference: Reference) -> Self {
        self.references
            .entry(target_type.into())
            .or_default()
            .push(reference);
        self
    }

    /// Returns a type-specific field.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns the references to `target_type`.
    pub fn references_to(&self, target_type: &str) -> &[Reference] {
        self.references
            .get(target_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the children of type `child_type`.
    pub fn children_of(&self, child_type: &str) -> &[Resource] {
        self.children
            .get(child_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the resources of `source_type` that reference this one.
    pub fn back_refs_from(&self, source_type: &str) -> &[Resource] {
        self.back_refs
            .get(source_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the fully-qualified name joined with `:`.
    pub fn fq_name_string(&self) -> String {
        self.fq_name.join(":")
    }
}
