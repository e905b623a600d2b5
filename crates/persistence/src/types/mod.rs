//! Core types for the persistence layer.
//!
//! - [`Resource`], [`Reference`] - resource graphs as returned by reads
//! - [`PermissionDescriptor`], [`ShareEntry`] - ownership and sharing
//! - [`FieldKind`], [`FieldValue`] - typed scalar and structured values
//! - [`ListSpec`] - filters and pagination for list queries
//! - [`ResourceUpdate`] - partial updates

mod list_spec;
mod resource;
mod update;
mod value;

pub use list_spec::ListSpec;
pub use resource::{
    ACCESS_ALL, ACCESS_EXECUTE, ACCESS_READ, ACCESS_WRITE, PermissionDescriptor, Reference,
    Resource, ShareEntry,
};
pub use update::ResourceUpdate;
pub use value::{DecodeError, FieldKind, FieldValue, format_timestamp};
