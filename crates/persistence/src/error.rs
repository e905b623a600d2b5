//! Error types for the persistence layer.
//!
//! All operations return [`StorageError`], which groups failures by category:
//! resource state (not found, conflicts), validation of caller input, tenant
//! permission checks, transaction lifecycle, and backend execution. The five
//! caller-facing error kinds (validation, not found, conflict, corruption and
//! storage) are exposed through the `is_*` classification helpers.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::tenant::TenantId;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Tenant permission errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns `true` for absent resources, including those hidden by the
    /// permission filter.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::Resource(ResourceError::NotFound { .. })
                | StorageError::Resource(ResourceError::ParentNotFound { .. })
        )
    }

    /// Returns `true` for malformed caller input.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }

    /// Returns `true` for duplicate identities and blocked deletes.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::Resource(ResourceError::AlreadyExists { .. })
                | StorageError::Resource(ResourceError::FqNameConflict { .. })
                | StorageError::Resource(ResourceError::HasDependents { .. })
        )
    }

    /// Returns `true` when stored data failed to decode.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Backend(BackendError::Corruption { .. }))
    }

    /// Returns `true` when the operation was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Transaction(TransactionError::Cancelled))
    }
}

/// Errors related to resource state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested resource was not found, or is not visible to the caller.
    #[error("resource not found: {resource_type}/{uuid}")]
    NotFound { resource_type: String, uuid: String },

    /// A parent fully-qualified name or uuid did not resolve.
    #[error("parent not found: {parent}")]
    ParentNotFound { parent: String },

    /// A resource with the given uuid already exists.
    #[error("resource already exists: {resource_type}/{uuid}")]
    AlreadyExists { resource_type: String, uuid: String },

    /// A resource with the same fully-qualified name already exists.
    #[error("fully-qualified name already in use for {resource_type}: {fq_name}")]
    FqNameConflict {
        resource_type: String,
        fq_name: String,
    },

    /// The resource still has children or inbound references.
    #[error("{resource_type}/{uuid} still has dependents: {dependents}")]
    HasDependents {
        resource_type: String,
        uuid: String,
        dependents: String,
    },
}

/// Errors related to caller input.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A filter names a field the resource type does not declare.
    #[error("invalid filter on {resource_type}: unknown field '{field}'")]
    InvalidFilter { resource_type: String, field: String },

    /// A filter value cannot be converted to the column's kind.
    #[error("invalid value '{value}' for filter field '{field}': {message}")]
    InvalidFilterValue {
        field: String,
        value: String,
        message: String,
    },

    /// A field name in a projection or update is not declared.
    #[error("unknown field '{field}' for {resource_type}")]
    UnknownField { resource_type: String, field: String },

    /// The resource type is not registered.
    #[error("unknown resource type: {resource_type}")]
    UnknownResourceType { resource_type: String },

    /// A reference names a target type the resource type does not declare.
    #[error("{resource_type} has no reference to {target_type}")]
    UnknownReference {
        resource_type: String,
        target_type: String,
    },

    /// A required field is missing.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    /// The parent type is not allowed for this resource type.
    #[error("{parent_type} is not a valid parent for {resource_type}")]
    InvalidParent {
        resource_type: String,
        parent_type: String,
    },

    /// A schema identifier is not a safe SQL identifier.
    #[error("invalid identifier '{identifier}': {message}")]
    InvalidIdentifier { identifier: String, message: String },

    /// A field value does not match the declared kind.
    #[error("invalid value for field '{field}': expected {expected}")]
    InvalidFieldValue { field: String, expected: String },
}

/// Errors related to tenant permissions.
#[derive(Error, Debug)]
pub enum TenantError {
    /// Operation not permitted for tenant.
    #[error("operation {operation} not permitted for tenant {tenant_id} on {resource_type}")]
    OperationNotPermitted {
        tenant_id: TenantId,
        operation: String,
        resource_type: String,
    },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },

    /// The transaction could not be started or committed.
    #[error("transaction failed: {message}")]
    Failed { message: String },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// A statement failed to execute.
    #[error("{operation} on {resource_type} ({identifier}) failed: {message}")]
    Statement {
        operation: String,
        resource_type: String,
        identifier: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored value could not be decoded.
    #[error("corrupt value in {table}.{column} for {uuid}: {message}")]
    Corruption {
        table: String,
        column: String,
        uuid: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization error while encoding a value for storage.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if is_interrupted(&err) {
            return StorageError::Transaction(TransactionError::Cancelled);
        }
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
        })
    }
}

/// Returns `true` if SQLite aborted the statement through an interrupt.
#[cfg(feature = "sqlite")]
pub(crate) fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::OperationInterrupted
    )
}
