//! Error types shared by the store, the provisioning service, and the
//! reconciler.

use thiserror::Error;

/// Result type alias for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by `ObjectStore` and `StatusWriter` implementations.
///
/// A missing object is not an error: `get` returns `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict writing {key}: stored version {stored}, write based on {expected}")]
    Conflict {
        key: String,
        expected: u64,
        stored: u64,
    },

    #[error("object {0} does not exist")]
    Missing(String),

    #[error("mutation failed: {0:#}")]
    Mutate(#[source] anyhow::Error),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors returned by a `TenantProvisioner`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("tenant {path} rejected: {reason}")]
    Rejected { path: String, reason: String },

    #[error("provisioning service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raised when a database spec does not populate exactly one resource
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceConfigError {
    #[error(
        "incorrect database resources configuration, must be one of: \
         resources, sharedResources, serverlessResources"
    )]
    Missing,

    #[error(
        "incorrect database resources configuration, only one of resources, \
         sharedResources, serverlessResources may be set (found: {})",
        .0.join(", ")
    )]
    Ambiguous(Vec<&'static str>),
}

/// Raised when an owner reference cannot be attached to a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    #[error("cross-namespace owner references are not allowed: owner in {owner}, object in {object}")]
    CrossNamespace { owner: String, object: String },

    #[error("object is already controlled by {kind} {name}")]
    AlreadyControlled { kind: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutate_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("replicas must be positive").context("building Workload");
        let err = StoreError::Mutate(inner);
        let msg = err.to_string();
        assert!(msg.contains("building Workload"));
        assert!(msg.contains("replicas must be positive"));
    }

    #[test]
    fn ambiguous_lists_populated_fields() {
        let err = ResourceConfigError::Ambiguous(vec!["resources", "sharedResources"]);
        assert!(err.to_string().contains("found: resources, sharedResources"));
    }

    #[test]
    fn conflict_is_detected() {
        let err = StoreError::Conflict {
            key: "Database/default/db".to_string(),
            expected: 3,
            stored: 4,
        };
        assert!(err.is_conflict());
        assert!(!StoreError::Backend("io".to_string()).is_conflict());
    }
}
