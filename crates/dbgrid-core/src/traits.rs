//! Collaborator contracts consumed by the reconciler.
//!
//! The reconciler never names a concrete backend; it talks to these traits
//! through `Arc<dyn ...>` handles. `dbgrid-state` provides a redb-backed
//! implementation of all four.

use std::fmt;

use async_trait::async_trait;

use crate::error::{ProvisionError, StoreResult};
use crate::object::{DynamicObject, ObjectKey, Resource};
use crate::types::{EventType, TenantRequest};

/// Mutation applied to an object during `create_or_update`.
pub type MutateFn<'a> = &'a (dyn Fn(&mut DynamicObject) -> anyhow::Result<()> + Send + Sync);

/// Outcome of a `create_or_update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    /// Whether the stored object was written.
    pub fn changed(self) -> bool {
        !matches!(self, OperationResult::Unchanged)
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Created => write!(f, "created"),
            OperationResult::Updated => write!(f, "updated"),
            OperationResult::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Read and upsert access to stored objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist.
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<Option<DynamicObject>>;

    /// Create `placeholder` or update the stored object at its key.
    ///
    /// `mutate` runs against the stored object (or the placeholder when
    /// absent). The update path must leave `status` untouched, and must
    /// not write when the mutation produced no change.
    async fn create_or_update(
        &self,
        placeholder: DynamicObject,
        mutate: MutateFn<'_>,
    ) -> StoreResult<OperationResult>;
}

/// Writes the status sub-resource.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the stored status with `object.status`.
    ///
    /// Fails with `StoreError::Conflict` when the stored resource version
    /// differs from `object.metadata.resource_version`.
    async fn update_status(&self, object: &DynamicObject) -> StoreResult<()>;
}

/// Fire-and-forget notifications about an object.
pub trait EventRecorder: Send + Sync {
    fn record(&self, subject: &ObjectKey, event_type: EventType, reason: &str, message: &str);
}

/// Creates tenants inside a storage cluster. Must be idempotent.
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    async fn create(&self, request: &TenantRequest) -> Result<(), ProvisionError>;
}

/// Fetch a typed resource.
pub async fn fetch<R: Resource>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> StoreResult<Option<R>> {
    store
        .get(R::KIND, key)
        .await?
        .map(R::from_dynamic)
        .transpose()
}
