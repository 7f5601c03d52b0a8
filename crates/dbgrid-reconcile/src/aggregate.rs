//! In-memory view of one database for the duration of a pass.

use dbgrid_core::{
    Database, DatabaseSpec, DatabaseStatus, ObjectKey, ObjectMeta, ResourceConfig,
    ResourceConfigError, StorageCluster,
};

/// Condition tracking one-time tenant creation.
pub const TENANT_INITIALIZED: &str = "TenantInitialized";
pub const REASON_IN_PROGRESS: &str = "InProgress";
pub const REASON_COMPLETED: &str = "Completed";

/// Tenant path for a database named `name` in `domain`.
pub fn tenant_path(domain: &str, name: &str) -> String {
    format!("/{domain}/{name}")
}

/// A database plus what the pipeline learned about it so far.
///
/// Built once per pass and dropped at its end. The spec is read-only;
/// status is edited in place and written back by `persist_status`.
#[derive(Debug, Clone)]
pub struct DatabaseAggregate {
    database: Database,
    resources: ResourceConfig,
    storage: Option<StorageCluster>,
}

impl DatabaseAggregate {
    /// Fails when the spec does not populate exactly one resource variant.
    pub fn new(database: Database) -> Result<Self, ResourceConfigError> {
        let resources = database.spec.resource_config()?;
        Ok(Self {
            database,
            resources,
            storage: None,
        })
    }

    pub fn key(&self) -> ObjectKey {
        self.database.metadata.key()
    }

    pub fn name(&self) -> &str {
        &self.database.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.database.metadata.namespace
    }

    pub fn metadata(&self) -> &ObjectMeta {
        &self.database.metadata
    }

    pub fn spec(&self) -> &DatabaseSpec {
        &self.database.spec
    }

    pub fn status(&self) -> &DatabaseStatus {
        &self.database.status
    }

    pub fn status_mut(&mut self) -> &mut DatabaseStatus {
        &mut self.database.status
    }

    pub fn resources(&self) -> &ResourceConfig {
        &self.resources
    }

    /// Key of the referenced storage cluster.
    pub fn storage_key(&self) -> ObjectKey {
        self.database.spec.storage_cluster_ref.key(self.namespace())
    }

    /// The storage cluster observed by `wait_for_storage`, once attached.
    pub fn storage(&self) -> Option<&StorageCluster> {
        self.storage.as_ref()
    }

    pub fn attach_storage(&mut self, storage: StorageCluster) {
        self.storage = Some(storage);
    }

    pub fn tenant_initialized(&self) -> bool {
        self.database.status.is_condition_true(TENANT_INITIALIZED)
    }

    pub fn path(&self) -> String {
        tenant_path(&self.database.spec.domain, self.name())
    }

    /// gRPC endpoint of the attached storage cluster.
    pub fn storage_endpoint(&self, cluster_domain: &str) -> Option<String> {
        let storage = self.storage.as_ref()?;
        let scheme = if storage.spec.grpc.tls_enabled {
            "grpcs"
        } else {
            "grpc"
        };
        Some(format!(
            "{scheme}://{}-grpc.{}.svc.{cluster_domain}:{}",
            storage.metadata.name, storage.metadata.namespace, storage.spec.grpc.port
        ))
    }
}
