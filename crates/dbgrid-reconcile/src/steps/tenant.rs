//! Tenant provisioning: announce in status, then create exactly once.

use tracing::{debug, info};

use dbgrid_core::traits::fetch;
use dbgrid_core::{
    ClusterState, Condition, ConditionStatus, Database, EventType, Resource, ResourceConfig,
    TenantRequest,
};

use crate::aggregate::{
    DatabaseAggregate, REASON_COMPLETED, REASON_IN_PROGRESS, TENANT_INITIALIZED, tenant_path,
};
use crate::error::ReconcileError;
use crate::flow::Flow;
use crate::reconciler::{Reconciler, epoch_secs};

impl Reconciler {
    /// Record that tenant creation is under way before attempting it.
    pub(crate) async fn init_status(&self, aggregate: &mut DatabaseAggregate) -> Flow {
        info!(step = "init_status", "running step");
        let mut changed = false;

        if aggregate.status().condition(TENANT_INITIALIZED).is_none() {
            aggregate.status_mut().set_condition(
                Condition::new(
                    TENANT_INITIALIZED,
                    ConditionStatus::False,
                    REASON_IN_PROGRESS,
                    "Tenant creation in progress",
                ),
                epoch_secs(),
            );
            changed = true;
        }
        if aggregate.status().state != ClusterState::Initializing {
            aggregate.status_mut().state = ClusterState::Initializing;
            changed = true;
        }

        if changed {
            return Flow::Halt(self.persist_status(aggregate).await);
        }
        Flow::Continue
    }

    /// Create the tenant and flip `TenantInitialized` to True.
    pub(crate) async fn create_tenant(&self, aggregate: &mut DatabaseAggregate) -> Flow {
        info!(step = "create_tenant", "running step");

        let (storage_units, shared, shared_database_path) = match aggregate.resources().clone() {
            ResourceConfig::Dedicated { storage_units } => (storage_units, false, None),
            ResourceConfig::Shared { storage_units } => (storage_units, true, None),
            ResourceConfig::Serverless { shared_database } => {
                let key = shared_database.key(aggregate.namespace());
                let delay = self.delays.shared_database_await;
                let shared_db = match fetch::<Database>(self.store.as_ref(), &key).await {
                    Ok(Some(db)) => db,
                    Ok(None) => {
                        self.event(
                            aggregate,
                            EventType::Warning,
                            "Pending",
                            &format!("Database ({key}) not found."),
                        );
                        return Flow::halt(delay);
                    }
                    Err(e) => {
                        self.event(
                            aggregate,
                            EventType::Warning,
                            "Pending",
                            &format!("Failed to get Database ({key}) resource, error: {e}"),
                        );
                        return Flow::fail(
                            delay,
                            ReconcileError::Fetch {
                                kind: Database::KIND.to_string(),
                                key,
                                source: e,
                            },
                        );
                    }
                };
                if shared_db.status.state != ClusterState::Ready {
                    self.event(
                        aggregate,
                        EventType::Warning,
                        "Pending",
                        &format!(
                            "Referenced shared Database ({key}) in a bad state: {} != {}",
                            shared_db.status.state,
                            ClusterState::Ready
                        ),
                    );
                    return Flow::halt(delay);
                }
                let path = tenant_path(&shared_db.spec.domain, &shared_db.metadata.name);
                (Vec::new(), false, Some(path))
            }
        };

        let (Some(storage), Some(storage_endpoint)) = (
            aggregate.storage(),
            aggregate.storage_endpoint(&self.cluster_domain),
        ) else {
            debug!("storage cluster not attached, waiting");
            return Flow::halt(self.delays.storage_await);
        };

        let request = TenantRequest {
            storage_endpoint,
            path: aggregate.path(),
            storage_units,
            shared,
            shared_database_path,
            use_secure_channel: storage.spec.grpc.tls_enabled,
        };

        if let Err(e) = self.provisioner.create(&request).await {
            self.event(
                aggregate,
                EventType::Warning,
                "InitializingFailed",
                &format!("Error creating tenant {}: {e}", request.path),
            );
            return Flow::fail(
                self.delays.tenant_creation,
                ReconcileError::Provisioning {
                    path: request.path,
                    source: e,
                },
            );
        }

        info!(path = %request.path, "tenant created");
        self.event(
            aggregate,
            EventType::Normal,
            "Initialized",
            &format!("Tenant {} created", request.path),
        );
        aggregate.status_mut().set_condition(
            Condition::new(
                TENANT_INITIALIZED,
                ConditionStatus::True,
                REASON_COMPLETED,
                "Tenant creation is complete",
            ),
            epoch_secs(),
        );
        Flow::Halt(self.persist_status(aggregate).await)
    }
}
