//! Compute scale gate and Ready transition.

use tracing::{debug, info};

use dbgrid_core::traits::fetch;
use dbgrid_core::{ClusterState, EventType, Resource, Workload};

use crate::aggregate::DatabaseAggregate;
use crate::error::ReconcileError;
use crate::flow::Flow;
use crate::reconciler::Reconciler;

impl Reconciler {
    /// Halt until the workload runs `spec.nodes` replicas, then mark the
    /// database Ready once its tenant exists.
    pub(crate) async fn wait_for_scale(&self, aggregate: &mut DatabaseAggregate) -> Flow {
        info!(step = "wait_for_scale", "running step");

        if !aggregate.resources().is_serverless() {
            let key = aggregate.key();
            let workload = match fetch::<Workload>(self.store.as_ref(), &key).await {
                Ok(Some(workload)) => workload,
                Ok(None) => {
                    debug!("workload not created yet");
                    return Flow::halt(self.delays.default);
                }
                Err(e) => {
                    self.event(
                        aggregate,
                        EventType::Warning,
                        "Syncing",
                        &format!("Failed to get Workload ({key}) resource, error: {e}"),
                    );
                    return Flow::fail(
                        self.delays.default,
                        ReconcileError::Fetch {
                            kind: Workload::KIND.to_string(),
                            key,
                            source: e,
                        },
                    );
                }
            };

            let desired = aggregate.spec().nodes;
            if workload.status.replicas != desired {
                self.event(
                    aggregate,
                    EventType::Normal,
                    "Provisioning",
                    &format!(
                        "Waiting for number of running nodes to match expected: {} != {desired}",
                        workload.status.replicas
                    ),
                );
                aggregate.status_mut().state = ClusterState::Provisioning;
                return Flow::Halt(self.persist_status(aggregate).await);
            }
        }

        if aggregate.status().state != ClusterState::Ready && aggregate.tenant_initialized() {
            self.event(
                aggregate,
                EventType::Normal,
                "ResourcesReady",
                "Resources are ready and database is initialized",
            );
            aggregate.status_mut().state = ClusterState::Ready;
            return Flow::Halt(self.persist_status(aggregate).await);
        }

        Flow::Continue
    }
}
