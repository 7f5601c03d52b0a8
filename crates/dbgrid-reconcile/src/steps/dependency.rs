//! Storage cluster gate.

use tracing::{debug, info};

use dbgrid_core::traits::fetch;
use dbgrid_core::{EventType, Resource, STORAGE_READY, StorageCluster};

use crate::aggregate::DatabaseAggregate;
use crate::error::ReconcileError;
use crate::flow::Flow;
use crate::reconciler::Reconciler;

impl Reconciler {
    /// Halt until the referenced storage cluster exists and reports Ready.
    pub(crate) async fn wait_for_storage(&self, aggregate: &mut DatabaseAggregate) -> Flow {
        info!(step = "wait_for_storage", "running step");
        let storage_key = aggregate.storage_key();
        let delay = self.delays.storage_await;

        let storage = match fetch::<StorageCluster>(self.store.as_ref(), &storage_key).await {
            Ok(Some(storage)) => storage,
            Ok(None) => {
                self.event(
                    aggregate,
                    EventType::Warning,
                    "Pending",
                    &format!("Storage ({storage_key}) not found."),
                );
                return Flow::halt(delay);
            }
            Err(e) => {
                self.event(
                    aggregate,
                    EventType::Warning,
                    "Pending",
                    &format!("Failed to get StorageCluster ({storage_key}) resource, error: {e}"),
                );
                return Flow::fail(
                    delay,
                    ReconcileError::Fetch {
                        kind: StorageCluster::KIND.to_string(),
                        key: storage_key,
                        source: e,
                    },
                );
            }
        };

        if !storage.is_ready() {
            self.event(
                aggregate,
                EventType::Warning,
                "Pending",
                &format!(
                    "Referenced storage cluster ({storage_key}) in a bad state: {} != {STORAGE_READY}",
                    storage.status.state
                ),
            );
            return Flow::halt(delay);
        }

        debug!(storage = %storage_key, "storage cluster ready");
        aggregate.attach_storage(storage);
        Flow::Continue
    }
}
