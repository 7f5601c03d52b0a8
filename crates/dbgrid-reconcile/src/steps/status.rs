//! The only writer of database status.

use tracing::{debug, info, warn};

use dbgrid_core::traits::fetch;
use dbgrid_core::{Database, EventType, Resource};

use crate::aggregate::DatabaseAggregate;
use crate::error::ReconcileError;
use crate::flow::Requeue;
use crate::reconciler::Reconciler;

impl Reconciler {
    /// Copy state and conditions onto a freshly read database and write its
    /// status. A stored status that already matches is not rewritten.
    pub(crate) async fn persist_status(&self, aggregate: &DatabaseAggregate) -> Requeue {
        let key = aggregate.key();

        let result = match fetch::<Database>(self.store.as_ref(), &key).await {
            Ok(Some(fresh)) if fresh.status == *aggregate.status() => {
                debug!(state = %fresh.status.state, "status unchanged, skipping write");
                Ok(())
            }
            Ok(Some(mut fresh)) => {
                fresh.status.state = aggregate.status().state;
                fresh.status.conditions = aggregate.status().conditions.clone();
                match fresh.to_dynamic() {
                    Ok(object) => self
                        .status_writer
                        .update_status(&object)
                        .await
                        .map_err(|e| ReconcileError::StatusUpdate {
                            key: key.clone(),
                            source: e,
                        }),
                    Err(e) => Err(ReconcileError::StatusUpdate {
                        key: key.clone(),
                        source: e,
                    }),
                }
            }
            Ok(None) => Err(ReconcileError::StatusTargetMissing(key.clone())),
            Err(e) => Err(ReconcileError::Fetch {
                kind: Database::KIND.to_string(),
                key: key.clone(),
                source: e,
            }),
        };

        match result {
            Ok(()) => {
                info!(state = %aggregate.status().state, "status persisted");
                Requeue::after(self.delays.status_update)
            }
            Err(e) => {
                warn!(error = %e, "status update failed");
                self.event(
                    aggregate,
                    EventType::Warning,
                    "ControllerError",
                    &format!("Failed setting status: {e}"),
                );
                Requeue::with_error(self.delays.default, e)
            }
        }
    }
}
