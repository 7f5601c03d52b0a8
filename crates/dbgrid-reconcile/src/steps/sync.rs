//! Create-or-update of every object the database owns.

use anyhow::Context;
use tracing::{debug, info};

use dbgrid_core::{Database, DynamicObject, EventType, Resource};

use crate::aggregate::DatabaseAggregate;
use crate::error::ReconcileError;
use crate::flow::Flow;
use crate::reconciler::Reconciler;

impl Reconciler {
    /// Sync the catalog's builders in order, stopping at the first failure.
    pub(crate) async fn sync_resources(&self, aggregate: &mut DatabaseAggregate) -> Flow {
        info!(step = "sync_resources", "running step");
        let owner = aggregate.metadata().clone();

        for builder in self.catalog.builders(aggregate) {
            let placeholder = builder.placeholder(aggregate);
            let kind = placeholder.kind.clone();
            let target = placeholder.key();
            let description = format!(
                "Resource: {kind}, Namespace: {}, Name: {}",
                target.namespace, target.name
            );

            let mutate = |object: &mut DynamicObject| -> anyhow::Result<()> {
                builder.build(object).context("building resource")?;
                object
                    .metadata
                    .set_controller_reference(Database::KIND, &owner)
                    .context("setting controller reference")?;
                Ok(())
            };

            match self.store.create_or_update(placeholder, &mutate).await {
                Ok(result) if result.changed() => {
                    info!(%kind, object = %target, %result, "resource synced");
                    self.event(
                        aggregate,
                        EventType::Normal,
                        "Provisioning",
                        &format!("{description}, changed, result: {result}"),
                    );
                }
                Ok(_) => debug!(%kind, object = %target, "resource unchanged"),
                Err(e) => {
                    self.event(
                        aggregate,
                        EventType::Warning,
                        "ProvisioningFailed",
                        &format!("{description}, failed to sync, error: {e}"),
                    );
                    return Flow::fail(
                        self.delays.default,
                        ReconcileError::Sync {
                            kind,
                            key: target,
                            source: e,
                        },
                    );
                }
            }
        }

        debug!("resource sync complete");
        Flow::Continue
    }
}
