//! Reconciler: the per-database pipeline driver.
//!
//! The `Reconciler` owns no state between passes. Everything it knows about
//! a database comes from the store at the start of `reconcile`, and
//! everything it decides leaves either as a store write or as the returned
//! `Directive`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{Instrument, debug, info, info_span, warn};

use dbgrid_core::config::DEFAULT_CLUSTER_DOMAIN;
use dbgrid_core::traits::{EventRecorder, ObjectStore, StatusWriter, TenantProvisioner, fetch};
use dbgrid_core::{Database, EventType, ObjectKey, RequeueDelays, Resource};

use crate::aggregate::DatabaseAggregate;
use crate::builder::BuilderCatalog;
use crate::error::ReconcileError;
use crate::flow::{Directive, Flow, Requeue};

/// Short-circuit the pipeline on the first halting step.
macro_rules! step {
    ($flow:expr) => {
        if let Flow::Halt(requeue) = $flow {
            return Directive::Requeue(requeue);
        }
    };
}

/// External collaborators the reconciler drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub status_writer: Arc<dyn StatusWriter>,
    pub recorder: Arc<dyn EventRecorder>,
    pub provisioner: Arc<dyn TenantProvisioner>,
    pub catalog: Arc<dyn BuilderCatalog>,
}

impl Collaborators {
    /// Use one backend for every contract except the builder catalog.
    pub fn from_backend<B>(backend: Arc<B>, catalog: Arc<dyn BuilderCatalog>) -> Self
    where
        B: ObjectStore + StatusWriter + EventRecorder + TenantProvisioner + 'static,
    {
        Self {
            store: backend.clone(),
            status_writer: backend.clone(),
            recorder: backend.clone(),
            provisioner: backend,
            catalog,
        }
    }
}

/// Tunables for a reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub delays: RequeueDelays,
    /// DNS suffix for derived storage endpoints.
    pub cluster_domain: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            delays: RequeueDelays::default(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
        }
    }
}

/// Drives a database through storage gate, resource sync, scale wait and
/// tenant provisioning.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) status_writer: Arc<dyn StatusWriter>,
    pub(crate) recorder: Arc<dyn EventRecorder>,
    pub(crate) provisioner: Arc<dyn TenantProvisioner>,
    pub(crate) catalog: Arc<dyn BuilderCatalog>,
    pub(crate) delays: RequeueDelays,
    pub(crate) cluster_domain: String,
}

impl Reconciler {
    pub fn new(collaborators: Collaborators, config: ReconcilerConfig) -> Self {
        Self {
            store: collaborators.store,
            status_writer: collaborators.status_writer,
            recorder: collaborators.recorder,
            provisioner: collaborators.provisioner,
            catalog: collaborators.catalog,
            delays: config.delays,
            cluster_domain: config.cluster_domain,
        }
    }

    /// Run one pass for the database at `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Directive {
        let span = info_span!("reconcile", database = %key);
        async move {
            let database = match fetch::<Database>(self.store.as_ref(), key).await {
                Ok(Some(database)) => database,
                Ok(None) => {
                    debug!("database not found, nothing to do");
                    return Directive::Converged;
                }
                Err(e) => {
                    warn!(error = %e, "failed to load database");
                    return Directive::Requeue(Requeue::with_error(
                        self.delays.default,
                        ReconcileError::Fetch {
                            kind: Database::KIND.to_string(),
                            key: key.clone(),
                            source: e,
                        },
                    ));
                }
            };

            let mut aggregate = match DatabaseAggregate::new(database) {
                Ok(aggregate) => aggregate,
                Err(e) => {
                    warn!(error = %e, "invalid resources configuration");
                    self.recorder.record(
                        key,
                        EventType::Warning,
                        "ControllerError",
                        &e.to_string(),
                    );
                    return Directive::Requeue(Requeue::with_error(
                        self.delays.default,
                        ReconcileError::Configuration(e),
                    ));
                }
            };

            let directive = self.run(&mut aggregate).await;
            match &directive {
                Directive::Converged => debug!(state = %aggregate.status().state, "converged"),
                Directive::Requeue(r) => match &r.error {
                    Some(e) => warn!(
                        after = ?r.after,
                        class = %e.class(),
                        error = %e,
                        "pass failed, requeueing"
                    ),
                    None => debug!(after = ?r.after, "requeueing"),
                },
            }
            directive
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline over an already loaded aggregate.
    pub async fn run(&self, aggregate: &mut DatabaseAggregate) -> Directive {
        step!(self.wait_for_storage(aggregate).await);
        step!(self.sync_resources(aggregate).await);
        step!(self.wait_for_scale(aggregate).await);
        if !aggregate.tenant_initialized() {
            step!(self.init_status(aggregate).await);
            step!(self.create_tenant(aggregate).await);
        }
        info!(state = %aggregate.status().state, "database reconciled");
        Directive::Converged
    }

    pub(crate) fn event(
        &self,
        aggregate: &DatabaseAggregate,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        self.recorder
            .record(&aggregate.key(), event_type, reason, message);
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
