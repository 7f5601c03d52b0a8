//! Requeue loop: runs due reconcile passes on a fixed tick.
//!
//! Passes run one at a time on the loop's task, so a database never has
//! two passes in flight. The next pass of a key is scheduled from the
//! directive its last pass returned.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};

use dbgrid_core::{Database, ObjectKey, Resource};
use dbgrid_reconcile::Reconciler;
use dbgrid_state::StateStore;

pub struct Controller {
    store: StateStore,
    reconciler: Reconciler,
    /// Wait after a converged pass.
    resync: Duration,
    tick: Duration,
    /// Database key → earliest time of its next pass.
    due: HashMap<ObjectKey, Instant>,
}

impl Controller {
    pub fn new(
        store: StateStore,
        reconciler: Reconciler,
        resync: Duration,
        tick: Duration,
    ) -> Self {
        Self {
            store,
            reconciler,
            resync,
            tick,
            due: HashMap::new(),
        }
    }

    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_ms = self.tick.as_millis() as u64,
            resync_secs = self.resync.as_secs(),
            "controller started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {
                    if let Err(e) = self.run_due(Instant::now()).await {
                        error!(error = %e, "controller tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }
    }

    /// Run every pass due at `now`. Returns how many ran.
    pub async fn run_due(&mut self, now: Instant) -> anyhow::Result<usize> {
        let keys: Vec<ObjectKey> = self
            .store
            .list_objects(Database::KIND)?
            .iter()
            .map(|object| object.key())
            .collect();
        self.due.retain(|key, _| keys.contains(key));

        let mut passes = 0;
        for key in keys {
            if self.due.get(&key).is_some_and(|at| *at > now) {
                continue;
            }
            let directive = self.reconciler.reconcile(&key).await;
            let after = directive.requeue_after().unwrap_or(self.resync);
            debug!(database = %key, after = ?after, "next pass scheduled");
            self.due.insert(key, now + after);
            passes += 1;
        }
        Ok(passes)
    }

    pub fn next_due(&self, key: &ObjectKey) -> Option<Instant> {
        self.due.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dbgrid_core::DynamicObject;
    use dbgrid_reconcile::{Collaborators, ReconcilerConfig};
    use serde_json::json;

    use crate::builders::StandardCatalog;

    fn controller(store: &StateStore) -> Controller {
        let reconciler = Reconciler::new(
            Collaborators::from_backend(Arc::new(store.clone()), Arc::new(StandardCatalog)),
            ReconcilerConfig::default(),
        );
        Controller::new(
            store.clone(),
            reconciler,
            Duration::from_secs(300),
            Duration::from_secs(1),
        )
    }

    fn put_database(store: &StateStore, name: &str) {
        let mut obj = DynamicObject::new("Database", &ObjectKey::new("prod", name));
        obj.spec = json!({
            "storageClusterRef": { "name": "storage" },
            "nodes": 1,
            "resources": { "storageUnits": [] }
        });
        store.put_object(&obj).unwrap();
    }

    #[tokio::test]
    async fn schedules_from_directive() {
        let store = StateStore::open_in_memory().unwrap();
        put_database(&store, "orders");
        let mut controller = controller(&store);
        let key = ObjectKey::new("prod", "orders");

        let now = Instant::now();
        assert_eq!(controller.run_due(now).await.unwrap(), 1);
        // No storage cluster: storage await delay.
        assert_eq!(controller.next_due(&key), Some(now + Duration::from_secs(60)));

        assert_eq!(controller.run_due(now + Duration::from_secs(30)).await.unwrap(), 0);
        assert_eq!(controller.run_due(now + Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deleted_databases_are_forgotten() {
        let store = StateStore::open_in_memory().unwrap();
        put_database(&store, "orders");
        put_database(&store, "billing");
        let mut controller = controller(&store);

        assert_eq!(controller.run_due(Instant::now()).await.unwrap(), 2);
        store
            .delete_object("Database", &ObjectKey::new("prod", "billing"))
            .unwrap();
        controller.run_due(Instant::now()).await.unwrap();
        assert!(controller.next_due(&ObjectKey::new("prod", "billing")).is_none());
        assert!(controller.next_due(&ObjectKey::new("prod", "orders")).is_some());
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let store = StateStore::open_in_memory().unwrap();
        let mut controller = controller(&store);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { controller.run(rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
