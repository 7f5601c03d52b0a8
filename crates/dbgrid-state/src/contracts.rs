//! Collaborator contract implementations for `StateStore`.

use async_trait::async_trait;
use tracing::{debug, warn};

use dbgrid_core::traits::{
    EventRecorder, MutateFn, ObjectStore, OperationResult, StatusWriter, TenantProvisioner,
};
use dbgrid_core::{
    DynamicObject, Event, EventType, ObjectKey, ProvisionError, StoreResult, TenantRequest,
};

use crate::store::{StateStore, epoch_secs};

#[async_trait]
impl ObjectStore for StateStore {
    async fn get(&self, kind: &str, key: &ObjectKey) -> StoreResult<Option<DynamicObject>> {
        self.get_object(kind, key)
    }

    async fn create_or_update(
        &self,
        placeholder: DynamicObject,
        mutate: MutateFn<'_>,
    ) -> StoreResult<OperationResult> {
        self.create_or_update_object(placeholder, mutate)
    }
}

#[async_trait]
impl StatusWriter for StateStore {
    async fn update_status(&self, object: &DynamicObject) -> StoreResult<()> {
        self.write_status(object).map(|_| ())
    }
}

/// Events are written synchronously on the caller's task: one small redb
/// write transaction per call, folded and capped by `put_event`. A failed
/// write is logged and dropped.
impl EventRecorder for StateStore {
    fn record(&self, subject: &ObjectKey, event_type: EventType, reason: &str, message: &str) {
        let event = Event {
            subject: subject.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: epoch_secs(),
            count: 1,
        };
        match event_type {
            EventType::Normal => debug!(%subject, reason, message, "event"),
            EventType::Warning => warn!(%subject, reason, message, "event"),
        }
        if let Err(e) = self.put_event(&event) {
            warn!(%subject, reason, error = %e, "failed to record event");
        }
    }
}

/// Standalone tenant registry: records each tenant path once.
#[async_trait]
impl TenantProvisioner for StateStore {
    async fn create(&self, request: &TenantRequest) -> Result<(), ProvisionError> {
        let created = self.put_tenant(request)?;
        if !created {
            debug!(path = %request.path, "tenant already exists");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgrid_core::traits::fetch;
    use dbgrid_core::{Database, Resource, StoreError, Workload};
    use serde_json::json;

    fn database() -> DynamicObject {
        let mut obj = DynamicObject::new("Database", &ObjectKey::new("prod", "orders"));
        obj.spec = json!({
            "storageClusterRef": { "name": "storage" },
            "nodes": 3,
            "resources": { "storageUnits": [] }
        });
        obj
    }

    #[tokio::test]
    async fn typed_fetch_through_object_store() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_object(&database()).unwrap();

        let db: Database = fetch(&store, &ObjectKey::new("prod", "orders"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(db.spec.nodes, 3);

        let missing: Option<Workload> = fetch(&store, &ObjectKey::new("prod", "orders"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn status_writer_uses_resource_version() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_object(&database()).unwrap();

        let mut db: Database = fetch(&store, &ObjectKey::new("prod", "orders"))
            .await
            .unwrap()
            .unwrap();
        db.status.state = dbgrid_core::ClusterState::Ready;
        let stale = db.to_dynamic().unwrap();

        store.update_status(&stale).await.unwrap();
        let err = store.update_status(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn recorder_persists_events() {
        let store = StateStore::open_in_memory().unwrap();
        let key = ObjectKey::new("prod", "orders");

        store.record(&key, EventType::Warning, "Pending", "Storage (prod/storage) not found.");

        let events = store.list_events(&key).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Warning);
        assert_eq!(events[0].reason, "Pending");
    }

    #[tokio::test]
    async fn provisioner_registers_tenant_once() {
        let store = StateStore::open_in_memory().unwrap();
        let request = TenantRequest {
            storage_endpoint: "grpc://storage-grpc.prod.svc.cluster.local:2135".to_string(),
            path: "/root/orders".to_string(),
            storage_units: vec![],
            shared: true,
            shared_database_path: None,
            use_secure_channel: false,
        };

        store.create(&request).await.unwrap();
        store.create(&request).await.unwrap();
        assert_eq!(store.get_tenant("/root/orders").unwrap(), Some(request));
    }
}
