//! StateStore: redb-backed object persistence for dbgrid.
//!
//! Provides typed access over objects, tenants, and events. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use dbgrid_core::object::table_key;
use dbgrid_core::traits::{MutateFn, OperationResult};
use dbgrid_core::{DynamicObject, Event, ObjectKey, StoreError, StoreResult, TenantRequest};

use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Events kept per subject.
pub const MAX_EVENTS_PER_SUBJECT: usize = 64;

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Backend))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Backend))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
        txn.open_table(TENANTS).map_err(map_err!(Backend))?;
        txn.open_table(EVENTS).map_err(map_err!(Backend))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Backend))?;
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    // ── Objects ────────────────────────────────────────────────────

    /// Store an object as given (the `apply` path).
    ///
    /// A `null` status keeps whatever status is already stored. Returns
    /// the new resource version.
    pub fn put_object(&self, object: &DynamicObject) -> StoreResult<u64> {
        let key = object.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        let version;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
            let existing = table
                .get(key.as_str())
                .map_err(map_err!(Backend))?
                .map(|guard| decode_object(guard.value()))
                .transpose()?;

            let mut stored = object.clone();
            version = existing
                .as_ref()
                .map_or(1, |e| e.metadata.resource_version + 1);
            if let Some(existing) = existing
                && stored.status.is_null()
            {
                stored.status = existing.status;
            }
            stored.metadata.resource_version = version;
            write_object(&mut table, &key, &stored)?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%key, version, "object stored");
        Ok(version)
    }

    /// Get an object by kind and key.
    pub fn get_object(&self, kind: &str, key: &ObjectKey) -> StoreResult<Option<DynamicObject>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
        match table
            .get(table_key(kind, key).as_str())
            .map_err(map_err!(Backend))?
        {
            Some(guard) => Ok(Some(decode_object(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all objects of a kind.
    pub fn list_objects(&self, kind: &str) -> StoreResult<Vec<DynamicObject>> {
        let prefix = format!("{kind}/");
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Backend))? {
            let (key, value) = entry.map_err(map_err!(Backend))?;
            if key.value().starts_with(&prefix) {
                results.push(decode_object(value.value())?);
            }
        }
        Ok(results)
    }

    /// Delete an object. Returns true if it existed.
    pub fn delete_object(&self, kind: &str, key: &ObjectKey) -> StoreResult<bool> {
        let table_key = table_key(kind, key);
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        let existed;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
            existed = table
                .remove(table_key.as_str())
                .map_err(map_err!(Backend))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(key = %table_key, existed, "object deleted");
        Ok(existed)
    }

    /// Create or update an object in a single write transaction.
    ///
    /// The stored status always survives the update path, and an update
    /// that leaves the object unchanged is not written.
    pub fn create_or_update_object(
        &self,
        placeholder: DynamicObject,
        mutate: MutateFn<'_>,
    ) -> StoreResult<OperationResult> {
        let key = placeholder.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        let result;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
            let existing = table
                .get(key.as_str())
                .map_err(map_err!(Backend))?
                .map(|guard| decode_object(guard.value()))
                .transpose()?;

            match existing {
                None => {
                    let mut object = placeholder;
                    mutate(&mut object).map_err(StoreError::Mutate)?;
                    ensure_same_key(&key, &object)?;
                    object.metadata.resource_version = 1;
                    write_object(&mut table, &key, &object)?;
                    result = OperationResult::Created;
                }
                Some(current) => {
                    let mut object = current.clone();
                    mutate(&mut object).map_err(StoreError::Mutate)?;
                    ensure_same_key(&key, &object)?;
                    object.status = current.status.clone();
                    object.metadata.resource_version = current.metadata.resource_version;
                    if object == current {
                        result = OperationResult::Unchanged;
                    } else {
                        object.metadata.resource_version += 1;
                        write_object(&mut table, &key, &object)?;
                        result = OperationResult::Updated;
                    }
                }
            }
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%key, %result, "object synced");
        Ok(result)
    }

    /// Replace the stored status, guarded by the object's resource version.
    pub fn write_status(&self, object: &DynamicObject) -> StoreResult<u64> {
        let key = object.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        let version;
        {
            let mut table = txn.open_table(OBJECTS).map_err(map_err!(Backend))?;
            let mut current = table
                .get(key.as_str())
                .map_err(map_err!(Backend))?
                .map(|guard| decode_object(guard.value()))
                .transpose()?
                .ok_or_else(|| StoreError::Missing(key.clone()))?;

            if current.metadata.resource_version != object.metadata.resource_version {
                return Err(StoreError::Conflict {
                    key,
                    expected: object.metadata.resource_version,
                    stored: current.metadata.resource_version,
                });
            }
            current.status = object.status.clone();
            current.metadata.resource_version += 1;
            version = current.metadata.resource_version;
            write_object(&mut table, &key, &current)?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%key, version, "status written");
        Ok(version)
    }

    // ── Tenants ────────────────────────────────────────────────────

    /// Register a tenant. Returns false if the path was already registered.
    pub fn put_tenant(&self, request: &TenantRequest) -> StoreResult<bool> {
        let value = serde_json::to_vec(request).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        let created;
        {
            let mut table = txn.open_table(TENANTS).map_err(map_err!(Backend))?;
            let exists = table
                .get(request.path.as_str())
                .map_err(map_err!(Backend))?
                .is_some();
            if !exists {
                table
                    .insert(request.path.as_str(), value.as_slice())
                    .map_err(map_err!(Backend))?;
            }
            created = !exists;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(path = %request.path, created, "tenant registered");
        Ok(created)
    }

    /// Get a tenant by path.
    pub fn get_tenant(&self, path: &str) -> StoreResult<Option<TenantRequest>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(TENANTS).map_err(map_err!(Backend))?;
        match table.get(path).map_err(map_err!(Backend))? {
            Some(guard) => {
                let tenant: TenantRequest =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(tenant))
            }
            None => Ok(None),
        }
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Record an event for its subject.
    ///
    /// An event repeating the subject's latest (type, reason, message) is
    /// folded into that entry: `count` grows and `timestamp` moves. A
    /// subject keeps at most `MAX_EVENTS_PER_SUBJECT` entries; the oldest
    /// are dropped first.
    pub fn put_event(&self, event: &Event) -> StoreResult<()> {
        let (start, end) = event_range(&event.subject);
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Backend))?;
            let mut entries: Vec<(String, Event)> = table
                .range(start.as_str()..end.as_str())
                .map_err(map_err!(Backend))?
                .map(|item| {
                    let (key, value) = item.map_err(map_err!(Backend))?;
                    Ok((key.value().to_string(), decode_event(value.value())?))
                })
                .collect::<StoreResult<_>>()?;

            if let Some((key, last)) = entries.last_mut()
                && last.event_type == event.event_type
                && last.reason == event.reason
                && last.message == event.message
            {
                last.count = last.count.saturating_add(1);
                last.timestamp = event.timestamp;
                let value = serde_json::to_vec(last).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Backend))?;
            } else {
                let mut sequences = txn.open_table(SEQUENCES).map_err(map_err!(Backend))?;
                let seq = sequences
                    .get("events")
                    .map_err(map_err!(Backend))?
                    .map_or(0, |guard| guard.value())
                    + 1;
                sequences.insert("events", seq).map_err(map_err!(Backend))?;

                let key = format!("{}:{seq:020}", event.subject);
                let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Backend))?;

                let excess = (entries.len() + 1).saturating_sub(MAX_EVENTS_PER_SUBJECT);
                for (key, _) in entries.iter().take(excess) {
                    table.remove(key.as_str()).map_err(map_err!(Backend))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    /// List events for a subject, oldest first.
    pub fn list_events(&self, subject: &ObjectKey) -> StoreResult<Vec<Event>> {
        let (start, end) = event_range(subject);
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Backend))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Backend))?
        {
            let (_, value) = entry.map_err(map_err!(Backend))?;
            results.push(decode_event(value.value())?);
        }
        Ok(results)
    }
}

/// Key range holding every event of `subject`.
///
/// Event keys are `{subject}:{seq}`; `;` sorts directly after `:`.
fn event_range(subject: &ObjectKey) -> (String, String) {
    (format!("{subject}:"), format!("{subject};"))
}

fn decode_event(bytes: &[u8]) -> StoreResult<Event> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn decode_object(bytes: &[u8]) -> StoreResult<DynamicObject> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn write_object(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    object: &DynamicObject,
) -> StoreResult<()> {
    let value = serde_json::to_vec(object).map_err(map_err!(Serialize))?;
    table
        .insert(key, value.as_slice())
        .map_err(map_err!(Backend))?;
    Ok(())
}

fn ensure_same_key(key: &str, object: &DynamicObject) -> StoreResult<()> {
    let mutated = object.table_key();
    if mutated != key {
        return Err(StoreError::InvalidObject(format!(
            "mutation moved {key} to {mutated}"
        )));
    }
    Ok(())
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
