//! Domain types for the dbgrid controller.
//!
//! These are the persisted shapes of databases, storage clusters and
//! compute workloads, plus the transient `TenantRequest` and event records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ResourceConfigError;
use crate::object::{ObjectKey, ObjectMeta, Resource};

/// Default tenant domain when a spec does not name one.
pub const DEFAULT_DOMAIN: &str = "root";

/// Default gRPC port of a storage cluster.
pub const DEFAULT_GRPC_PORT: u16 = 2135;

/// Storage cluster state that allows databases to proceed.
pub const STORAGE_READY: &str = "Ready";

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_grpc_port() -> u16 {
    DEFAULT_GRPC_PORT
}

// ── Status vocabulary ──────────────────────────────────────────────

/// Operational state of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterState {
    #[default]
    Provisioning,
    Initializing,
    Ready,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterState::Provisioning => write!(f, "Provisioning"),
            ClusterState::Initializing => write!(f, "Initializing"),
            ClusterState::Ready => write!(f, "Ready"),
        }
    }
}

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single observed condition on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Unix timestamp (seconds) of the last status change.
    #[serde(default)]
    pub last_transition_time: u64,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: 0,
        }
    }
}

// ── Database ───────────────────────────────────────────────────────

/// Reference to another object, optionally in a different namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacedRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl NamespacedRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Resolve to a key, defaulting the namespace to `default_namespace`.
    pub fn key(&self, default_namespace: &str) -> ObjectKey {
        ObjectKey::new(
            self.namespace.as_deref().unwrap_or(default_namespace),
            &self.name,
        )
    }
}

/// Storage pool allocation for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUnit {
    pub unit_kind: String,
    pub count: u64,
}

/// Storage units for dedicated or shared databases.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageResources {
    #[serde(default)]
    pub storage_units: Vec<StorageUnit>,
}

/// Serverless databases live inside a shared database's tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessResources {
    pub shared_database_ref: NamespacedRef,
}

/// Resolved resource configuration; exactly one variant per database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceConfig {
    Dedicated { storage_units: Vec<StorageUnit> },
    Shared { storage_units: Vec<StorageUnit> },
    Serverless { shared_database: NamespacedRef },
}

impl ResourceConfig {
    pub fn is_serverless(&self) -> bool {
        matches!(self, ResourceConfig::Serverless { .. })
    }
}

/// Desired state of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    pub storage_cluster_ref: NamespacedRef,
    /// Desired compute node count.
    #[serde(default)]
    pub nodes: u32,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<StorageResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_resources: Option<StorageResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serverless_resources: Option<ServerlessResources>,
}

impl DatabaseSpec {
    /// Resolve the three optional resource fields into one variant.
    pub fn resource_config(&self) -> Result<ResourceConfig, ResourceConfigError> {
        let mut populated = Vec::new();
        if self.resources.is_some() {
            populated.push("resources");
        }
        if self.shared_resources.is_some() {
            populated.push("sharedResources");
        }
        if self.serverless_resources.is_some() {
            populated.push("serverlessResources");
        }
        if populated.len() > 1 {
            return Err(ResourceConfigError::Ambiguous(populated));
        }

        match (
            &self.resources,
            &self.shared_resources,
            &self.serverless_resources,
        ) {
            (Some(r), None, None) => Ok(ResourceConfig::Dedicated {
                storage_units: r.storage_units.clone(),
            }),
            (None, Some(r), None) => Ok(ResourceConfig::Shared {
                storage_units: r.storage_units.clone(),
            }),
            (None, None, Some(s)) => Ok(ResourceConfig::Serverless {
                shared_database: s.shared_database_ref.clone(),
            }),
            _ => Err(ResourceConfigError::Missing),
        }
    }
}

/// Observed state of a database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    #[serde(default)]
    pub state: ClusterState,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DatabaseStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Insert or update a condition, keeping list order stable.
    ///
    /// `last_transition_time` only moves when the status value changes;
    /// it is taken from `condition` when non-zero, otherwise from `now`.
    /// Returns whether anything changed.
    pub fn set_condition(&mut self, mut condition: Condition, now: u64) -> bool {
        if condition.last_transition_time == 0 {
            condition.last_transition_time = now;
        }
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            None => {
                self.conditions.push(condition);
                true
            }
            Some(existing) => {
                let mut changed = false;
                if existing.status != condition.status {
                    existing.status = condition.status;
                    existing.last_transition_time = condition.last_transition_time;
                    changed = true;
                }
                if existing.reason != condition.reason {
                    existing.reason = condition.reason;
                    changed = true;
                }
                if existing.message != condition.message {
                    existing.message = condition.message;
                    changed = true;
                }
                changed
            }
        }
    }
}

/// A logical database inside a storage cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub metadata: ObjectMeta,
    pub spec: DatabaseSpec,
    #[serde(default)]
    pub status: DatabaseStatus,
}

impl Resource for Database {
    const KIND: &'static str = "Database";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ── Storage cluster ────────────────────────────────────────────────

/// gRPC endpoint settings of a storage cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcService {
    #[serde(default = "default_grpc_port")]
    pub port: u16,
    #[serde(default)]
    pub tls_enabled: bool,
}

impl Default for GrpcService {
    fn default() -> Self {
        Self {
            port: DEFAULT_GRPC_PORT,
            tls_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    #[serde(default)]
    pub grpc: GrpcService,
}

/// Status reported by the storage cluster's own controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageClusterStatus {
    #[serde(default)]
    pub state: String,
}

/// The storage cluster a database depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCluster {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: StorageClusterSpec,
    #[serde(default)]
    pub status: StorageClusterStatus,
}

impl StorageCluster {
    pub fn is_ready(&self) -> bool {
        self.status.state == STORAGE_READY
    }
}

impl Resource for StorageCluster {
    const KIND: &'static str = "StorageCluster";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ── Workload ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// Replicas currently running, as observed by the workload controller.
    #[serde(default)]
    pub replicas: u32,
}

/// Compute workload controller backing a non-serverless database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkloadSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

impl Resource for Workload {
    const KIND: &'static str = "Workload";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ── Tenant ─────────────────────────────────────────────────────────

/// A request to create a tenant inside a storage cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRequest {
    pub storage_endpoint: String,
    pub path: String,
    pub storage_units: Vec<StorageUnit>,
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_database_path: Option<String>,
    pub use_secure_channel: bool,
}

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// A recorded notification about an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub subject: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    /// Unix timestamp (seconds) of the latest occurrence.
    pub timestamp: u64,
    /// Occurrences folded into this entry.
    #[serde(default = "default_event_count")]
    pub count: u32,
}

fn default_event_count() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DatabaseSpec {
        DatabaseSpec {
            storage_cluster_ref: NamespacedRef::new("storage"),
            nodes: 3,
            domain: default_domain(),
            resources: None,
            shared_resources: None,
            serverless_resources: None,
        }
    }

    fn units() -> StorageResources {
        StorageResources {
            storage_units: vec![StorageUnit {
                unit_kind: "ssd".to_string(),
                count: 1,
            }],
        }
    }

    #[test]
    fn resource_config_requires_exactly_one_variant() {
        assert_eq!(spec().resource_config(), Err(ResourceConfigError::Missing));

        let mut both = spec();
        both.resources = Some(units());
        both.serverless_resources = Some(ServerlessResources {
            shared_database_ref: NamespacedRef::new("shared"),
        });
        assert_eq!(
            both.resource_config(),
            Err(ResourceConfigError::Ambiguous(vec![
                "resources",
                "serverlessResources"
            ]))
        );
    }

    #[test]
    fn resource_config_resolves_each_variant() {
        let mut dedicated = spec();
        dedicated.resources = Some(units());
        assert!(matches!(
            dedicated.resource_config(),
            Ok(ResourceConfig::Dedicated { ref storage_units }) if storage_units.len() == 1
        ));

        let mut shared = spec();
        shared.shared_resources = Some(units());
        assert!(matches!(
            shared.resource_config(),
            Ok(ResourceConfig::Shared { .. })
        ));

        let mut serverless = spec();
        serverless.serverless_resources = Some(ServerlessResources {
            shared_database_ref: NamespacedRef::new("shared"),
        });
        let config = serverless.resource_config().unwrap();
        assert!(config.is_serverless());
    }

    #[test]
    fn set_condition_moves_transition_time_only_on_status_change() {
        let mut status = DatabaseStatus::default();
        let condition = |status, reason, message| {
            Condition::new("TenantInitialized", status, reason, message)
        };
        let pending = condition(ConditionStatus::False, "InProgress", "");

        assert!(status.set_condition(pending.clone(), 100));
        assert!(!status.set_condition(pending, 200));
        assert_eq!(status.conditions[0].last_transition_time, 100);

        let reworded = condition(ConditionStatus::False, "InProgress", "waiting");
        assert!(status.set_condition(reworded, 300));
        assert_eq!(status.conditions[0].last_transition_time, 100);

        let done = condition(ConditionStatus::True, "Completed", "");
        assert!(status.set_condition(done, 400));
        assert_eq!(status.conditions[0].last_transition_time, 400);
        assert!(status.is_condition_true("TenantInitialized"));
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn database_round_trips_through_dynamic_object() {
        let db = Database {
            metadata: ObjectMeta::new("prod", "orders"),
            spec: spec(),
            status: DatabaseStatus::default(),
        };
        let dynamic = db.to_dynamic().unwrap();
        assert_eq!(dynamic.kind, "Database");
        assert_eq!(dynamic.spec["storageClusterRef"]["name"], "storage");

        let back = Database::from_dynamic(dynamic).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn missing_status_defaults_on_decode() {
        let raw = serde_json::json!({
            "kind": "Database",
            "metadata": { "name": "orders", "namespace": "prod" },
            "spec": { "storageClusterRef": { "name": "storage" }, "nodes": 1 }
        });
        let dynamic: crate::object::DynamicObject = serde_json::from_value(raw).unwrap();
        let db = Database::from_dynamic(dynamic).unwrap();
        assert_eq!(db.status.state, ClusterState::Provisioning);
        assert_eq!(db.spec.domain, "root");
        assert!(db.status.conditions.is_empty());
    }

    #[test]
    fn from_dynamic_rejects_wrong_kind() {
        let dynamic =
            crate::object::DynamicObject::new("Workload", &ObjectKey::new("prod", "orders"));
        assert!(Database::from_dynamic(dynamic).is_err());
    }
}
