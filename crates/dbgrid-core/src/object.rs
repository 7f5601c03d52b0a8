//! Object model: keys, metadata, and the untyped `DynamicObject`.
//!
//! Every store operation speaks `DynamicObject` (`kind` + `metadata` +
//! free-form `spec`/`status`). Typed resources implement [`Resource`] and
//! convert through serde, so the store never needs to know about them.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OwnershipError, StoreError, StoreResult};

/// Namespaced name of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` string.
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, name) = s.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from a managed object to the object that controls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: bool,
}

/// Metadata common to every object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Assigned by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_reference: Option<OwnerReference>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Mark `owner` (of kind `owner_kind`) as the controller of this object.
    ///
    /// Re-applying the same owner is a no-op. Owners must share the
    /// object's namespace, and an object has at most one controller.
    pub fn set_controller_reference(
        &mut self,
        owner_kind: &str,
        owner: &ObjectMeta,
    ) -> Result<(), OwnershipError> {
        if owner.namespace != self.namespace {
            return Err(OwnershipError::CrossNamespace {
                owner: owner.namespace.clone(),
                object: self.namespace.clone(),
            });
        }
        if let Some(existing) = &self.owner_reference
            && existing.controller
            && (existing.kind != owner_kind || existing.name != owner.name)
        {
            return Err(OwnershipError::AlreadyControlled {
                kind: existing.kind.clone(),
                name: existing.name.clone(),
            });
        }
        self.owner_reference = Some(OwnerReference {
            kind: owner_kind.to_string(),
            name: owner.name.clone(),
            controller: true,
        });
        Ok(())
    }
}

/// An object of any kind, with untyped spec and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: Value,
}

impl DynamicObject {
    /// An empty object of `kind` at `key`, with no spec or status.
    pub fn new(kind: impl Into<String>, key: &ObjectKey) -> Self {
        Self {
            kind: kind.into(),
            metadata: ObjectMeta::new(&key.namespace, &key.name),
            spec: Value::Null,
            status: Value::Null,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Composite store key: `{kind}/{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        table_key(&self.kind, &self.key())
    }
}

/// Composite store key for an object of `kind` at `key`.
pub fn table_key(kind: &str, key: &ObjectKey) -> String {
    format!("{kind}/{}/{}", key.namespace, key.name)
}

/// A typed resource that round-trips through `DynamicObject`.
///
/// Implementors serialize as `{ "metadata", "spec", "status" }`.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }

    fn from_dynamic(object: DynamicObject) -> StoreResult<Self> {
        if object.kind != Self::KIND {
            return Err(StoreError::InvalidObject(format!(
                "expected kind {}, got {}",
                Self::KIND,
                object.kind
            )));
        }
        let mut map = Map::new();
        map.insert(
            "metadata".to_string(),
            serde_json::to_value(&object.metadata)
                .map_err(|e| StoreError::Serialize(e.to_string()))?,
        );
        // Absent sections fall back to the typed `#[serde(default)]`.
        if !object.spec.is_null() {
            map.insert("spec".to_string(), object.spec);
        }
        if !object.status.is_null() {
            map.insert("status".to_string(), object.status);
        }
        serde_json::from_value(Value::Object(map))
            .map_err(|e| StoreError::Deserialize(e.to_string()))
    }

    fn to_dynamic(&self) -> StoreResult<DynamicObject> {
        let value = serde_json::to_value(self).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(StoreError::Serialize(format!(
                "{} did not serialize to an object",
                Self::KIND
            )));
        };
        let metadata = map
            .remove("metadata")
            .ok_or_else(|| StoreError::Serialize("missing metadata".to_string()))?;
        let metadata: ObjectMeta =
            serde_json::from_value(metadata).map_err(|e| StoreError::Serialize(e.to_string()))?;
        Ok(DynamicObject {
            kind: Self::KIND.to_string(),
            metadata,
            spec: map.remove("spec").unwrap_or(Value::Null),
            status: map.remove("status").unwrap_or(Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_object_key() {
        assert_eq!(
            ObjectKey::parse("prod/orders"),
            Some(ObjectKey::new("prod", "orders"))
        );
        assert_eq!(ObjectKey::parse("orders"), None);
        assert_eq!(ObjectKey::parse("/orders"), None);
        assert_eq!(ObjectKey::parse("a/b/c"), None);
        assert_eq!(ObjectKey::new("prod", "orders").to_string(), "prod/orders");
    }

    #[test]
    fn controller_reference_is_idempotent() {
        let owner = ObjectMeta::new("prod", "orders");
        let mut meta = ObjectMeta::new("prod", "orders-grpc");

        meta.set_controller_reference("Database", &owner).unwrap();
        meta.set_controller_reference("Database", &owner).unwrap();

        let owner_ref = meta.owner_reference.unwrap();
        assert_eq!(owner_ref.kind, "Database");
        assert_eq!(owner_ref.name, "orders");
        assert!(owner_ref.controller);
    }

    #[test]
    fn controller_reference_rejects_cross_namespace() {
        let owner = ObjectMeta::new("prod", "orders");
        let mut meta = ObjectMeta::new("staging", "orders");

        let err = meta.set_controller_reference("Database", &owner).unwrap_err();
        assert!(matches!(err, OwnershipError::CrossNamespace { .. }));
    }

    #[test]
    fn controller_reference_rejects_second_controller() {
        let mut meta = ObjectMeta::new("prod", "shared-svc");
        meta.set_controller_reference("Database", &ObjectMeta::new("prod", "a"))
            .unwrap();

        let err = meta
            .set_controller_reference("Database", &ObjectMeta::new("prod", "b"))
            .unwrap_err();
        assert_eq!(
            err,
            OwnershipError::AlreadyControlled {
                kind: "Database".to_string(),
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn table_key_layout() {
        let obj = DynamicObject::new("Service", &ObjectKey::new("prod", "orders-grpc"));
        assert_eq!(obj.table_key(), "Service/prod/orders-grpc");
    }
}
