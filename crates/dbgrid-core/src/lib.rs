//! dbgrid-core: shared vocabulary for the dbgrid controller.
//!
//! Holds the object model every collaborator speaks (`DynamicObject` plus
//! the typed `Database`, `StorageCluster` and `Workload` resources), the
//! collaborator contracts consumed by the reconciler, and the TOML
//! controller configuration.

pub mod config;
pub mod error;
pub mod object;
pub mod traits;
pub mod types;

pub use config::{ControllerConfig, RequeueDelays};
pub use error::{OwnershipError, ProvisionError, ResourceConfigError, StoreError, StoreResult};
pub use object::{DynamicObject, ObjectKey, ObjectMeta, OwnerReference, Resource};
pub use traits::*;
pub use types::*;
