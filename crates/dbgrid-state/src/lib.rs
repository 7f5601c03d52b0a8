//! dbgrid-state: embedded object store for dbgrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for objects, provisioned tenants, and recorded events.
//!
//! # Architecture
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{kind}/{namespace}/{name}`, `{namespace}/{name}:{seq}`)
//! enable prefix scans over a kind or an event subject.
//!
//! `StateStore` implements every collaborator contract from `dbgrid-core`
//! (`ObjectStore`, `StatusWriter`, `EventRecorder`, `TenantProvisioner`),
//! so a standalone controller needs nothing else.

mod contracts;
pub mod store;
pub mod tables;

pub use store::StateStore;
