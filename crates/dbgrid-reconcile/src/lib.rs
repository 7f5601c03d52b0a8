//! dbgrid-reconcile: the Database reconciliation pipeline.
//!
//! A single call to [`Reconciler::reconcile`] is one level-triggered pass:
//! it reads current state through the collaborator traits, takes at most
//! one mutating action, and returns a [`Directive`] telling the caller
//! when to come back.
//!
//! # Pipeline
//!
//! ```text
//! load aggregate ──▶ wait_for_storage ──▶ sync_resources ──▶ wait_for_scale
//!                                                                 │
//!                       (TenantInitialized != True) ◀─────────────┘
//!                                 │
//!                      init_status ──▶ create_tenant
//! ```
//!
//! Every step returns [`Flow::Continue`] or [`Flow::Halt`]; the first halt
//! ends the pass. Only `persist_status` writes status, always against a
//! freshly read object.

pub mod aggregate;
pub mod builder;
pub mod error;
pub mod flow;
pub mod reconciler;
mod steps;

pub use aggregate::{
    DatabaseAggregate, REASON_COMPLETED, REASON_IN_PROGRESS, TENANT_INITIALIZED, tenant_path,
};
pub use builder::{BuilderCatalog, ResourceBuilder};
pub use error::{ErrorClass, ReconcileError};
pub use flow::{Directive, Flow, Requeue};
pub use reconciler::{Collaborators, Reconciler, ReconcilerConfig};
