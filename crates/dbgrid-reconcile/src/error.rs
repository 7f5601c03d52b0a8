//! Reconcile error taxonomy.

use std::fmt;

use thiserror::Error;

use dbgrid_core::{ObjectKey, ProvisionError, ResourceConfigError, StoreError};

/// An error carried by a halting [`Requeue`](crate::Requeue).
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to get {kind} {key}: {source}")]
    Fetch {
        kind: String,
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error("failed to sync {kind} {key}: {source}")]
    Sync {
        kind: String,
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Configuration(#[from] ResourceConfigError),

    #[error("failed to create tenant {path}: {source}")]
    Provisioning {
        path: String,
        #[source]
        source: ProvisionError,
    },

    #[error("failed to update status of {key}: {source}")]
    StatusUpdate {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error("database {0} disappeared before its status could be written")]
    StatusTargetMissing(ObjectKey),
}

/// Coarse classification used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Fetch,
    Configuration,
    Build,
    Provisioning,
    Conflict,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Fetch => write!(f, "fetch"),
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::Build => write!(f, "build"),
            ErrorClass::Provisioning => write!(f, "provisioning"),
            ErrorClass::Conflict => write!(f, "conflict"),
        }
    }
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::Fetch { .. } => ErrorClass::Fetch,
            ReconcileError::Sync { source, .. } => match source {
                StoreError::Mutate(_) => ErrorClass::Build,
                StoreError::Conflict { .. } => ErrorClass::Conflict,
                _ => ErrorClass::Fetch,
            },
            ReconcileError::Configuration(_) => ErrorClass::Configuration,
            ReconcileError::Provisioning { .. } => ErrorClass::Provisioning,
            ReconcileError::StatusUpdate { source, .. } if source.is_conflict() => {
                ErrorClass::Conflict
            }
            ReconcileError::StatusUpdate { .. } | ReconcileError::StatusTargetMissing(_) => {
                ErrorClass::Fetch
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ObjectKey {
        ObjectKey::new("prod", "orders")
    }

    #[test]
    fn builder_failures_classify_as_build() {
        let err = ReconcileError::Sync {
            kind: "Workload".to_string(),
            key: key(),
            source: StoreError::Mutate(anyhow::anyhow!("replicas must be positive")),
        };
        assert_eq!(err.class(), ErrorClass::Build);
        assert!(err.to_string().contains("replicas must be positive"));
    }

    #[test]
    fn status_conflicts_classify_as_conflict() {
        let err = ReconcileError::StatusUpdate {
            key: key(),
            source: StoreError::Conflict {
                key: "Database/prod/orders".to_string(),
                expected: 3,
                stored: 4,
            },
        };
        assert_eq!(err.class(), ErrorClass::Conflict);

        let gone = ReconcileError::StatusTargetMissing(key());
        assert_eq!(gone.class(), ErrorClass::Fetch);
        assert_eq!(
            gone.to_string(),
            "database prod/orders disappeared before its status could be written"
        );
    }

    #[test]
    fn configuration_errors_pass_through() {
        let err = ReconcileError::from(ResourceConfigError::Missing);
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.to_string().starts_with("incorrect database resources configuration"));
    }

    #[test]
    fn provisioning_errors_name_the_tenant() {
        let err = ReconcileError::Provisioning {
            path: "/root/orders".to_string(),
            source: ProvisionError::Unavailable("connection refused".to_string()),
        };
        assert_eq!(err.class(), ErrorClass::Provisioning);
        assert_eq!(
            err.to_string(),
            "failed to create tenant /root/orders: provisioning service unavailable: connection refused"
        );
    }
}
