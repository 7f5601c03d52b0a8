//! Step outcomes and the directive handed back to the caller.

use std::time::Duration;

use crate::error::ReconcileError;

/// Ask the caller to run another pass after `after`.
#[derive(Debug)]
pub struct Requeue {
    pub after: Duration,
    pub error: Option<ReconcileError>,
}

impl Requeue {
    /// An expected wait: nothing went wrong, the world is not ready yet.
    pub fn after(after: Duration) -> Self {
        Self { after, error: None }
    }

    pub fn with_error(after: Duration, error: ReconcileError) -> Self {
        Self {
            after,
            error: Some(error),
        }
    }
}

/// Result of a single pipeline step.
#[derive(Debug)]
pub enum Flow {
    Continue,
    Halt(Requeue),
}

impl Flow {
    pub fn halt(after: Duration) -> Self {
        Flow::Halt(Requeue::after(after))
    }

    pub fn fail(after: Duration, error: ReconcileError) -> Self {
        Flow::Halt(Requeue::with_error(after, error))
    }
}

/// Result of a reconcile pass.
#[derive(Debug)]
pub enum Directive {
    /// Fully converged; no requeue requested.
    Converged,
    Requeue(Requeue),
}

impl Directive {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Directive::Converged => None,
            Directive::Requeue(r) => Some(r.after),
        }
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        match self {
            Directive::Converged => None,
            Directive::Requeue(r) => r.error.as_ref(),
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Directive::Converged)
    }
}

impl From<Requeue> for Directive {
    fn from(requeue: Requeue) -> Self {
        Directive::Requeue(requeue)
    }
}
