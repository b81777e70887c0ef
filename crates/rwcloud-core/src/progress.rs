//! Progress reporting for await-flows
//!
//! The orchestrator emits a [`ProgressEvent`] when a flow starts, on every
//! poll observation, and when it finishes. Presentation layers can hook a
//! callback in to drive spinners; everything else can ignore it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Progress events emitted during await-flows
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The mutation call was accepted and waiting has begun
    Started { operation: String, resource: String },
    /// One poll observation
    Polling {
        operation: String,
        status: String,
        elapsed: Duration,
    },
    /// The resource reached its terminal state
    Completed { operation: String, resource: String },
    /// The flow failed
    Failed { operation: String, error: String },
}

/// Callback type for progress updates
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Optional progress sink carried by the client
#[derive(Clone, Default)]
pub struct Progress(Option<ProgressCallback>);

impl Progress {
    pub fn new(callback: ProgressCallback) -> Self {
        Self(Some(callback))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.0 {
            cb(event);
        }
    }

    pub(crate) fn started(&self, operation: &str, resource: impl fmt::Display) {
        self.emit(ProgressEvent::Started {
            operation: operation.to_string(),
            resource: resource.to_string(),
        });
    }

    pub(crate) fn polling(&self, operation: &str, status: impl fmt::Display, elapsed: Duration) {
        self.emit(ProgressEvent::Polling {
            operation: operation.to_string(),
            status: status.to_string(),
            elapsed,
        });
    }

    pub(crate) fn completed(&self, operation: &str, resource: impl fmt::Display) {
        self.emit(ProgressEvent::Completed {
            operation: operation.to_string(),
            resource: resource.to_string(),
        });
    }

    pub(crate) fn failed(&self, operation: &str, error: impl fmt::Display) {
        self.emit(ProgressEvent::Failed {
            operation: operation.to_string(),
            error: error.to_string(),
        });
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Progress")
            .field(&self.0.as_ref().map(|_| "callback"))
            .finish()
    }
}
