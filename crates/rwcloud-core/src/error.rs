//! Unified error handling for rwcloud-core
//!
//! Every failure surfaced by the orchestrator is a [`CoreError`]. Callers
//! branch on [`CoreError::kind`] (or the `is_*` helpers) rather than on the
//! message text, so "not found" and "timed out" stay distinguishable no
//! matter how much context has been layered on top.
//!
//! # Example
//!
//! ```rust
//! use rwcloud_core::{CoreError, ErrorKind};
//!
//! fn describe(err: &CoreError) -> &'static str {
//!     if err.is_not_found() {
//!         "gone"
//!     } else if err.is_timeout() {
//!         "still in progress remotely"
//!     } else {
//!         "failed"
//!     }
//! }
//!
//! let err = CoreError::ClusterNotFound("us-east-1/foo".to_string());
//! assert_eq!(err.kind(), ErrorKind::ClusterNotFound);
//! assert_eq!(describe(&err), "gone");
//! ```

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::model::{ClusterStatus, HealthStatus, PrivateLink};

/// Stable discriminant for [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    UnexpectedStatus,
    ClusterNotFound,
    ClusterUserNotFound,
    PrivateLinkNotFound,
    ManagedClusterNotFound,
    RegionNotFound,
    InvalidCredential,
    WaitTimeout,
    Cancelled,
    ResourceFailed,
    ImmutableField,
    ComponentResolution,
    Validation,
    Config,
}

/// Core error type for all orchestrator operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Network or HTTP failure while talking to the control plane
    #[error("failed to call API to {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The control plane answered with a status code the call did not expect
    #[error(
        "unexpected status code while trying to {operation}: expected {}, got {actual}{}",
        join_statuses(.expected),
        fmt_message(.message)
    )]
    UnexpectedStatus {
        operation: String,
        expected: Vec<StatusCode>,
        actual: StatusCode,
        message: String,
    },

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("cluster user not found: {0}")]
    ClusterUserNotFound(String),

    #[error("private link not found: {0}")]
    PrivateLinkNotFound(String),

    /// Platform-managed cluster backing a BYOC environment is missing
    #[error("managed cluster not found: {0}")]
    ManagedClusterNotFound(String),

    #[error("region {0} is not found")]
    RegionNotFound(String),

    #[error("invalid credential")]
    InvalidCredential,

    /// A poll exceeded its timeout budget; the operation may still be in
    /// progress on the control plane
    #[error(
        "timeout while waiting{} after {timeout:?}{}",
        fmt_waiting_for(.waiting_for),
        fmt_observed(.last_observed)
    )]
    WaitTimeout {
        timeout: Duration,
        waiting_for: Option<String>,
        last_observed: Option<Observed>,
    },

    /// The caller cancelled the wait
    #[error("operation cancelled while waiting")]
    Cancelled,

    /// The resource entered a terminal failure state while being waited on
    #[error("{0}")]
    ResourceFailed(String),

    /// Every immutable field the caller tried to change, collected in one pass
    #[error("cannot update immutable fields: {}", join_display(.0))]
    ImmutableFields(Vec<ImmutableFieldError>),

    #[error(transparent)]
    ComponentResolution(#[from] ComponentResolutionError),

    /// A reconciliation step failed; earlier steps stay applied
    #[error("failed to {step}: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Last state observed by a wait loop before it gave up
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Cluster {
        status: ClusterStatus,
        health: HealthStatus,
    },
    PrivateLink(Box<PrivateLink>),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Cluster { status, health } => {
                write!(f, "cluster status {status}, health {health}")
            }
            Observed::PrivateLink(link) => {
                write!(f, "private link {} status {}", link.id, link.status)
            }
        }
    }
}

/// Attribute that may not change once a cluster exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmutableField {
    Name,
    Region,
    MetaStoreResource,
    ComputeFileCacheEnabled,
    ComputeFileCacheSize,
    MetaStoreVolumeSize,
}

impl fmt::Display for ImmutableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImmutableField::Name => "cluster name",
            ImmutableField::Region => "region",
            ImmutableField::MetaStoreResource => "meta store resource",
            ImmutableField::ComputeFileCacheEnabled => "compute file cache",
            ImmutableField::ComputeFileCacheSize => "compute file cache size",
            ImmutableField::MetaStoreVolumeSize => "meta store volume size",
        };
        f.write_str(name)
    }
}

/// One rejected change to an immutable attribute
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} cannot be changed (from {previous} to {desired})")]
pub struct ImmutableFieldError {
    pub field: ImmutableField,
    pub previous: String,
    pub desired: String,
}

/// Failure to map a requested (cpu, memory, replica) onto a component type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentResolutionError {
    #[error(
        "the {component} component type with CPU {cpu} and memory {memory} is not available for the tier {tier}, available: [{}]",
        .available.join(", ")
    )]
    NoMatch {
        component: String,
        tier: String,
        cpu: String,
        memory: String,
        available: Vec<String>,
    },

    #[error(
        "the {component} component type {component_type_id} allows at most {maximum} replicas, requested {requested}"
    )]
    ReplicaExceeded {
        component: String,
        component_type_id: String,
        requested: u32,
        maximum: u32,
    },

    #[error("tier {0} not found")]
    UnknownTier(String),

    #[error("component {0} not found")]
    UnknownComponent(String),
}

impl CoreError {
    /// Stable discriminant of this error.
    ///
    /// [`CoreError::StepFailed`] only adds context, so it reports the kind of
    /// the step's underlying failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Transport { .. } => ErrorKind::Transport,
            CoreError::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            CoreError::ClusterNotFound(_) => ErrorKind::ClusterNotFound,
            CoreError::ClusterUserNotFound(_) => ErrorKind::ClusterUserNotFound,
            CoreError::PrivateLinkNotFound(_) => ErrorKind::PrivateLinkNotFound,
            CoreError::ManagedClusterNotFound(_) => ErrorKind::ManagedClusterNotFound,
            CoreError::RegionNotFound(_) => ErrorKind::RegionNotFound,
            CoreError::InvalidCredential => ErrorKind::InvalidCredential,
            CoreError::WaitTimeout { .. } => ErrorKind::WaitTimeout,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::ResourceFailed(_) => ErrorKind::ResourceFailed,
            CoreError::ImmutableFields(_) => ErrorKind::ImmutableField,
            CoreError::ComponentResolution(_) => ErrorKind::ComponentResolution,
            CoreError::StepFailed { source, .. } => source.kind(),
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true for any of the per-resource "not found" kinds
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ClusterNotFound
                | ErrorKind::ClusterUserNotFound
                | ErrorKind::PrivateLinkNotFound
                | ErrorKind::ManagedClusterNotFound
        )
    }

    /// Returns true if a wait loop ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::WaitTimeout
    }

    /// Returns true if the caller cancelled the operation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true if the credentials were rejected
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match self {
            CoreError::InvalidCredential => true,
            CoreError::UnexpectedStatus { actual, .. } => {
                *actual == StatusCode::UNAUTHORIZED || *actual == StatusCode::FORBIDDEN
            }
            CoreError::StepFailed { source, .. } => source.is_unauthorized(),
            _ => false,
        }
    }

    /// Returns true for errors caused by the caller's input
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ImmutableField | ErrorKind::ComponentResolution | ErrorKind::Validation
        )
    }

    /// Wrap this error with the reconciliation step that produced it
    #[must_use]
    pub fn in_step(self, step: impl Into<String>) -> Self {
        CoreError::StepFailed {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Attach wait context to a [`CoreError::WaitTimeout`]; other errors pass
    /// through unchanged
    #[must_use]
    pub fn with_wait_context(
        self,
        what: impl Into<String>,
        observed: Option<Observed>,
    ) -> Self {
        match self {
            CoreError::WaitTimeout { timeout, .. } => CoreError::WaitTimeout {
                timeout,
                waiting_for: Some(what.into()),
                last_observed: observed,
            },
            other => other,
        }
    }

    /// The last observed private link, if a private-link wait timed out
    #[must_use]
    pub fn last_observed_private_link(&self) -> Option<&PrivateLink> {
        match self {
            CoreError::WaitTimeout {
                last_observed: Some(Observed::PrivateLink(link)),
                ..
            } => Some(link),
            CoreError::StepFailed { source, .. } => source.last_observed_private_link(),
            _ => None,
        }
    }
}

fn join_statuses(statuses: &[StatusCode]) -> String {
    statuses
        .iter()
        .map(|s| s.as_u16().to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn fmt_message(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(", message: {message}")
    }
}

fn fmt_waiting_for(what: &Option<String>) -> String {
    what.as_ref().map(|w| format!(" for {w}")).unwrap_or_default()
}

fn fmt_observed(observed: &Option<Observed>) -> String {
    observed
        .as_ref()
        .map(|o| format!(", last observed {o}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        for err in [
            CoreError::ClusterNotFound("a".into()),
            CoreError::ClusterUserNotFound("b".into()),
            CoreError::PrivateLinkNotFound("c".into()),
            CoreError::ManagedClusterNotFound("d".into()),
        ] {
            assert!(err.is_not_found(), "{err}");
            assert!(!err.is_timeout());
        }
        assert!(!CoreError::RegionNotFound("x".into()).is_not_found());
    }

    #[test]
    fn test_step_failed_reports_inner_kind() {
        let err = CoreError::WaitTimeout {
            timeout: Duration::from_secs(60),
            waiting_for: None,
            last_observed: None,
        }
        .in_step("update cluster version");

        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("failed to update cluster version"));
    }

    #[test]
    fn test_wait_context_only_touches_timeouts() {
        let timeout = CoreError::WaitTimeout {
            timeout: Duration::from_secs(5),
            waiting_for: None,
            last_observed: None,
        }
        .with_wait_context(
            "cluster to be running",
            Some(Observed::Cluster {
                status: ClusterStatus::Creating,
                health: HealthStatus::Unknown,
            }),
        );
        let msg = timeout.to_string();
        assert!(msg.contains("for cluster to be running"));
        assert!(msg.contains("last observed cluster status Creating"));

        let cancelled = CoreError::Cancelled.with_wait_context("anything", None);
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn test_unexpected_status_display() {
        let err = CoreError::UnexpectedStatus {
            operation: "create cluster".to_string(),
            expected: vec![StatusCode::ACCEPTED],
            actual: StatusCode::BAD_REQUEST,
            message: "name taken".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 202"));
        assert!(msg.contains("400"));
        assert!(msg.contains("name taken"));
        assert!(!err.is_bad_request());
    }

    #[test]
    fn test_immutable_fields_lists_all() {
        let err = CoreError::ImmutableFields(vec![
            ImmutableFieldError {
                field: ImmutableField::Region,
                previous: "us-east-1".into(),
                desired: "eu-west-1".into(),
            },
            ImmutableFieldError {
                field: ImmutableField::MetaStoreResource,
                previous: "p-1c4g x1".into(),
                desired: "p-2c8g x1".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("region cannot be changed"));
        assert!(msg.contains("meta store resource cannot be changed"));
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_unauthorized() {
        assert!(CoreError::InvalidCredential.is_unauthorized());
        let err = CoreError::UnexpectedStatus {
            operation: "list regions".into(),
            expected: vec![StatusCode::OK],
            actual: StatusCode::FORBIDDEN,
            message: String::new(),
        };
        assert!(err.is_unauthorized());
    }
}
