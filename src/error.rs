//! Canonical error types.
//!
//! Errors are split by recoverability: [`ParentError`] covers conditions a
//! caller can reasonably retry or route around, while [`FatalError`] marks
//! conditions this crate considers the host task itself should not try to
//! recover from (a budget has been exhausted, the crate has been misused).

use std::time::Duration;

use thiserror::Error;

use crate::child::ChildHandle;

/// Failure while invoking a [`StartSpec`](crate::child::StartSpec).
#[derive(Debug, Clone, Error)]
#[error("failed to start child: {reason}")]
pub struct SpawnError {
    pub reason: String,
}

impl SpawnError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Recoverable errors returned from ordinary [`Parent`](crate::parent::Parent)
/// operations.
#[derive(Debug, Clone, Error)]
pub enum ParentError {
    #[error("no child registered under id or handle {0}")]
    UnknownChild(String),

    #[error("a child is already registered under id {id} (handle {existing})")]
    AlreadyStarted { id: String, existing: ChildHandle },

    #[error(transparent)]
    SpawnFailed(#[from] SpawnError),

    #[error("child {0} does not belong to shutdown-group {1}")]
    NotInGroup(String, String),

    /// A misuse or budget-exhaustion condition this crate never recovers
    /// from internally. Surfaced through the ordinary `Result` return type
    /// rather than a panic (see [`FatalError`]) so the host decides how its
    /// own task dies.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl ParentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownChild(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SpawnFailed(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Errors this crate treats as unrecoverable for the enclosing parent.
#[derive(Debug, Clone, Error)]
pub enum FatalError {
    #[error("restart budget exhausted: {restart_count} restarts within {window:?}")]
    TooManyRestarts {
        restart_count: u32,
        window: Duration,
    },

    #[error("invalid use of parentcore: {0}")]
    Misuse(String),
}

impl FatalError {
    pub fn is_fatal(&self) -> bool {
        true
    }

    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn is_not_found(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_child_is_not_found() {
        let err = ParentError::UnknownChild("worker-1".to_string());
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn spawn_failed_is_retryable() {
        let err = ParentError::SpawnFailed(SpawnError::new("boom"));
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn fatal_errors_are_fatal() {
        let err = FatalError::TooManyRestarts {
            restart_count: 5,
            window: Duration::from_secs(5),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn parent_error_wraps_fatal_errors() {
        let err: ParentError = FatalError::Misuse("double initialize".to_string()).into();
        assert!(err.is_fatal());
        assert!(!err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn already_started_reports_existing_handle() {
        let existing = crate::child::ChildHandle::next();
        let err = ParentError::AlreadyStarted {
            id: "worker-1".to_string(),
            existing,
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("worker-1"));
    }
}
