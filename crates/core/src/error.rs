// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the test-task core.
//!
//! Errors fall into four behavioural classes:
//!
//! - **Validation** and **invalid transition** errors are local and
//!   immediate; they are never retried.
//! - **Transient fetch** and **results not ready** errors are absorbed by the
//!   poller and fetcher and retried.
//! - **Precondition** errors indicate a caller bug (for example fetching
//!   results of a running task).

use crate::task::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors produced by the core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A task spec (or other input) failed validation. No state was changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation was requested that the task's current status forbids.
    #[error("Invalid transition: cannot {action} task {task_id} in status {from}")]
    InvalidTransition {
        /// Task the operation targeted.
        task_id: TaskId,
        /// Status the task was in when the operation was requested.
        from: TaskStatus,
        /// Operation name (`start`, `cancel`, `delete`, ...).
        action: &'static str,
    },

    /// The execution service could not be reached or answered with a
    /// server-side failure.
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// Results for a terminal task are not available yet.
    #[error("Results for task {0} are not available yet")]
    ResultsNotReady(TaskId),

    /// The caller asked for something the task state does not allow.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The task is not known to the repository.
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// A progress snapshot violated `completed + failed <= total`.
    #[error("Invalid progress snapshot: {0}")]
    InvalidProgress(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a transient fetch error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientFetch(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(task_id: &TaskId, from: TaskStatus, action: &'static str) -> Self {
        Self::InvalidTransition {
            task_id: task_id.clone(),
            from,
            action,
        }
    }

    /// Whether the failure may go away on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetch(_) | Self::ResultsNotReady(_))
    }

    /// Whether the error is informational only (the caller asked for a
    /// no-op such as cancelling an already finished task).
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::transient("connection refused").is_retryable());
        assert!(Error::ResultsNotReady(TaskId::new("t-1")).is_retryable());
        assert!(!Error::validation("no models").is_retryable());
        assert!(!Error::precondition("running").is_retryable());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::invalid_transition(&TaskId::new("t-1"), TaskStatus::Completed, "start");
        assert!(err.is_informational());
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot start task t-1 in status completed"
        );
    }
}
