// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client error type.
//!
//! Wraps the core taxonomy and adds the failures that only exist once a
//! network and a configuration file are involved.

use llm_evalbench_core::{Error as CoreError, TaskId};
use thiserror::Error;

/// Errors produced by the client.
#[derive(Debug, Error)]
pub enum Error {
    /// A core error (validation, transition, transient fetch, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The execution service refused the request with a client error.
    #[error("Execution service rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message returned by the service.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("Failed to decode service response: {0}")]
    Decode(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure may go away on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_retryable())
    }

    /// Whether results were requested before the service had them.
    pub fn is_results_not_ready(&self) -> bool {
        matches!(self, Self::Core(CoreError::ResultsNotReady(_)))
    }

    /// Whether the error only reports a no-op, such as stopping a finished
    /// task.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_informational())
    }

    pub(crate) fn transient(msg: impl Into<String>) -> Self {
        Self::Core(CoreError::transient(msg))
    }

    pub(crate) fn not_ready(task_id: &TaskId) -> Self {
        Self::Core(CoreError::ResultsNotReady(task_id.clone()))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::transient("connection refused").is_retryable());
        assert!(Error::not_ready(&TaskId::new("t-1")).is_results_not_ready());
        assert!(!Error::Decode("eof".into()).is_retryable());

        let rejected = Error::Rejected {
            status: 409,
            message: "task already running".into(),
        };
        assert!(!rejected.is_retryable());
        assert_eq!(
            rejected.to_string(),
            "Execution service rejected the request (409): task already running"
        );
    }
}
