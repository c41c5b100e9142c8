// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Execution service client for LLM EvalBench.
//!
//! This crate connects the task repository in `llm-evalbench-core` to the
//! remote execution service that actually runs benchmark tasks:
//!
//! - [`service`] - the [`ExecutionService`] trait and its HTTP binding
//! - [`controller`] - lifecycle commands (create, start, stop, retry, delete)
//! - [`poller`] - background progress polling and list refresh
//! - [`fetcher`] - result retrieval with backoff
//! - [`config`] - layered client configuration
//! - [`memory`] - a scriptable in-process service
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use llm_evalbench_client::{ClientConfig, HttpExecutionService, ProgressPoller, TaskController};
//! use llm_evalbench_core::{TaskRepository, TaskSpec};
//!
//! # async fn example() -> llm_evalbench_client::Result<()> {
//! let config = ClientConfig::load(None)?;
//! let service = Arc::new(HttpExecutionService::new(&config)?);
//! let controller = TaskController::new(Arc::new(TaskRepository::new()), service);
//!
//! let task = controller
//!     .create(&TaskSpec::new("nightly", "elecbench", ["gpt-4o", "claude-3-5-sonnet"]))
//!     .await?;
//! controller.start(&task.id).await?;
//!
//! let handle = ProgressPoller::from_controller(&controller)
//!     .spawn(task.id.clone(), config.detail_poll_interval());
//! handle.finished().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod memory;
pub mod poller;
pub mod service;

pub use config::ClientConfig;
pub use controller::TaskController;
pub use error::{Error, Result};
pub use fetcher::ResultFetcher;
pub use memory::{InMemoryExecutionService, ServiceCall};
pub use poller::{ListRefresher, PollerHandle, ProgressPoller};
pub use service::{ExecutionService, HttpExecutionService};
