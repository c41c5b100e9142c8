// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core of LLM EvalBench: test-task lifecycle and result aggregation.
//!
//! A *test task* runs one benchmark against several AI models on an
//! external execution service. This crate owns the parts that need real
//! design and no I/O:
//!
//! - [`task`] - task types and the status state machine
//! - [`progress`] - progress snapshots of running tasks
//! - [`result`] - the raw per-model, per-case result contract
//! - [`repository`] - the local task store with change notifications
//! - [`registry`] - configured model providers and benchmarks
//! - [`report`] - the deterministic aggregation engine
//!
//! Talking to the execution service, polling and fetching live in
//! `llm-evalbench-client`.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod error;
pub mod progress;
pub mod registry;
pub mod report;
pub mod repository;
pub mod result;
pub mod task;

pub use error::{Error, Result};
pub use progress::{CurrentModel, ProgressSnapshot};
pub use registry::{AiModel, Benchmark, BenchmarkRegistry, ModelProvider, ProviderRegistry};
pub use report::{aggregate, aggregate_with, AggregationOptions, Report};
pub use repository::{RepositoryEvent, TaskRepository, TaskStatistics};
pub use result::{CaseResult, ModelResult, RawResultSet};
pub use task::{TaskConfig, TaskId, TaskSpec, TaskStatus, TestTask, ValidatedSpec};
