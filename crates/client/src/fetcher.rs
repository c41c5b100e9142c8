// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result retrieval for finished tasks.
//!
//! Results often lag a little behind the terminal status. "Not ready yet"
//! is retried with exponential backoff; every other failure is returned
//! at once. Asking for the results of a task that has not finished is a
//! caller bug and fails before any request is made.

use crate::config::ClientConfig;
use crate::controller::TaskController;
use crate::service::ExecutionService;
use crate::{Error, Result};
use backon::{ExponentialBuilder, Retryable};
use llm_evalbench_core::report::{aggregate_with, AggregationOptions, Report};
use llm_evalbench_core::{Error as CoreError, RawResultSet, TaskId, TaskRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const FETCH_ATTEMPTS_METRIC: &str = "evalbench_result_fetch_attempts_total";

/// Fetches raw results and attaches them to the repository.
#[derive(Clone)]
pub struct ResultFetcher {
    repository: Arc<TaskRepository>,
    service: Arc<dyn ExecutionService>,
    backoff: ExponentialBuilder,
}

impl std::fmt::Debug for ResultFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFetcher")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ResultFetcher {
    /// Create a fetcher with the default backoff.
    pub fn new(repository: Arc<TaskRepository>, service: Arc<dyn ExecutionService>) -> Self {
        Self {
            repository,
            service,
            backoff: ClientConfig::default().results_backoff(),
        }
    }

    /// Create a fetcher sharing a controller's repository and service.
    pub fn from_controller(controller: &TaskController) -> Self {
        Self::new(controller.repository().clone(), controller.service().clone())
    }

    /// Replace the backoff used while results are not ready.
    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetch the results of a terminal task and attach them, replacing any
    /// earlier set.
    pub async fn fetch_results(&self, task_id: &TaskId) -> Result<RawResultSet> {
        match self.repository.status_of(task_id) {
            Some(status) if status.is_terminal() => {}
            status => {
                let reason = match status {
                    Some(s) => format!("task {} is {}; results exist only for finished tasks", task_id, s),
                    None => format!("task {} is not known locally", task_id),
                };
                error!(task_id = %task_id, status = ?status, "Result fetch requested for an unfinished task");
                return Err(CoreError::precondition(reason).into());
            }
        }

        let results = (|| async { self.fetch_once(task_id).await })
            .retry(self.backoff)
            .sleep(tokio::time::sleep)
            .when(Error::is_results_not_ready)
            .notify(|_: &Error, delay: Duration| {
                debug!(task_id = %task_id, delay_ms = delay.as_millis() as u64, "Results not ready; retrying");
            })
            .await?;

        self.repository.attach_results(task_id, results.clone())?;
        info!(task_id = %task_id, models = results.model_results.len(), "Results fetched");
        Ok(results)
    }

    /// Fetch results and aggregate them into a report.
    pub async fn fetch_report(&self, task_id: &TaskId, options: AggregationOptions) -> Result<Report> {
        let results = self.fetch_results(task_id).await?;
        let task = self
            .repository
            .get(task_id)
            .ok_or_else(|| CoreError::NotFound(task_id.clone()))?;
        Ok(aggregate_with(&task, &results, options))
    }

    async fn fetch_once(&self, task_id: &TaskId) -> Result<RawResultSet> {
        let outcome = self.service.task_results(task_id).await;
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) if e.is_results_not_ready() => "not_ready",
            Err(_) => "error",
        };
        metrics::counter!(FETCH_ATTEMPTS_METRIC, "outcome" => label).increment(1);
        outcome
    }
}
