// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Task lifecycle operations.
//!
//! Every command follows the same shape: check the transition against the
//! local repository, forward it to the execution service, then merge the
//! service's answer. A rejected check issues no request.

use crate::service::ExecutionService;
use crate::Result;
use chrono::Utc;
use llm_evalbench_core::{
    BenchmarkRegistry, Error as CoreError, ProviderRegistry, TaskId, TaskRepository, TaskSpec,
    TaskStatus, TestTask, ValidatedSpec,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Combines the task repository with the execution service.
#[derive(Clone)]
pub struct TaskController {
    repository: Arc<TaskRepository>,
    service: Arc<dyn ExecutionService>,
}

impl std::fmt::Debug for TaskController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskController")
            .field("tasks", &self.repository.len())
            .finish_non_exhaustive()
    }
}

impl TaskController {
    /// Create a controller.
    pub fn new(repository: Arc<TaskRepository>, service: Arc<dyn ExecutionService>) -> Self {
        Self {
            repository,
            service,
        }
    }

    /// The repository this controller mutates.
    pub fn repository(&self) -> &Arc<TaskRepository> {
        &self.repository
    }

    /// The execution service this controller talks to.
    pub fn service(&self) -> &Arc<dyn ExecutionService> {
        &self.service
    }

    /// Validate a spec and submit it. Nothing is sent when validation fails.
    pub async fn create(&self, spec: &TaskSpec) -> Result<TestTask> {
        let validated = spec.validate()?;
        self.submit(validated).await
    }

    /// Like [`Self::create`], additionally checking that the benchmark and
    /// every model exist and are active.
    pub async fn create_checked(
        &self,
        spec: &TaskSpec,
        providers: &ProviderRegistry,
        benchmarks: &BenchmarkRegistry,
    ) -> Result<TestTask> {
        let validated = spec.validate_against(providers, benchmarks)?;
        self.submit(validated).await
    }

    async fn submit(&self, spec: ValidatedSpec) -> Result<TestTask> {
        let task = self.service.create_task(&spec).await?;
        self.repository.insert_created(task.clone())?;
        info!(
            task_id = %task.id,
            benchmark = %task.benchmark_id,
            models = task.model_ids.len(),
            "Test task submitted"
        );
        Ok(task)
    }

    /// Start a pending task.
    pub async fn start(&self, id: &TaskId) -> Result<TestTask> {
        self.repository.check_start(id)?;
        let task = match self.service.start_task(id).await? {
            Some(record) => self.repository.apply_authoritative(record),
            None => self.repository.transition(id, TaskStatus::Running, Utc::now())?,
        };
        Ok(task)
    }

    /// Ask the service to stop a task.
    ///
    /// The task keeps its status, flagged as cancel-requested, until the
    /// service reports it terminal. If the task finishes first, the finished
    /// status stands.
    pub async fn cancel(&self, id: &TaskId) -> Result<TestTask> {
        if let Err(e) = self.repository.check_cancel(id) {
            if e.is_informational() {
                info!(task_id = %id, "Task already finished; nothing to stop");
            }
            return Err(e.into());
        }

        match self.service.stop_task(id).await? {
            Some(record) if record.is_terminal() => {
                return Ok(self.repository.apply_authoritative(record));
            }
            _ => match self.repository.mark_cancel_requested(id) {
                Ok(()) => {}
                // Finished while the request was in flight.
                Err(CoreError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            },
        }
        self.repository
            .get(id)
            .ok_or_else(|| CoreError::NotFound(id.clone()).into())
    }

    /// Alias of [`Self::cancel`].
    pub async fn stop(&self, id: &TaskId) -> Result<TestTask> {
        self.cancel(id).await
    }

    /// Delete a finished task along with its progress and results.
    pub async fn delete(&self, id: &TaskId) -> Result<TestTask> {
        self.repository.check_delete(id)?;
        self.service.delete_task(id).await?;
        Ok(self.repository.remove(id)?)
    }

    /// Put a failed or cancelled task back to `pending`.
    pub async fn retry(&self, id: &TaskId) -> Result<TestTask> {
        self.repository.check_retry(id)?;
        let task = match self.service.retry_task(id).await? {
            Some(record) => {
                if record.status != TaskStatus::Pending {
                    warn!(task_id = %id, status = %record.status, "Retried task is not pending");
                }
                self.repository.apply_authoritative(record)
            }
            None => self.repository.transition(id, TaskStatus::Pending, Utc::now())?,
        };
        info!(task_id = %id, "Task queued for retry");
        Ok(task)
    }

    /// Re-synchronize the cached list with the service.
    ///
    /// Returns the cached tasks in scope after the refresh, newest first.
    pub async fn refresh_list(&self, filter: Option<TaskStatus>) -> Result<Vec<TestTask>> {
        let tasks = self.service.list_tasks(filter).await?;
        self.repository.replace_all(tasks, filter);
        Ok(match filter {
            Some(status) => self.repository.list_by_status(status),
            None => self.repository.list(),
        })
    }

    /// Fetch one task record and merge it.
    pub async fn refresh_task(&self, id: &TaskId) -> Result<TestTask> {
        let record = self.service.get_task(id).await?;
        Ok(self.repository.apply_authoritative(record))
    }
}
