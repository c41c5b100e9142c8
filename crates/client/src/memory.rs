// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process [`ExecutionService`] for tests and dry runs.
//!
//! Tasks live in memory and never run by themselves; the owner scripts what
//! the service reports next: progress snapshots, completion, results that
//! lag behind, an unreachable network. Every call is counted.

use crate::service::ExecutionService;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use llm_evalbench_core::{
    ProgressSnapshot, RawResultSet, TaskId, TaskStatus, TestTask, ValidatedSpec,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;

/// Calls counted by [`InMemoryExecutionService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCall {
    /// `create_task`
    Create,
    /// `start_task`
    Start,
    /// `stop_task`
    Stop,
    /// `retry_task`
    Retry,
    /// `delete_task`
    Delete,
    /// `list_tasks`
    List,
    /// `get_task`
    Get,
    /// `task_progress`
    Progress,
    /// `task_results`
    Results,
}

#[derive(Debug, Default)]
struct State {
    tasks: BTreeMap<TaskId, TestTask>,
    progress: HashMap<TaskId, VecDeque<ProgressSnapshot>>,
    results: HashMap<TaskId, RawResultSet>,
    results_lag: HashMap<TaskId, u32>,
    failures_left: u32,
    calls: HashMap<ServiceCall, usize>,
}

impl State {
    fn record(&mut self, call: ServiceCall) -> Result<()> {
        *self.calls.entry(call).or_insert(0) += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(Error::transient("execution service unreachable"));
        }
        Ok(())
    }

    fn task_mut(&mut self, id: &TaskId) -> Result<&mut TestTask> {
        self.tasks.get_mut(id).ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &TaskId) -> Error {
    Error::Rejected {
        status: 404,
        message: format!("Test task {} not found", id),
    }
}

fn conflict(task: &TestTask, action: &str) -> Error {
    Error::Rejected {
        status: 400,
        message: format!("Cannot {} task {} in status {}", action, task.id, task.status),
    }
}

/// Scriptable in-memory execution service.
#[derive(Debug, Default)]
pub struct InMemoryExecutionService {
    state: Mutex<State>,
}

impl InMemoryExecutionService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue progress snapshots served by successive progress calls. Once
    /// the queue runs dry the last snapshot keeps being served.
    pub async fn push_progress(
        &self,
        id: &TaskId,
        snapshots: impl IntoIterator<Item = ProgressSnapshot>,
    ) {
        let mut state = self.state.lock().await;
        state.progress.entry(id.clone()).or_default().extend(snapshots);
    }

    /// Move a task to a terminal status on the service side.
    pub async fn finish(&self, id: &TaskId, status: TaskStatus, error_message: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        task.transition(status, Utc::now())?;
        task.error_message = error_message;
        Ok(())
    }

    /// Results served once the task is terminal.
    pub async fn set_results(&self, results: RawResultSet) {
        let mut state = self.state.lock().await;
        state.results.insert(results.task_id.clone(), results);
    }

    /// Answer the next `attempts` results calls for `id` with "not ready".
    pub async fn delay_results(&self, id: &TaskId, attempts: u32) {
        let mut state = self.state.lock().await;
        state.results_lag.insert(id.clone(), attempts);
    }

    /// Fail the next `calls` calls of any kind with a transient error.
    pub async fn fail_next(&self, calls: u32) {
        self.state.lock().await.failures_left = calls;
    }

    /// Number of times `call` was made.
    pub async fn calls(&self, call: ServiceCall) -> usize {
        self.state.lock().await.calls.get(&call).copied().unwrap_or(0)
    }

    /// Current record of a task, as the service sees it.
    pub async fn task(&self, id: &TaskId) -> Option<TestTask> {
        self.state.lock().await.tasks.get(id).cloned()
    }
}

#[async_trait]
impl ExecutionService for InMemoryExecutionService {
    async fn create_task(&self, spec: &ValidatedSpec) -> Result<TestTask> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Create)?;
        let task = TestTask::from_spec(TaskId::generate(), spec.clone(), Utc::now());
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn start_task(&self, id: &TaskId) -> Result<Option<TestTask>> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Start)?;
        let task = state.task_mut(id)?;
        if task.status != TaskStatus::Pending {
            return Err(conflict(task, "start"));
        }
        task.transition(TaskStatus::Running, Utc::now())?;
        Ok(Some(task.clone()))
    }

    async fn stop_task(&self, id: &TaskId) -> Result<Option<TestTask>> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Stop)?;
        let task = state.task_mut(id)?;
        if task.is_terminal() {
            return Err(conflict(task, "stop"));
        }
        // Acknowledged only; the stop shows up on the next read.
        task.transition(TaskStatus::Cancelled, Utc::now())?;
        Ok(None)
    }

    async fn retry_task(&self, id: &TaskId) -> Result<Option<TestTask>> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Retry)?;
        let task = state.task_mut(id)?;
        if !matches!(task.status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return Err(conflict(task, "retry"));
        }
        task.transition(TaskStatus::Pending, Utc::now())?;
        let task = task.clone();
        state.progress.remove(id);
        state.results.remove(id);
        Ok(Some(task))
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Delete)?;
        state.tasks.remove(id).ok_or_else(|| not_found(id))?;
        state.progress.remove(id);
        state.results.remove(id);
        Ok(())
    }

    async fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TestTask>> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::List)?;
        Ok(state
            .tasks
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: &TaskId) -> Result<TestTask> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Get)?;
        state.tasks.get(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn task_progress(&self, id: &TaskId) -> Result<ProgressSnapshot> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Progress)?;
        if !state.tasks.contains_key(id) {
            return Err(not_found(id));
        }
        let queue = state.progress.entry(id.clone()).or_default();
        let snapshot = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        state.task_mut(id)?.progress = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn task_results(&self, id: &TaskId) -> Result<RawResultSet> {
        let mut state = self.state.lock().await;
        state.record(ServiceCall::Results)?;
        let task = state.tasks.get(id).ok_or_else(|| not_found(id))?;
        if !task.is_terminal() {
            return Err(conflict(task, "read results of"));
        }
        if let Some(lag) = state.results_lag.get_mut(id) {
            if *lag > 0 {
                *lag -= 1;
                return Err(Error::not_ready(id));
            }
        }
        state
            .results
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_ready(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ValidatedSpec {
        llm_evalbench_core::TaskSpec::new("nightly", "elecbench", ["m-a"])
            .validate()
            .unwrap()
    }

    #[tokio::test]
    async fn test_progress_queue_repeats_last_snapshot() {
        let svc = InMemoryExecutionService::new();
        let task = svc.create_task(&spec()).await.unwrap();
        svc.push_progress(
            &task.id,
            [ProgressSnapshot::new(10, 3, 0), ProgressSnapshot::new(10, 6, 0)],
        )
        .await;

        assert_eq!(svc.task_progress(&task.id).await.unwrap().completed_cases, 3);
        assert_eq!(svc.task_progress(&task.id).await.unwrap().completed_cases, 6);
        assert_eq!(svc.task_progress(&task.id).await.unwrap().completed_cases, 6);
        assert_eq!(svc.calls(ServiceCall::Progress).await, 3);
    }

    #[tokio::test]
    async fn test_results_lag_then_arrive() {
        let svc = InMemoryExecutionService::new();
        let task = svc.create_task(&spec()).await.unwrap();
        svc.start_task(&task.id).await.unwrap();
        svc.finish(&task.id, TaskStatus::Completed, None).await.unwrap();
        svc.set_results(RawResultSet::empty(task.id.clone())).await;
        svc.delay_results(&task.id, 1).await;

        assert!(svc.task_results(&task.id).await.unwrap_err().is_results_not_ready());
        assert!(svc.task_results(&task.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_next_is_transient() {
        let svc = InMemoryExecutionService::new();
        svc.fail_next(1).await;
        assert!(svc.list_tasks(None).await.unwrap_err().is_retryable());
        assert!(svc.list_tasks(None).await.unwrap().is_empty());
    }
}
