// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress polling for running tasks.
//!
//! A [`ProgressPoller`] spawns one background loop per watched task. Each
//! loop:
//!
//! - reads the task's status from the repository before every tick and
//!   exits once the task is no longer `running` (or was removed);
//! - per tick fetches a progress snapshot, merges it, then fetches the task
//!   record so the terminal transition is observed;
//! - is single-flight: a tick's requests finish before the next tick, and
//!   ticks missed meanwhile are skipped;
//! - never gives up on errors. After `max_transient_failures` consecutive
//!   failures it publishes [`RepositoryEvent::PollDegraded`] once, and
//!   [`RepositoryEvent::PollRecovered`] after the next success.
//!
//! Loops stop when their [`PollerHandle`] is stopped or dropped.
//!
//! [`ListRefresher`] keeps the whole cached list in sync the same way.

use crate::controller::TaskController;
use crate::service::ExecutionService;
use crate::Result;
use llm_evalbench_core::{
    Error as CoreError, ProgressSnapshot, RepositoryEvent, TaskId, TaskRepository, TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default consecutive failures before polling is reported as degraded.
pub const DEFAULT_MAX_TRANSIENT_FAILURES: u32 = 5;

const POLL_TICKS_METRIC: &str = "evalbench_poll_ticks_total";

/// Handle to a background polling loop.
///
/// Dropping the handle stops the loop.
#[derive(Debug)]
pub struct PollerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    fn new(token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            token,
            join: Some(join),
        }
    }

    /// Stop the loop. An in-flight tick is abandoned.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the loop exits on its own or after [`Self::stop`].
    pub async fn finished(mut self) {
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "Polling loop ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Polls progress of running tasks into a [`TaskRepository`].
#[derive(Clone)]
pub struct ProgressPoller {
    repository: Arc<TaskRepository>,
    service: Arc<dyn ExecutionService>,
    max_transient_failures: u32,
}

impl std::fmt::Debug for ProgressPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressPoller")
            .field("max_transient_failures", &self.max_transient_failures)
            .finish_non_exhaustive()
    }
}

impl ProgressPoller {
    /// Create a poller.
    pub fn new(repository: Arc<TaskRepository>, service: Arc<dyn ExecutionService>) -> Self {
        Self {
            repository,
            service,
            max_transient_failures: DEFAULT_MAX_TRANSIENT_FAILURES,
        }
    }

    /// Create a poller sharing a controller's repository and service.
    pub fn from_controller(controller: &TaskController) -> Self {
        Self::new(controller.repository().clone(), controller.service().clone())
    }

    /// Set the failure count that triggers the degraded notice.
    pub fn with_max_transient_failures(mut self, failures: u32) -> Self {
        self.max_transient_failures = failures.max(1);
        self
    }

    /// Fetch one progress snapshot and merge it.
    ///
    /// A snapshot that fails validation is returned as
    /// [`CoreError::InvalidProgress`] and the previous snapshot stays.
    pub async fn poll(&self, task_id: &TaskId) -> Result<ProgressSnapshot> {
        let snapshot = self.service.task_progress(task_id).await?;
        self.repository.merge_progress(task_id, snapshot.clone())?;
        Ok(snapshot)
    }

    /// Poll `task_id` every `interval` until it stops running.
    pub fn spawn(&self, task_id: TaskId, interval: Duration) -> PollerHandle {
        let token = CancellationToken::new();
        let poller = self.clone();
        let join = tokio::spawn(poller.run(task_id, interval, token.clone()));
        PollerHandle::new(token, join)
    }

    async fn run(self, task_id: TaskId, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures: u32 = 0;
        let mut degraded = false;

        debug!(task_id = %task_id, interval_ms = interval.as_millis() as u64, "Progress polling started");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.repository.status_of(&task_id) {
                Some(TaskStatus::Running) => {}
                status => {
                    debug!(task_id = %task_id, status = ?status, "Task not running; polling stops");
                    break;
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = self.tick(&task_id) => outcome,
            };

            match outcome {
                Ok(status) => {
                    metrics::counter!(POLL_TICKS_METRIC, "outcome" => "ok").increment(1);
                    if degraded {
                        info!(task_id = %task_id, "Progress polling recovered");
                        self.repository
                            .publish(RepositoryEvent::PollRecovered(task_id.clone()));
                        degraded = false;
                    }
                    failures = 0;
                    if status != Some(TaskStatus::Running) {
                        debug!(task_id = %task_id, status = ?status, "Task left running; polling stops");
                        break;
                    }
                }
                Err(e) => {
                    metrics::counter!(POLL_TICKS_METRIC, "outcome" => "error").increment(1);
                    failures = failures.saturating_add(1);
                    warn!(task_id = %task_id, consecutive_failures = failures, error = %e, "Progress poll failed");
                    if failures >= self.max_transient_failures && !degraded {
                        degraded = true;
                        self.repository.publish(RepositoryEvent::PollDegraded {
                            task_id: task_id.clone(),
                            consecutive_failures: failures,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        debug!(task_id = %task_id, "Progress polling stopped");
    }

    /// One tick. Returns the task's status afterwards, `None` if the task
    /// was removed locally meanwhile.
    async fn tick(&self, task_id: &TaskId) -> Result<Option<TaskStatus>> {
        let snapshot = self.service.task_progress(task_id).await?;
        match self.repository.merge_progress(task_id, snapshot) {
            Ok(()) => {}
            Err(CoreError::InvalidProgress(reason)) => {
                warn!(task_id = %task_id, reason = %reason, "Rejected progress snapshot");
            }
            // Status changed under us; the record below settles it.
            Err(CoreError::InvalidTransition { .. }) => {}
            Err(CoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let record = self.service.get_task(task_id).await?;
        if self.repository.status_of(task_id).is_none() {
            return Ok(None);
        }
        Ok(Some(self.repository.apply_authoritative(record).status))
    }
}

/// Periodically re-synchronizes the cached task list.
#[derive(Debug)]
pub struct ListRefresher;

impl ListRefresher {
    /// Refresh the list (optionally filtered by status) every `interval`
    /// until the handle is stopped.
    pub fn spawn(
        controller: TaskController,
        filter: Option<TaskStatus>,
        interval: Duration,
    ) -> PollerHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let outcome = tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    outcome = controller.refresh_list(filter) => outcome,
                };
                match outcome {
                    Ok(tasks) => {
                        metrics::counter!(POLL_TICKS_METRIC, "outcome" => "ok").increment(1);
                        debug!(count = tasks.len(), "Task list refreshed");
                    }
                    Err(e) => {
                        metrics::counter!(POLL_TICKS_METRIC, "outcome" => "error").increment(1);
                        warn!(error = %e, "Task list refresh failed");
                    }
                }
            }
        });
        PollerHandle::new(token, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryExecutionService, ServiceCall};
    use llm_evalbench_core::TaskSpec;
    use tokio::sync::broadcast::error::TryRecvError;

    const INTERVAL: Duration = Duration::from_secs(2);

    async fn running_task() -> (TaskController, Arc<InMemoryExecutionService>, TaskId) {
        let service = Arc::new(InMemoryExecutionService::new());
        let controller = TaskController::new(Arc::new(TaskRepository::new()), service.clone());
        let task = controller
            .create(&TaskSpec::new("nightly", "elecbench", ["m-a", "m-b"]))
            .await
            .unwrap();
        controller.start(&task.id).await.unwrap();
        (controller, service, task.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polls_after_termination() {
        let (controller, service, id) = running_task().await;
        service
            .push_progress(&id, [ProgressSnapshot::new(10, 5, 0)])
            .await;
        let handle = ProgressPoller::from_controller(&controller).spawn(id.clone(), INTERVAL);

        tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(100)).await;
        assert_eq!(service.calls(ServiceCall::Progress).await, 3);

        service.finish(&id, TaskStatus::Completed, None).await.unwrap();
        tokio::time::sleep(INTERVAL).await;
        handle.finished().await;
        assert_eq!(controller.repository().status_of(&id), Some(TaskStatus::Completed));
        let after_termination = service.calls(ServiceCall::Progress).await;

        tokio::time::sleep(INTERVAL * 10).await;
        assert_eq!(service.calls(ServiceCall::Progress).await, after_termination);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_exits_for_non_running_task() {
        let service = Arc::new(InMemoryExecutionService::new());
        let controller = TaskController::new(Arc::new(TaskRepository::new()), service.clone());
        let task = controller
            .create(&TaskSpec::new("nightly", "elecbench", ["m-a"]))
            .await
            .unwrap();

        let handle = ProgressPoller::from_controller(&controller).spawn(task.id.clone(), INTERVAL);
        handle.finished().await;
        assert_eq!(service.calls(ServiceCall::Progress).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_then_recovered() {
        let (controller, service, id) = running_task().await;
        let mut events = controller.repository().subscribe();
        service.fail_next(3).await;

        let _handle = ProgressPoller::from_controller(&controller)
            .with_max_transient_failures(3)
            .spawn(id.clone(), INTERVAL);

        // Ticks at 0s, 2s, 4s fail; the one at 6s succeeds.
        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(100)).await;

        let mut degraded = 0;
        let mut recovered = 0;
        loop {
            match events.try_recv() {
                Ok(RepositoryEvent::PollDegraded {
                    consecutive_failures,
                    ..
                }) => {
                    assert_eq!(consecutive_failures, 3);
                    degraded += 1;
                }
                Ok(RepositoryEvent::PollRecovered(task_id)) => {
                    assert_eq!(task_id, id);
                    recovered += 1;
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(e) => panic!("unexpected receive error: {:?}", e),
            }
        }
        assert_eq!((degraded, recovered), (1, 1));
        assert_eq!(controller.repository().status_of(&id), Some(TaskStatus::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let (controller, service, id) = running_task().await;
        let handle = ProgressPoller::from_controller(&controller).spawn(id.clone(), INTERVAL);
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(handle);

        let before = service.calls(ServiceCall::Progress).await;
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(service.calls(ServiceCall::Progress).await, before);
    }

    #[tokio::test]
    async fn test_poll_rejects_inconsistent_snapshot() {
        let (controller, service, id) = running_task().await;
        let poller = ProgressPoller::from_controller(&controller);

        service.push_progress(&id, [ProgressSnapshot::new(10, 4, 0)]).await;
        poller.poll(&id).await.unwrap();

        let bad = ProgressSnapshot {
            total_cases: 10,
            completed_cases: 8,
            failed_cases: 5,
            current_model: None,
        };
        service.push_progress(&id, [bad]).await;
        // Queue is [4/10, bad]: first pop returns the stale one.
        poller.poll(&id).await.unwrap();
        let err = poller.poll(&id).await.unwrap_err();
        assert!(matches!(err, crate::Error::Core(CoreError::InvalidProgress(_))));

        let kept = controller.repository().get(&id).unwrap().progress.unwrap();
        assert_eq!(kept.completed_cases, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_refresher_picks_up_service_changes() {
        let (controller, service, id) = running_task().await;
        let handle = ListRefresher::spawn(controller.clone(), None, Duration::from_secs(5));

        service.finish(&id, TaskStatus::Failed, Some("provider timeout".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5100)).await;
        handle.stop();
        handle.finished().await;

        let task = controller.repository().get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("provider timeout"));
        assert!(service.calls(ServiceCall::List).await >= 1);
    }
}
