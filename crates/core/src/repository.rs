// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! The task repository: the locally known set of test tasks.
//!
//! The repository is the single source of truth for anything rendering task
//! state. Every status change goes through one of its operations; other
//! components never touch a task's status field directly.
//!
//! # Authority
//!
//! The execution service owns task status. Local operations only *validate*
//! a requested transition (`check_*`), the caller forwards the request to the
//! service, and the record the service returns is merged with
//! [`TaskRepository::apply_authoritative`]. When a stop request races a
//! completion, whichever status the service reports last wins.
//!
//! # Observers
//!
//! [`TaskRepository::subscribe`] hands out a broadcast receiver of
//! [`RepositoryEvent`]s. Slow receivers lag rather than block mutations.

use crate::progress::ProgressSnapshot;
use crate::result::RawResultSet;
use crate::task::{TaskId, TaskStatus, TestTask};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications published by the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    /// A task was created.
    Created(TaskId),
    /// A task's record changed.
    Updated {
        /// Task that changed.
        task_id: TaskId,
        /// Status before the change (`None` if the task was new).
        previous: Option<TaskStatus>,
        /// Status after the change.
        status: TaskStatus,
    },
    /// A stop was requested and awaits confirmation from the service.
    CancelRequested(TaskId),
    /// A progress snapshot was merged.
    ProgressMerged {
        /// Task that progressed.
        task_id: TaskId,
        /// Share of processed cases.
        percentage: f64,
    },
    /// Results were attached to a terminal task.
    ResultsAttached(TaskId),
    /// A task and everything attached to it was removed.
    Removed(TaskId),
    /// The cached list was re-synchronized with the service.
    Refreshed {
        /// Number of tasks received.
        count: usize,
    },
    /// Progress polling for a task has failed repeatedly. Non-fatal.
    PollDegraded {
        /// Task being polled.
        task_id: TaskId,
        /// Consecutive failed polls.
        consecutive_failures: u32,
        /// Last error.
        error: String,
    },
    /// Progress polling succeeded again after being degraded.
    PollRecovered(TaskId),
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    /// All tasks.
    pub total: usize,
    /// Tasks in `pending`.
    pub pending: usize,
    /// Tasks in `running`.
    pub running: usize,
    /// Tasks in `completed`.
    pub completed: usize,
    /// Tasks in `failed`.
    pub failed: usize,
    /// Tasks in `cancelled`.
    pub cancelled: usize,
}

#[derive(Debug, Clone)]
struct TaskEntry {
    task: TestTask,
    results: Option<RawResultSet>,
    cancel_requested: bool,
}

impl TaskEntry {
    fn new(task: TestTask) -> Self {
        Self {
            task,
            results: None,
            cancel_requested: false,
        }
    }
}

/// In-memory store of test tasks with change notifications.
#[derive(Debug)]
pub struct TaskRepository {
    entries: DashMap<TaskId, TaskEntry>,
    events: broadcast::Sender<RepositoryEvent>,
}

impl Default for TaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            events,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RepositoryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Get a copy of a task.
    pub fn get(&self, id: &TaskId) -> Option<TestTask> {
        self.entries.get(id).map(|e| e.task.clone())
    }

    /// Current status of a task.
    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.entries.get(id).map(|e| e.task.status)
    }

    /// Whether a stop was requested and not yet confirmed.
    pub fn is_cancel_requested(&self, id: &TaskId) -> bool {
        self.entries.get(id).map_or(false, |e| e.cancel_requested)
    }

    /// Results attached to a task, if fetched.
    pub fn results_of(&self, id: &TaskId) -> Option<RawResultSet> {
        self.entries.get(id).and_then(|e| e.results.clone())
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<TestTask> {
        let mut tasks: Vec<TestTask> = self.entries.iter().map(|e| e.task.clone()).collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    /// Tasks with the given status, newest first.
    pub fn list_by_status(&self, status: TaskStatus) -> Vec<TestTask> {
        self.list().into_iter().filter(|t| t.status == status).collect()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the repository is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Task counts per status.
    pub fn statistics(&self) -> TaskStatistics {
        let mut stats = TaskStatistics::default();
        for entry in self.entries.iter() {
            stats.total += 1;
            match entry.task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Transition checks (side-effect free)
    // ------------------------------------------------------------------

    fn require_status(&self, id: &TaskId) -> Result<TaskStatus> {
        self.status_of(id).ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Check that `start` is allowed: the task must be `pending`.
    pub fn check_start(&self, id: &TaskId) -> Result<()> {
        match self.require_status(id)? {
            TaskStatus::Pending => Ok(()),
            other => Err(Error::invalid_transition(id, other, "start")),
        }
    }

    /// Check that `cancel` is allowed: the task must not be terminal.
    ///
    /// Cancelling a finished task yields an informational
    /// [`Error::InvalidTransition`].
    pub fn check_cancel(&self, id: &TaskId) -> Result<()> {
        let status = self.require_status(id)?;
        if status.is_terminal() {
            return Err(Error::invalid_transition(id, status, "cancel"));
        }
        Ok(())
    }

    /// Check that `delete` is allowed: the task must be terminal.
    pub fn check_delete(&self, id: &TaskId) -> Result<()> {
        let status = self.require_status(id)?;
        if !status.is_terminal() {
            return Err(Error::invalid_transition(id, status, "delete"));
        }
        Ok(())
    }

    /// Check that `retry` is allowed: the task must be `failed` or `cancelled`.
    pub fn check_retry(&self, id: &TaskId) -> Result<()> {
        match self.require_status(id)? {
            TaskStatus::Failed | TaskStatus::Cancelled => Ok(()),
            other => Err(Error::invalid_transition(id, other, "retry")),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add a task returned by the service's create call.
    pub fn insert_created(&self, mut task: TestTask) -> Result<()> {
        if task.status != TaskStatus::Pending {
            return Err(Error::validation(format!(
                "newly created task {} reported status {}",
                task.id, task.status
            )));
        }
        if self.entries.contains_key(&task.id) {
            return Err(Error::validation(format!("task {} already exists", task.id)));
        }
        task.normalize_timestamps(task.created_at);
        if task.progress.is_none() {
            task.progress = Some(ProgressSnapshot::default());
        }
        let id = task.id.clone();
        self.entries.insert(id.clone(), TaskEntry::new(task));
        info!(task_id = %id, "Task created");
        self.publish(RepositoryEvent::Created(id));
        Ok(())
    }

    /// Move a task along an edge of the status graph locally.
    ///
    /// Used when the service acknowledges a command without returning the
    /// updated record.
    pub fn transition(&self, id: &TaskId, next: TaskStatus, at: DateTime<Utc>) -> Result<TestTask> {
        let (previous, task) = {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            let previous = entry.task.status;
            entry.task.transition(next, at)?;
            if next.is_terminal() || next == TaskStatus::Pending {
                entry.cancel_requested = false;
            }
            if next == TaskStatus::Pending {
                entry.results = None;
            }
            (previous, entry.task.clone())
        };
        info!(task_id = %id, from = %previous, to = %next, "Task transitioned");
        self.publish(RepositoryEvent::Updated {
            task_id: id.clone(),
            previous: Some(previous),
            status: next,
        });
        Ok(task)
    }

    /// Record that a stop was sent to the service.
    ///
    /// The task keeps its status until the service confirms.
    pub fn mark_cancel_requested(&self, id: &TaskId) -> Result<()> {
        {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            if entry.task.is_terminal() {
                return Err(Error::invalid_transition(id, entry.task.status, "cancel"));
            }
            entry.cancel_requested = true;
        }
        debug!(task_id = %id, "Cancellation requested, awaiting confirmation");
        self.publish(RepositoryEvent::CancelRequested(id.clone()));
        Ok(())
    }

    /// Merge a task record reported by the execution service.
    ///
    /// The reported status wins over any local assumption. Timestamps the
    /// record leaves out are taken from the cached task before being
    /// repaired, so applying the same record twice changes nothing. The
    /// last progress snapshot is kept when the record carries none. A
    /// pending stop request is cleared once the task settles or is
    /// retried. `Updated` is published only when the cached task changed.
    pub fn apply_authoritative(&self, mut incoming: TestTask) -> TestTask {
        let id = incoming.id.clone();

        let (previous, changed) = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                let previous = entry.task.status;
                if incoming.status != TaskStatus::Pending && incoming.started_at.is_none() {
                    incoming.started_at = entry.task.started_at;
                }
                if incoming.status.is_terminal()
                    && incoming.completed_at.is_none()
                    && entry.task.is_terminal()
                {
                    incoming.completed_at = entry.task.completed_at;
                }
                incoming.normalize_timestamps(Utc::now());

                if incoming.progress.is_none() {
                    incoming.progress = if incoming.status == TaskStatus::Pending
                        && previous != TaskStatus::Pending
                    {
                        Some(ProgressSnapshot::default())
                    } else {
                        entry.task.progress.clone()
                    };
                }
                let retried = incoming.status == TaskStatus::Pending && previous.is_terminal();
                if incoming.status.is_terminal() || retried {
                    entry.cancel_requested = false;
                }
                if !incoming.status.is_terminal() {
                    entry.results = None;
                }
                let changed = entry.task != incoming;
                if changed {
                    entry.task = incoming.clone();
                }
                (Some(previous), changed)
            }
            None => {
                incoming.normalize_timestamps(Utc::now());
                self.entries.insert(id.clone(), TaskEntry::new(incoming.clone()));
                (None, true)
            }
        };

        if previous != Some(incoming.status) {
            match previous {
                Some(from) if !from.can_transition_to(incoming.status) => warn!(
                    task_id = %id,
                    from = %from,
                    to = %incoming.status,
                    "Service reported a status outside the transition graph; accepting it"
                ),
                _ => info!(task_id = %id, to = %incoming.status, "Task status updated from service"),
            }
        }
        if changed {
            self.publish(RepositoryEvent::Updated {
                task_id: id,
                previous,
                status: incoming.status,
            });
        }
        incoming
    }

    /// Merge a progress snapshot into a running task.
    ///
    /// An invalid snapshot, or one for a task that is no longer running,
    /// leaves the previous snapshot intact.
    pub fn merge_progress(&self, id: &TaskId, snapshot: ProgressSnapshot) -> Result<()> {
        snapshot.validate()?;
        let percentage = snapshot.percentage();
        {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            if entry.task.status != TaskStatus::Running {
                return Err(Error::invalid_transition(
                    id,
                    entry.task.status,
                    "merge progress into",
                ));
            }
            entry.task.progress = Some(snapshot);
        }
        debug!(task_id = %id, percentage, "Progress merged");
        self.publish(RepositoryEvent::ProgressMerged {
            task_id: id.clone(),
            percentage,
        });
        Ok(())
    }

    /// Replace the results attached to a terminal task.
    pub fn attach_results(&self, id: &TaskId, results: RawResultSet) -> Result<()> {
        if &results.task_id != id {
            return Err(Error::validation(format!(
                "result set belongs to task {}, not {}",
                results.task_id, id
            )));
        }
        {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            if !entry.task.is_terminal() {
                return Err(Error::precondition(format!(
                    "task {} is {}; results can only be attached to terminal tasks",
                    id, entry.task.status
                )));
            }
            entry.results = Some(results);
        }
        debug!(task_id = %id, "Results attached");
        self.publish(RepositoryEvent::ResultsAttached(id.clone()));
        Ok(())
    }

    /// Remove a terminal task together with its progress and results.
    pub fn remove(&self, id: &TaskId) -> Result<TestTask> {
        self.check_delete(id)?;
        let (_, entry) = self
            .entries
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        info!(task_id = %id, "Task removed");
        self.publish(RepositoryEvent::Removed(id.clone()));
        Ok(entry.task)
    }

    /// Replace the cached set with the service's list.
    ///
    /// With a `filter`, only cached tasks whose status matches it are in
    /// scope; tasks outside the scope are left alone. In-scope tasks missing
    /// from `tasks` are dropped. Tasks present in both are reconciled by ID
    /// through [`Self::apply_authoritative`], so a pending stop request
    /// survives while the task is still running.
    pub fn replace_all(&self, tasks: Vec<TestTask>, filter: Option<TaskStatus>) {
        let count = tasks.len();
        let incoming: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();

        let mut dropped = Vec::new();
        self.entries.retain(|id, entry| {
            let in_scope = filter.map_or(true, |s| entry.task.status == s);
            let keep = !in_scope || incoming.contains(id);
            if !keep {
                dropped.push(id.clone());
            }
            keep
        });

        for task in tasks {
            if let Some(status) = filter {
                if task.status != status {
                    warn!(task_id = %task.id, status = %task.status, filter = %status, "Refresh returned a task outside the requested filter");
                }
            }
            self.apply_authoritative(task);
        }

        for id in dropped {
            debug!(task_id = %id, "Task no longer listed by service");
            self.publish(RepositoryEvent::Removed(id));
        }
        debug!(count, filter = ?filter, "Task list refreshed");
        self.publish(RepositoryEvent::Refreshed { count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ModelResult;
    use crate::task::TaskSpec;
    use chrono::Duration;

    fn make_task(id: &str) -> TestTask {
        let spec = TaskSpec::new(format!("task {}", id), "bench-1", ["m-a", "m-b"])
            .validate()
            .unwrap();
        TestTask::from_spec(TaskId::new(id), spec, Utc::now())
    }

    fn repo_with(id: &str) -> (TaskRepository, TaskId) {
        let repo = TaskRepository::new();
        repo.insert_created(make_task(id)).unwrap();
        (repo, TaskId::new(id))
    }

    fn with_status(id: &str, status: TaskStatus) -> TestTask {
        let mut task = make_task(id);
        task.status = status;
        task
    }

    #[test]
    fn test_insert_created_requires_pending() {
        let repo = TaskRepository::new();
        let err = repo
            .insert_created(with_status("t-1", TaskStatus::Running))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_start_only_from_pending() {
        let (repo, id) = repo_with("t-1");
        assert!(repo.check_start(&id).is_ok());

        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        let err = repo.check_start(&id).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { from: TaskStatus::Running, .. }));
    }

    #[test]
    fn test_cancel_of_terminal_task_is_informational() {
        let (repo, id) = repo_with("t-1");
        repo.transition(&id, TaskStatus::Cancelled, Utc::now()).unwrap();

        let err = repo.check_cancel(&id).unwrap_err();
        assert!(err.is_informational());
        assert!(repo.mark_cancel_requested(&id).is_err());
        assert_eq!(repo.status_of(&id), Some(TaskStatus::Cancelled));
    }

    #[test]
    fn test_delete_requires_terminal() {
        let (repo, id) = repo_with("t-1");
        assert!(matches!(repo.remove(&id), Err(Error::InvalidTransition { .. })));
        assert_eq!(repo.len(), 1);

        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.transition(&id, TaskStatus::Failed, Utc::now()).unwrap();
        repo.remove(&id).unwrap();
        assert!(repo.get(&id).is_none());
        assert!(repo.results_of(&id).is_none());
    }

    #[test]
    fn test_unknown_task_is_not_found() {
        let repo = TaskRepository::new();
        let id = TaskId::new("nope");
        assert!(matches!(repo.check_start(&id), Err(Error::NotFound(_))));
        assert!(matches!(repo.check_delete(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_merge_progress_keeps_prior_snapshot_on_invalid_input() {
        let (repo, id) = repo_with("t-1");
        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.merge_progress(&id, ProgressSnapshot::new(100, 30, 0)).unwrap();

        let err = repo
            .merge_progress(&id, ProgressSnapshot::new(100, 95, 10))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProgress(_)));
        let progress = repo.get(&id).unwrap().progress.unwrap();
        assert_eq!(progress.completed_cases, 30);
    }

    #[test]
    fn test_merge_progress_rejected_when_not_running() {
        let (repo, id) = repo_with("t-1");
        assert!(repo
            .merge_progress(&id, ProgressSnapshot::new(10, 1, 0))
            .is_err());
        assert_eq!(repo.get(&id).unwrap().progress, Some(ProgressSnapshot::default()));
    }

    #[test]
    fn test_cancel_request_waits_for_confirmation() {
        let (repo, id) = repo_with("t-1");
        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.mark_cancel_requested(&id).unwrap();
        assert_eq!(repo.status_of(&id), Some(TaskStatus::Running));
        assert!(repo.is_cancel_requested(&id));

        // The service finished the run before honouring the stop.
        let mut record = repo.get(&id).unwrap();
        record.status = TaskStatus::Completed;
        repo.apply_authoritative(record);

        assert_eq!(repo.status_of(&id), Some(TaskStatus::Completed));
        assert!(!repo.is_cancel_requested(&id));
        assert!(repo.get(&id).unwrap().completed_at.is_some());
    }

    #[test]
    fn test_apply_authoritative_keeps_progress_when_record_has_none() {
        let (repo, id) = repo_with("t-1");
        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.merge_progress(&id, ProgressSnapshot::new(10, 4, 1)).unwrap();

        let mut record = with_status("t-1", TaskStatus::Running);
        record.progress = None;
        let applied = repo.apply_authoritative(record);
        assert_eq!(applied.progress, Some(ProgressSnapshot::new(10, 4, 1)));
    }

    #[test]
    fn test_reapplying_service_record_keeps_its_completion() {
        let (repo, id) = repo_with("t-1");
        let completed = Utc::now() - Duration::hours(1);
        let mut record = with_status("t-1", TaskStatus::Cancelled);
        record.completed_at = Some(completed);

        let first = repo.apply_authoritative(record.clone());
        let second = repo.apply_authoritative(record);
        assert_eq!(first.completed_at, Some(completed));
        assert_eq!(second.completed_at, Some(completed));
        assert_eq!(second.started_at, Some(completed));
        assert_eq!(repo.get(&id).unwrap(), first);
    }

    #[test]
    fn test_record_without_timestamps_keeps_cached_ones() {
        let (repo, id) = repo_with("t-1");
        let started = Utc::now() - Duration::minutes(10);
        repo.transition(&id, TaskStatus::Running, started).unwrap();

        let mut record = with_status("t-1", TaskStatus::Running);
        record.started_at = None;
        assert_eq!(repo.apply_authoritative(record.clone()).started_at, Some(started));

        record.status = TaskStatus::Completed;
        let done = repo.apply_authoritative(record.clone());
        let again = repo.apply_authoritative(record);
        assert_eq!(done.started_at, Some(started));
        assert_eq!(again.completed_at, done.completed_at);
    }

    #[test]
    fn test_pending_record_keeps_stop_request() {
        let (repo, id) = repo_with("t-1");
        repo.mark_cancel_requested(&id).unwrap();

        repo.apply_authoritative(with_status("t-1", TaskStatus::Pending));
        assert!(repo.is_cancel_requested(&id));

        repo.apply_authoritative(with_status("t-1", TaskStatus::Cancelled));
        assert!(!repo.is_cancel_requested(&id));
    }

    #[test]
    fn test_retried_record_clears_stop_request() {
        let (repo, id) = repo_with("t-1");
        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.mark_cancel_requested(&id).unwrap();
        repo.transition(&id, TaskStatus::Failed, Utc::now()).unwrap();
        assert!(!repo.is_cancel_requested(&id));

        repo.apply_authoritative(with_status("t-1", TaskStatus::Pending));
        assert!(!repo.is_cancel_requested(&id));
        assert_eq!(repo.status_of(&id), Some(TaskStatus::Pending));
    }

    #[test]
    fn test_unchanged_record_publishes_nothing() {
        let repo = TaskRepository::new();
        let record = with_status("t-1", TaskStatus::Running);
        repo.apply_authoritative(record.clone());

        let mut events = repo.subscribe();
        repo.replace_all(vec![record.clone()], None);
        assert_eq!(events.try_recv().unwrap(), RepositoryEvent::Refreshed { count: 1 });
        assert!(events.try_recv().is_err());

        let mut moved = record;
        moved.status = TaskStatus::Completed;
        repo.apply_authoritative(moved);
        assert!(matches!(
            events.try_recv().unwrap(),
            RepositoryEvent::Updated { status: TaskStatus::Completed, .. }
        ));
    }

    #[test]
    fn test_attach_results_requires_terminal_and_matching_id() {
        let (repo, id) = repo_with("t-1");
        let set = RawResultSet::new(id.clone(), vec![ModelResult::new("m-a", "A")]);
        assert!(matches!(
            repo.attach_results(&id, set.clone()),
            Err(Error::Precondition(_))
        ));

        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.transition(&id, TaskStatus::Completed, Utc::now()).unwrap();
        assert!(repo
            .attach_results(&id, RawResultSet::empty(TaskId::new("other")))
            .is_err());

        repo.attach_results(&id, set.clone()).unwrap();
        repo.attach_results(&id, RawResultSet::empty(id.clone())).unwrap();
        assert!(repo.results_of(&id).unwrap().is_empty());
    }

    #[test]
    fn test_replace_all_full_replace() {
        let repo = TaskRepository::new();
        repo.insert_created(make_task("a")).unwrap();
        repo.insert_created(make_task("b")).unwrap();

        repo.replace_all(
            vec![with_status("b", TaskStatus::Running), with_status("c", TaskStatus::Pending)],
            None,
        );
        let mut ids: Vec<String> = repo.list().iter().map(|t| t.id.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(repo.status_of(&TaskId::new("b")), Some(TaskStatus::Running));
    }

    #[test]
    fn test_replace_all_with_filter_leaves_other_statuses() {
        let repo = TaskRepository::new();
        repo.insert_created(make_task("pending-1")).unwrap();
        repo.apply_authoritative(with_status("run-1", TaskStatus::Running));
        repo.apply_authoritative(with_status("run-2", TaskStatus::Running));
        repo.mark_cancel_requested(&TaskId::new("run-1")).unwrap();

        repo.replace_all(vec![with_status("run-1", TaskStatus::Running)], Some(TaskStatus::Running));

        assert!(repo.get(&TaskId::new("pending-1")).is_some());
        assert!(repo.get(&TaskId::new("run-2")).is_none());
        assert!(repo.is_cancel_requested(&TaskId::new("run-1")));
    }

    #[test]
    fn test_list_is_newest_first() {
        let repo = TaskRepository::new();
        let mut old = make_task("old");
        old.created_at = Utc::now() - Duration::hours(1);
        repo.insert_created(old).unwrap();
        repo.insert_created(make_task("new")).unwrap();

        let ids: Vec<String> = repo.list().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_statistics() {
        let repo = TaskRepository::new();
        repo.insert_created(make_task("a")).unwrap();
        repo.apply_authoritative(with_status("b", TaskStatus::Running));
        repo.apply_authoritative(with_status("c", TaskStatus::Completed));
        repo.apply_authoritative(with_status("d", TaskStatus::Cancelled));

        let stats = repo.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let (repo, id) = repo_with("t-1");
        let mut events = repo.subscribe();

        repo.transition(&id, TaskStatus::Running, Utc::now()).unwrap();
        repo.merge_progress(&id, ProgressSnapshot::new(4, 2, 0)).unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            RepositoryEvent::Updated {
                task_id: id.clone(),
                previous: Some(TaskStatus::Pending),
                status: TaskStatus::Running,
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RepositoryEvent::ProgressMerged {
                task_id: id,
                percentage: 50.0,
            }
        );
    }
}
