// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Test task types and the task state machine.
//!
//! A test task runs one benchmark against an ordered set of models. Its
//! status follows a fixed graph:
//!
//! ```text
//! pending ──start──▶ running ──▶ completed | failed
//!    │                  │
//!    └──cancel──────────┴──▶ cancelled
//!
//! failed | cancelled ──retry──▶ pending
//! ```
//!
//! `pending` and `running` are the only non-terminal states.

use crate::progress::ProgressSnapshot;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Opaque task identifier assigned by the execution service.
///
/// Services that number their tasks send integer IDs; those are accepted and
/// kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random ID for a task that has not reached a service yet.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the ID as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Number(u64),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Text(s) => Self(s),
            Wire::Number(n) => Self(n.to_string()),
        })
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Model identifier.
pub type ModelId = String;

/// Benchmark identifier.
pub type BenchmarkId = String;

/// Status of a test task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting to be started.
    Pending,
    /// Executing on the execution service.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing. Some services report this as `stopped`.
    #[serde(alias = "stopped")]
    Cancelled,
}

impl TaskStatus {
    /// Whether no further progress is possible from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the graph has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Running, Cancelled)
                | (Failed, Pending)
                | (Cancelled, Pending)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" | "stopped" => Ok(Self::Cancelled),
            other => Err(Error::validation(format!("unknown task status '{}'", other))),
        }
    }
}

/// Execution parameters for a task.
///
/// The core passes these through to the execution service untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum output tokens per case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-case timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
    /// Number of cases sent concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Any additional service-specific parameters.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Request to create a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Display name.
    pub name: String,
    /// Benchmark to run. Exactly one is required.
    pub benchmark_id: Option<BenchmarkId>,
    /// Models to evaluate, in display order.
    pub model_ids: Vec<ModelId>,
    /// Execution parameters.
    #[serde(default)]
    pub config: TaskConfig,
}

impl TaskSpec {
    /// Create a spec for one benchmark and a list of models.
    pub fn new(
        name: impl Into<String>,
        benchmark_id: impl Into<BenchmarkId>,
        model_ids: impl IntoIterator<Item = impl Into<ModelId>>,
    ) -> Self {
        Self {
            name: name.into(),
            benchmark_id: Some(benchmark_id.into()),
            model_ids: model_ids.into_iter().map(Into::into).collect(),
            config: TaskConfig::default(),
        }
    }

    /// Set execution parameters.
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the spec and return its normalized form.
    ///
    /// Duplicate model IDs are collapsed, keeping the first occurrence.
    pub fn validate(&self) -> Result<ValidatedSpec> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::validation("task name is required"));
        }

        let benchmark_id = match self.benchmark_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(Error::validation("a benchmark is required")),
        };

        let mut seen = HashSet::new();
        let model_ids: Vec<ModelId> = self
            .model_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect();
        if model_ids.is_empty() {
            return Err(Error::validation("at least one model is required"));
        }

        if let Some(t) = self.config.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::validation(format!(
                    "temperature {} is outside 0.0..=2.0",
                    t
                )));
            }
        }

        Ok(ValidatedSpec {
            name: name.to_string(),
            benchmark_id,
            model_ids,
            config: self.config.clone(),
        })
    }
}

/// A task spec that passed validation. This is the body sent to the
/// execution service on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSpec {
    /// Display name.
    pub name: String,
    /// Benchmark to run.
    pub benchmark_id: BenchmarkId,
    /// Unique models, in display order.
    pub model_ids: Vec<ModelId>,
    /// Execution parameters.
    pub config: TaskConfig,
}

/// A submitted test task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTask {
    /// Task identifier.
    pub id: TaskId,
    /// Display name.
    pub name: String,
    /// Benchmark being run.
    pub benchmark_id: BenchmarkId,
    /// Models being evaluated.
    pub model_ids: Vec<ModelId>,
    /// Execution parameters.
    #[serde(default)]
    pub config: TaskConfig,
    /// Current status.
    pub status: TaskStatus,
    /// Latest progress snapshot.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::progress::deserialize_lenient"
    )]
    pub progress: Option<ProgressSnapshot>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set once the task leaves `pending`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set while the task is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure description when status is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TestTask {
    /// Build a freshly created task from a validated spec.
    pub fn from_spec(id: TaskId, spec: ValidatedSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: spec.name,
            benchmark_id: spec.benchmark_id,
            model_ids: spec.model_ids,
            config: spec.config,
            status: TaskStatus::Pending,
            progress: Some(ProgressSnapshot::default()),
            created_at,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Whether the task is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the task along an edge of the status graph, maintaining the
    /// timestamp invariants. Fails without side effects on an illegal edge.
    pub fn transition(&mut self, next: TaskStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::invalid_transition(&self.id, self.status, transition_action(next)));
        }
        match next {
            TaskStatus::Pending => {
                self.started_at = None;
                self.completed_at = None;
                self.error_message = None;
                self.progress = Some(ProgressSnapshot::default());
            }
            TaskStatus::Running => {
                self.started_at.get_or_insert(at);
            }
            _ => {
                self.started_at.get_or_insert(at);
                self.completed_at = Some(at);
            }
        }
        self.status = next;
        Ok(())
    }

    /// Repair timestamps so they agree with the current status.
    ///
    /// Timestamps reported by the execution service are kept. A terminal
    /// record without `completed_at` gets `now`; a missing `started_at` is
    /// taken from `completed_at` (terminal) or `created_at` (running), the
    /// same instant [`Self::transition`] would have stamped on a task that
    /// never ran. A start reported after the completion is pulled back to it.
    pub fn normalize_timestamps(&mut self, now: DateTime<Utc>) {
        match self.status {
            TaskStatus::Pending => {
                self.started_at = None;
                self.completed_at = None;
            }
            TaskStatus::Running => {
                self.started_at.get_or_insert(self.created_at);
                self.completed_at = None;
            }
            _ => {
                let completed = *self.completed_at.get_or_insert(now);
                let started = self.started_at.get_or_insert(completed);
                if *started > completed {
                    *started = completed;
                }
            }
        }
    }

    /// Wall-clock run time in seconds, when both ends are known.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some(end.signed_duration_since(start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

fn transition_action(next: TaskStatus) -> &'static str {
    match next {
        TaskStatus::Pending => "retry",
        TaskStatus::Running => "start",
        TaskStatus::Completed => "complete",
        TaskStatus::Failed => "fail",
        TaskStatus::Cancelled => "cancel",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_task() -> TestTask {
        let spec = TaskSpec::new("smoke", "bench-1", ["gpt-4", "claude-3"])
            .validate()
            .unwrap();
        TestTask::from_spec(TaskId::new("t-1"), spec, Utc::now())
    }

    #[test]
    fn test_spec_requires_models() {
        let spec = TaskSpec::new("smoke", "bench-1", Vec::<String>::new());
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_spec_requires_benchmark() {
        let mut spec = TaskSpec::new("smoke", "bench-1", ["gpt-4"]);
        spec.benchmark_id = None;
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));

        spec.benchmark_id = Some("   ".to_string());
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_spec_dedups_models_in_order() {
        let spec = TaskSpec::new("smoke", "bench-1", ["b", "a", "b", " ", "c", "a"]);
        let validated = spec.validate().unwrap();
        assert_eq!(validated.model_ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_spec_rejects_out_of_range_temperature() {
        let spec = TaskSpec::new("smoke", "bench-1", ["a"]).with_config(TaskConfig {
            temperature: Some(3.5),
            ..Default::default()
        });
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_new_task_is_pending_with_zero_progress() {
        let task = make_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, Some(ProgressSnapshot::default()));
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_transition_graph() {
        use TaskStatus::*;
        let all = [Pending, Running, Completed, Failed, Cancelled];
        let allowed = [
            (Pending, Running),
            (Running, Completed),
            (Running, Failed),
            (Pending, Cancelled),
            (Running, Cancelled),
            (Failed, Pending),
            (Cancelled, Pending),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_transition_sets_timestamps() {
        let mut task = make_task();
        let t0 = Utc::now();
        task.transition(TaskStatus::Running, t0).unwrap();
        assert_eq!(task.started_at, Some(t0));
        assert!(task.completed_at.is_none());

        let t1 = t0 + Duration::seconds(90);
        task.transition(TaskStatus::Completed, t1).unwrap();
        assert_eq!(task.completed_at, Some(t1));
        assert_eq!(task.duration_secs(), Some(90.0));
    }

    #[test]
    fn test_illegal_transition_has_no_side_effects() {
        let mut task = make_task();
        let before = task.clone();
        let err = task.transition(TaskStatus::Completed, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { from: TaskStatus::Pending, .. }));
        assert_eq!(task, before);
    }

    #[test]
    fn test_retry_resets_lifecycle() {
        let mut task = make_task();
        let now = Utc::now();
        task.transition(TaskStatus::Running, now).unwrap();
        task.transition(TaskStatus::Failed, now).unwrap();
        task.error_message = Some("provider timeout".into());

        task.transition(TaskStatus::Pending, now).unwrap();
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.error_message.is_none());
    }

    #[test]
    fn test_normalize_timestamps_repairs_service_records() {
        let mut task = make_task();
        let now = Utc::now();
        task.status = TaskStatus::Completed;
        task.normalize_timestamps(now);
        assert_eq!(task.started_at, Some(now));
        assert_eq!(task.completed_at, Some(now));

        task.status = TaskStatus::Running;
        task.started_at = None;
        task.normalize_timestamps(now);
        assert!(task.completed_at.is_none());
        assert_eq!(task.started_at, Some(task.created_at));
    }

    #[test]
    fn test_normalize_timestamps_keeps_service_completion() {
        let mut task = make_task();
        let completed = Utc::now() - Duration::hours(1);
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(completed);

        task.normalize_timestamps(Utc::now());
        assert_eq!(task.completed_at, Some(completed));
        assert_eq!(task.started_at, Some(completed));

        let again = task.clone();
        task.normalize_timestamps(Utc::now() + Duration::minutes(5));
        assert_eq!(task, again);

        // A start after the completion is pulled back, never the reverse.
        task.started_at = Some(completed + Duration::minutes(1));
        task.normalize_timestamps(Utc::now());
        assert_eq!(task.completed_at, Some(completed));
        assert_eq!(task.started_at, Some(completed));
    }

    #[test]
    fn test_cancel_from_pending_agrees_with_normalization() {
        let mut task = make_task();
        let at = Utc::now();
        task.transition(TaskStatus::Cancelled, at).unwrap();
        assert_eq!(task.started_at, Some(at));
        assert_eq!(task.completed_at, Some(at));
        assert_eq!(task.duration_secs(), Some(0.0));

        let mut reported = task.clone();
        reported.started_at = None;
        reported.normalize_timestamps(at + Duration::seconds(30));
        assert_eq!(reported, task);
    }

    #[test]
    fn test_task_record_with_numeric_progress() {
        let json = r#"{
            "id": "t-7",
            "name": "nightly",
            "benchmark_id": "b-1",
            "model_ids": ["m-1"],
            "status": "running",
            "progress": 42.5,
            "created_at": "2025-03-01T10:00:00Z",
            "started_at": "2025-03-01T10:01:00Z"
        }"#;
        let task: TestTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.progress.is_none());
        assert!(task.started_at.is_some());
    }

    #[test]
    fn test_status_wire_names() {
        let stopped: TaskStatus = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(stopped, TaskStatus::Cancelled);
        assert_eq!(serde_json::to_string(&TaskStatus::Running).unwrap(), "\"running\"");
        assert_eq!("Stopped".parse::<TaskStatus>().unwrap(), TaskStatus::Cancelled);
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_id_accepts_numbers() {
        let id: TaskId = serde_json::from_str("17").unwrap();
        assert_eq!(id.as_str(), "17");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"17\"");
        assert_ne!(TaskId::generate(), TaskId::generate());
    }
}
