// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Terminal rendering of tasks.

use colored::{ColoredString, Colorize};
use llm_evalbench_core::{TaskStatistics, TaskStatus, TestTask};

/// Status label in its display colour.
pub fn status_label(status: TaskStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        TaskStatus::Pending => label.yellow(),
        TaskStatus::Running => label.cyan().bold(),
        TaskStatus::Completed => label.green(),
        TaskStatus::Failed => label.red().bold(),
        TaskStatus::Cancelled => label.dimmed(),
    }
}

fn progress_cell(task: &TestTask) -> String {
    match (&task.progress, task.status) {
        (_, TaskStatus::Completed) => "100.0%".to_string(),
        (Some(p), TaskStatus::Running) => format!("{:.1}%", p.percentage()),
        _ => "-".to_string(),
    }
}

/// One-line description of a task.
pub fn task_line(task: &TestTask) -> String {
    format!(
        "{:<38} {:<24} {:<10} {:>7}  {}",
        task.id.as_str(),
        truncate(&task.name, 24),
        status_label(task.status),
        progress_cell(task),
        task.created_at.format("%Y-%m-%d %H:%M"),
    )
}

/// Header matching [`task_line`].
pub fn task_header() -> String {
    format!(
        "{:<38} {:<24} {:<10} {:>7}  {}",
        "ID", "NAME", "STATUS", "PROGRESS", "CREATED"
    )
    .bold()
    .to_string()
}

/// Multi-line description of a single task.
pub fn task_details(task: &TestTask) -> String {
    let mut lines = vec![
        format!("{} {}", "Task:".bold(), task.id),
        format!("{} {}", "Name:".bold(), task.name),
        format!("{} {}", "Benchmark:".bold(), task.benchmark_id),
        format!("{} {}", "Models:".bold(), task.model_ids.join(", ")),
        format!("{} {}", "Status:".bold(), status_label(task.status)),
    ];
    if let Some(progress) = &task.progress {
        lines.push(format!(
            "{} {}/{} cases ({} failed, {:.1}%)",
            "Progress:".bold(),
            progress.processed_cases(),
            progress.total_cases,
            progress.failed_cases,
            progress.percentage()
        ));
    }
    if let Some(secs) = task.duration_secs() {
        lines.push(format!("{} {:.0}s", "Duration:".bold(), secs));
    }
    if let Some(err) = &task.error_message {
        lines.push(format!("{} {}", "Error:".bold(), err.red()));
    }
    lines.join("\n")
}

/// Counts per status.
pub fn statistics_line(stats: &TaskStatistics) -> String {
    format!(
        "{} total: {} pending, {} running, {} completed, {} failed, {} cancelled",
        stats.total,
        stats.pending,
        stats.running,
        stats.completed,
        stats.failed,
        stats.cancelled
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use llm_evalbench_core::{ProgressSnapshot, TaskId, TaskSpec};

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 24), "short");
        assert_eq!(truncate("a very long task name indeed", 10), "a very ...");
    }

    #[test]
    fn test_progress_cell() {
        let spec = TaskSpec::new("n", "b", ["m"]).validate().unwrap();
        let mut task = TestTask::from_spec(TaskId::new("1"), spec, Utc::now());
        assert_eq!(progress_cell(&task), "-");

        task.transition(TaskStatus::Running, Utc::now()).unwrap();
        task.progress = Some(ProgressSnapshot::new(8, 2, 0));
        assert_eq!(progress_cell(&task), "25.0%");
    }
}
