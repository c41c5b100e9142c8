// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Report summary statistics.

use crate::result::ModelResult;
use crate::task::TestTask;
use serde::{Deserialize, Serialize};

/// Headline numbers for a finished task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Models with results.
    pub total_models: usize,
    /// Completed cases across all models.
    pub total_completed: u64,
    /// Failed cases across all models.
    pub total_failed: u64,
    /// Mean of the scores that are present. `None` when no model has one.
    pub average_score: Option<f64>,
    /// Median of the present scores.
    pub median_score: Option<f64>,
    /// Lowest present score.
    pub min_score: Option<f64>,
    /// Highest present score.
    pub max_score: Option<f64>,
    /// Population standard deviation of the present scores.
    pub score_std_dev: Option<f64>,
    /// Mean per-case execution time in seconds, over cases that report one.
    pub average_execution_time: Option<f64>,
    /// Sum of the reported per-case execution times in seconds.
    pub total_execution_time: Option<f64>,
    /// Seconds between start and completion of the task.
    pub total_duration_secs: Option<f64>,
}

impl ReportSummary {
    /// Summarize `results` (in ranking order) for `task`.
    pub fn compute(task: &TestTask, results: &[&ModelResult]) -> Self {
        let mut scores: Vec<f64> = results.iter().filter_map(|r| r.valid_score()).collect();
        scores.sort_by(f64::total_cmp);
        let times: Vec<f64> = results
            .iter()
            .flat_map(|r| r.cases.iter())
            .filter_map(|c| c.execution_time)
            .filter(|t| t.is_finite())
            .collect();

        Self {
            total_models: results.len(),
            total_completed: results.iter().map(|r| r.completed_cases).sum(),
            total_failed: results.iter().map(|r| r.failed_cases).sum(),
            average_score: mean(&scores),
            median_score: median(&scores),
            min_score: scores.first().copied(),
            max_score: scores.last().copied(),
            score_std_dev: std_dev(&scores),
            average_execution_time: mean(&times),
            total_execution_time: (!times.is_empty()).then(|| times.iter().sum()),
            total_duration_secs: task.duration_secs(),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Median of an ascending slice.
fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}
