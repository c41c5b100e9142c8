// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Aggregation engine: raw results in, report out.
//!
//! [`aggregate`] is a pure function of a task and its result set. It reads
//! no clock and no randomness, iterates only ordered collections, and breaks
//! every ranking tie, so identical inputs serialize to identical bytes.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use llm_evalbench_core::report::aggregate;
//! use llm_evalbench_core::{ModelResult, RawResultSet, TaskId, TaskSpec, TestTask};
//!
//! let spec = TaskSpec::new("nightly", "elecbench", ["m-a", "m-b"]).validate().unwrap();
//! let task = TestTask::from_spec(TaskId::new("t-1"), spec, Utc::now());
//!
//! let mut a = ModelResult::new("m-a", "Model A");
//! a.score = Some(90.0);
//! let mut b = ModelResult::new("m-b", "Model B");
//! b.score = Some(78.0);
//!
//! let report = aggregate(&task, &RawResultSet::new(task.id.clone(), vec![b, a]));
//! assert_eq!(report.model_results[0].model_name, "Model A");
//! assert_eq!(report.summary.average_score, Some(84.0));
//! ```

pub mod charts;
pub mod ranking;
pub mod summary;

pub use charts::{
    ChartSeries, ConfusionCounts, CostPerformancePoint, RadarAxis, RocCurve, RocPoint,
    ScoreBucket, TimeSeriesPoint,
};
pub use ranking::{compare_results, rank, RankedModel};
pub use summary::ReportSummary;

use crate::result::RawResultSet;
use crate::task::{BenchmarkId, TaskId, TaskStatus, TestTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default score at or above which a case is predicted to pass.
pub const DEFAULT_CONFUSION_THRESHOLD: f64 = 60.0;

/// Tunables of the aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationOptions {
    /// Score at or above which a case is predicted to pass.
    pub confusion_threshold: f64,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            confusion_threshold: DEFAULT_CONFUSION_THRESHOLD,
        }
    }
}

/// Aggregated, chartable view of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Task the report describes.
    pub task_id: TaskId,
    /// Task name.
    pub task_name: String,
    /// Benchmark that was run.
    pub benchmark_id: BenchmarkId,
    /// Task status at aggregation time.
    pub status: TaskStatus,
    /// Task start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Task completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Headline numbers.
    pub summary: ReportSummary,
    /// Models in ranking order.
    pub model_results: Vec<RankedModel>,
    /// Chart series.
    pub charts: ChartSeries,
}

/// Aggregate with default options.
pub fn aggregate(task: &TestTask, results: &RawResultSet) -> Report {
    aggregate_with(task, results, AggregationOptions::default())
}

/// Aggregate a task's results into a [`Report`].
///
/// An empty result set yields a zeroed summary and empty series.
pub fn aggregate_with(task: &TestTask, results: &RawResultSet, options: AggregationOptions) -> Report {
    if results.task_id != task.id {
        warn!(
            task_id = %task.id,
            result_task_id = %results.task_id,
            "Aggregating a result set that belongs to another task"
        );
    }

    let ordered = rank(&results.model_results);
    Report {
        task_id: task.id.clone(),
        task_name: task.name.clone(),
        benchmark_id: task.benchmark_id.clone(),
        status: task.status,
        started_at: task.started_at,
        completed_at: task.completed_at,
        summary: ReportSummary::compute(task, &ordered),
        model_results: ranking::ranked_models(&ordered),
        charts: ChartSeries::derive(&ordered, options.confusion_threshold),
    }
}
