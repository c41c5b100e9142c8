// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Raw per-model, per-case results of a finished task.
//!
//! A [`RawResultSet`] is owned by its task and replaced wholesale on every
//! fetch. Fields the execution service did not report stay `None`; the
//! aggregation engine never substitutes values for them.

use crate::task::{ModelId, TaskId};
use serde::{Deserialize, Serialize};

/// Outcome of one benchmark case for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Benchmark case identifier.
    pub case_id: String,
    /// Case score, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Wall-clock time of the inference call, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    /// Ground-truth verdict for the case, when the benchmark provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

/// Results for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    /// Model identifier.
    pub model_id: ModelId,
    /// Display name.
    pub model_name: String,
    /// Provider type (`openai`, `anthropic`, `deepseek`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    /// Cases that produced a result.
    #[serde(default)]
    pub completed_cases: u64,
    /// Cases that errored.
    #[serde(default)]
    pub failed_cases: u64,
    /// Aggregate score, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Mean response time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_response_time: Option<f64>,
    /// Share of successful calls, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    /// Price in USD per 1K tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_1k_tokens: Option<f64>,
    /// Per-case outcomes, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<CaseResult>,
}

impl ModelResult {
    /// Create a result with counts only; everything else is absent.
    pub fn new(model_id: impl Into<ModelId>, model_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            model_name: model_name.into(),
            provider_type: None,
            completed_cases: 0,
            failed_cases: 0,
            score: None,
            average_response_time: None,
            success_rate: None,
            cost_per_1k_tokens: None,
            cases: Vec::new(),
        }
    }

    /// Score, ignoring NaN reported by a misbehaving service.
    pub fn valid_score(&self) -> Option<f64> {
        self.score.filter(|s| s.is_finite())
    }

    /// Case scores that are present and finite, in case order.
    pub fn case_scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.cases
            .iter()
            .filter_map(|c| c.score)
            .filter(|s| s.is_finite())
    }
}

/// All results for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResultSet {
    /// Owning task.
    pub task_id: TaskId,
    /// Per-model results.
    #[serde(default)]
    pub model_results: Vec<ModelResult>,
}

impl RawResultSet {
    /// Create a result set.
    pub fn new(task_id: TaskId, model_results: Vec<ModelResult>) -> Self {
        Self {
            task_id,
            model_results,
        }
    }

    /// Create an empty result set.
    pub fn empty(task_id: TaskId) -> Self {
        Self::new(task_id, Vec::new())
    }

    /// Whether no model reported anything.
    pub fn is_empty(&self) -> bool {
        self.model_results.is_empty()
    }
}
