// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Total ordering of model results.

use crate::result::ModelResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A model result with its position in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedModel {
    /// 1-based rank.
    pub rank: usize,
    /// Model identifier.
    pub model_id: String,
    /// Display name.
    pub model_name: String,
    /// Provider type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    /// Cases that produced a result.
    pub completed_cases: u64,
    /// Cases that errored.
    pub failed_cases: u64,
    /// Aggregate score, 0-100.
    pub score: Option<f64>,
    /// Mean response time in seconds.
    pub average_response_time: Option<f64>,
    /// Share of successful calls, 0-100.
    pub success_rate: Option<f64>,
    /// Price in USD per 1K tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_1k_tokens: Option<f64>,
}

impl RankedModel {
    fn from_result(rank: usize, result: &ModelResult) -> Self {
        Self {
            rank,
            model_id: result.model_id.clone(),
            model_name: result.model_name.clone(),
            provider_type: result.provider_type.clone(),
            completed_cases: result.completed_cases,
            failed_cases: result.failed_cases,
            score: result.valid_score(),
            average_response_time: result.average_response_time.filter(|t| t.is_finite()),
            success_rate: result.success_rate.filter(|r| r.is_finite()),
            cost_per_1k_tokens: result.cost_per_1k_tokens.filter(|c| c.is_finite()),
        }
    }
}

/// Higher first; absent last.
fn desc_present_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Lower first; absent last.
fn asc_present_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ranking order: score descending, then response time ascending, then
/// model name, then model ID.
pub fn compare_results(a: &ModelResult, b: &ModelResult) -> Ordering {
    desc_present_first(a.valid_score(), b.valid_score())
        .then_with(|| {
            asc_present_first(
                a.average_response_time.filter(|t| t.is_finite()),
                b.average_response_time.filter(|t| t.is_finite()),
            )
        })
        .then_with(|| a.model_name.cmp(&b.model_name))
        .then_with(|| a.model_id.cmp(&b.model_id))
}

/// Sort results into ranking order. The input order does not matter.
pub fn rank(results: &[ModelResult]) -> Vec<&ModelResult> {
    let mut ordered: Vec<&ModelResult> = results.iter().collect();
    ordered.sort_by(|a, b| compare_results(a, b));
    ordered
}

/// Ranked entries with their 1-based positions.
pub(crate) fn ranked_models(ordered: &[&ModelResult]) -> Vec<RankedModel> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, r)| RankedModel::from_result(i + 1, r))
        .collect()
}
