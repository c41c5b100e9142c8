// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time progress of a running task.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Model the execution service is currently working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentModel {
    /// Model ID.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Provider type (`openai`, `anthropic`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
}

/// Case counts for a running task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Cases in the whole run (all models).
    pub total_cases: u64,
    /// Cases that produced a result.
    pub completed_cases: u64,
    /// Cases that errored.
    #[serde(default)]
    pub failed_cases: u64,
    /// Model currently being exercised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model: Option<CurrentModel>,
}

impl ProgressSnapshot {
    /// Create a snapshot from raw counts.
    pub fn new(total_cases: u64, completed_cases: u64, failed_cases: u64) -> Self {
        Self {
            total_cases,
            completed_cases,
            failed_cases,
            current_model: None,
        }
    }

    /// Attach the model currently being exercised.
    pub fn with_current_model(mut self, model: CurrentModel) -> Self {
        self.current_model = Some(model);
        self
    }

    /// Cases processed so far, successful or not.
    pub fn processed_cases(&self) -> u64 {
        self.completed_cases.saturating_add(self.failed_cases)
    }

    /// Share of processed cases, in percent. Zero when nothing is planned.
    pub fn percentage(&self) -> f64 {
        if self.total_cases == 0 {
            return 0.0;
        }
        self.processed_cases() as f64 * 100.0 / self.total_cases as f64
    }

    /// Check `completed + failed <= total`.
    pub fn validate(&self) -> Result<()> {
        let processed = self
            .completed_cases
            .checked_add(self.failed_cases)
            .ok_or_else(|| Error::InvalidProgress("case counts overflow".to_string()))?;
        if processed > self.total_cases {
            return Err(Error::InvalidProgress(format!(
                "completed ({}) + failed ({}) exceeds total ({})",
                self.completed_cases, self.failed_cases, self.total_cases
            )));
        }
        Ok(())
    }
}

/// Accept either a full snapshot or a bare percentage for `TestTask::progress`.
///
/// Task list records carry progress as a plain number; only the progress
/// endpoint returns case counts. A bare number carries no counts, so it is
/// dropped rather than turned into a synthetic snapshot.
pub(crate) fn deserialize_lenient<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<ProgressSnapshot>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Snapshot(ProgressSnapshot),
        Percent(#[allow(dead_code)] f64),
    }

    Ok(match Option::<Wire>::deserialize(deserializer)? {
        Some(Wire::Snapshot(snapshot)) => Some(snapshot),
        Some(Wire::Percent(_)) | None => None,
    })
}
