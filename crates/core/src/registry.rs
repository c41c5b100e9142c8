// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configured model providers and benchmarks.
//!
//! Both registries are read-mostly lookup tables consulted when a task is
//! built. They keep entries ordered by ID so listings are stable.

use crate::task::{BenchmarkId, ModelId, TaskSpec, ValidatedSpec};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider identifier.
pub type ProviderId = String;

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiModel {
    /// Model ID.
    pub id: ModelId,
    /// Provider-side model name (`gpt-4-turbo`, ...).
    pub name: String,
    /// Model family or modality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// Price in USD per 1K tokens, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_1k_tokens: Option<f64>,
    /// Whether the model may be selected for new tasks.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// A configured model provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProvider {
    /// Provider ID.
    pub id: ProviderId,
    /// Display name.
    pub name: String,
    /// Provider type (`openai`, `anthropic`, `google`, `deepseek`, `ollama`).
    pub provider_type: String,
    /// Custom API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    /// Whether the provider may be used for new tasks.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Models exposed by this provider.
    #[serde(default)]
    pub models: Vec<AiModel>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A benchmark dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    /// Benchmark ID.
    pub id: BenchmarkId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Benchmark type (`elecbench`, `engibench`, `custom`, ...).
    pub benchmark_type: String,
    /// Whether the benchmark may be used for new tasks.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Registry of model providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, ModelProvider>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a provider. Returns the previous entry.
    pub fn upsert(&mut self, provider: ModelProvider) -> Option<ModelProvider> {
        self.providers.insert(provider.id.clone(), provider)
    }

    /// Look up a provider.
    pub fn get(&self, id: &str) -> Option<&ModelProvider> {
        self.providers.get(id)
    }

    /// Remove a provider and its models.
    pub fn remove(&mut self, id: &str) -> Option<ModelProvider> {
        self.providers.remove(id)
    }

    /// All providers, ordered by ID.
    pub fn list(&self) -> impl Iterator<Item = &ModelProvider> {
        self.providers.values()
    }

    /// Active providers, ordered by ID.
    pub fn active(&self) -> impl Iterator<Item = &ModelProvider> {
        self.providers.values().filter(|p| p.is_active)
    }

    /// Find a model and its provider by model ID.
    pub fn resolve_model(&self, model_id: &str) -> Option<(&ModelProvider, &AiModel)> {
        self.providers.values().find_map(|provider| {
            provider
                .models
                .iter()
                .find(|m| m.id == model_id)
                .map(|model| (provider, model))
        })
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Registry of benchmarks.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkRegistry {
    benchmarks: BTreeMap<BenchmarkId, Benchmark>,
}

impl BenchmarkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a benchmark. Returns the previous entry.
    pub fn upsert(&mut self, benchmark: Benchmark) -> Option<Benchmark> {
        self.benchmarks.insert(benchmark.id.clone(), benchmark)
    }

    /// Look up a benchmark.
    pub fn get(&self, id: &str) -> Option<&Benchmark> {
        self.benchmarks.get(id)
    }

    /// Remove a benchmark.
    pub fn remove(&mut self, id: &str) -> Option<Benchmark> {
        self.benchmarks.remove(id)
    }

    /// All benchmarks, ordered by ID.
    pub fn list(&self) -> impl Iterator<Item = &Benchmark> {
        self.benchmarks.values()
    }

    /// Active benchmarks, ordered by ID.
    pub fn active(&self) -> impl Iterator<Item = &Benchmark> {
        self.benchmarks.values().filter(|b| b.is_active)
    }

    /// Number of benchmarks.
    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }
}

impl TaskSpec {
    /// Validate the spec and check that every referenced benchmark and model
    /// exists and is active.
    pub fn validate_against(
        &self,
        providers: &ProviderRegistry,
        benchmarks: &BenchmarkRegistry,
    ) -> Result<ValidatedSpec> {
        let spec = self.validate()?;

        match benchmarks.get(&spec.benchmark_id) {
            Some(b) if b.is_active => {}
            Some(_) => {
                return Err(Error::validation(format!(
                    "benchmark {} is inactive",
                    spec.benchmark_id
                )))
            }
            None => {
                return Err(Error::validation(format!(
                    "benchmark {} not found",
                    spec.benchmark_id
                )))
            }
        }

        let unavailable: Vec<&str> = spec
            .model_ids
            .iter()
            .filter(|id| {
                !matches!(
                    providers.resolve_model(id),
                    Some((p, m)) if p.is_active && m.is_active
                )
            })
            .map(String::as_str)
            .collect();
        if !unavailable.is_empty() {
            return Err(Error::validation(format!(
                "models not found or not accessible: {}",
                unavailable.join(", ")
            )));
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, active: bool) -> AiModel {
        AiModel {
            id: id.to_string(),
            name: id.to_string(),
            model_type: None,
            cost_per_1k_tokens: None,
            is_active: active,
        }
    }

    fn registries() -> (ProviderRegistry, BenchmarkRegistry) {
        let mut providers = ProviderRegistry::new();
        providers.upsert(ModelProvider {
            id: "p-openai".into(),
            name: "OpenAI".into(),
            provider_type: "openai".into(),
            api_endpoint: None,
            is_active: true,
            models: vec![model("gpt-4", true), model("gpt-3.5", false)],
            created_at: None,
        });
        providers.upsert(ModelProvider {
            id: "p-off".into(),
            name: "Disabled".into(),
            provider_type: "ollama".into(),
            api_endpoint: Some("http://localhost:11434".into()),
            is_active: false,
            models: vec![model("llama-2", true)],
            created_at: None,
        });

        let mut benchmarks = BenchmarkRegistry::new();
        benchmarks.upsert(Benchmark {
            id: "elec".into(),
            name: "ElecBench".into(),
            description: None,
            benchmark_type: "elecbench".into(),
            is_active: true,
        });
        (providers, benchmarks)
    }

    #[test]
    fn test_resolve_model() {
        let (providers, _) = registries();
        let (provider, model) = providers.resolve_model("gpt-4").unwrap();
        assert_eq!(provider.provider_type, "openai");
        assert_eq!(model.id, "gpt-4");
        assert!(providers.resolve_model("missing").is_none());
        assert_eq!(providers.active().count(), 1);
    }

    #[test]
    fn test_validate_against_accepts_known_ids() {
        let (providers, benchmarks) = registries();
        let spec = TaskSpec::new("run", "elec", ["gpt-4"]);
        assert!(spec.validate_against(&providers, &benchmarks).is_ok());
    }

    #[test]
    fn test_validate_against_rejects_unknown_benchmark() {
        let (providers, benchmarks) = registries();
        let spec = TaskSpec::new("run", "engi", ["gpt-4"]);
        let err = spec.validate_against(&providers, &benchmarks).unwrap_err();
        assert!(err.to_string().contains("engi"));
    }

    #[test]
    fn test_validate_against_rejects_inactive_models() {
        let (providers, benchmarks) = registries();
        let spec = TaskSpec::new("run", "elec", ["gpt-4", "gpt-3.5", "llama-2"]);
        let err = spec.validate_against(&providers, &benchmarks).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("gpt-3.5"));
        assert!(msg.contains("llama-2"));
        assert!(!msg.contains("gpt-4,"));
    }
}
