// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`evalbench.toml` in the working directory, or an explicit path)
//! 3. environment variables prefixed with `EVALBENCH_` (for example
//!    `EVALBENCH_BASE_URL`), after loading a `.env` file if one exists

use crate::{Error, Result};
use backon::ExponentialBuilder;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// File consulted when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "evalbench.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "EVALBENCH";

/// Settings for talking to the execution service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root of the execution service.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_token: Option<String>,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Progress poll interval of a task detail view.
    pub detail_poll_interval_ms: u64,
    /// Task list refresh interval.
    pub list_refresh_interval_ms: u64,
    /// Consecutive poll failures before polling is reported as degraded.
    pub max_transient_failures: u32,
    /// First delay when results are not ready yet.
    pub results_backoff_initial_ms: u64,
    /// Upper bound of the results backoff delay.
    pub results_backoff_max_ms: u64,
    /// Total attempts to fetch results, including the first.
    pub results_max_attempts: usize,
    /// Score at or above which a case is predicted to pass.
    pub confusion_threshold: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            api_token: None,
            request_timeout_ms: 30_000,
            detail_poll_interval_ms: 2_000,
            list_refresh_interval_ms: 5_000,
            max_transient_failures: 5,
            results_backoff_initial_ms: 500,
            results_backoff_max_ms: 8_000,
            results_max_attempts: 6,
            confusion_threshold: 60.0,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default locations.
    ///
    /// `path` replaces the default file; unlike the default file it must
    /// exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded environment file");
        }

        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".into()));
        }
        let intervals = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("detail_poll_interval_ms", self.detail_poll_interval_ms),
            ("list_refresh_interval_ms", self.list_refresh_interval_ms),
            ("results_backoff_initial_ms", self.results_backoff_initial_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }
        if self.results_backoff_max_ms < self.results_backoff_initial_ms {
            return Err(Error::Config(
                "results_backoff_max_ms must not be below results_backoff_initial_ms".into(),
            ));
        }
        if self.results_max_attempts == 0 {
            return Err(Error::Config("results_max_attempts must be at least 1".into()));
        }
        if !(0.0..=100.0).contains(&self.confusion_threshold) {
            return Err(Error::Config(format!(
                "confusion_threshold {} is outside 0..=100",
                self.confusion_threshold
            )));
        }
        Ok(())
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Detail view poll interval.
    pub fn detail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.detail_poll_interval_ms)
    }

    /// List refresh interval.
    pub fn list_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.list_refresh_interval_ms)
    }

    /// Backoff used while results are not ready.
    pub fn results_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.results_backoff_initial_ms))
            .with_max_delay(Duration::from_millis(self.results_backoff_max_ms))
            .with_factor(2.0)
            .with_max_times(self.results_max_attempts.saturating_sub(1))
    }
}
