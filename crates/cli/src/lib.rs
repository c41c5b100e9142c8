// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI for LLM EvalBench.
//!
//! `evalbench` drives test tasks on an execution service: create and start
//! them, watch their progress, stop or retry them, and write the aggregated
//! report once they finish.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod output;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use llm_evalbench_client::{
    ClientConfig, HttpExecutionService, ProgressPoller, ResultFetcher, TaskController,
};
use llm_evalbench_core::report::AggregationOptions;
use llm_evalbench_core::{RepositoryEvent, TaskConfig, TaskId, TaskRepository, TaskSpec, TaskStatus};
use llm_evalbench_report::{io::default_output_dir, write_all_outputs, OutputFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// LLM EvalBench CLI.
#[derive(Parser, Debug)]
#[command(name = "evalbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./evalbench.toml when present).
    #[arg(short, long, global = true, env = "EVALBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a test task.
    Create {
        /// Task name.
        #[arg(short, long)]
        name: String,

        /// Benchmark to run.
        #[arg(short, long)]
        benchmark: String,

        /// Model to evaluate (repeatable).
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,

        /// Sampling temperature (0.0 - 2.0).
        #[arg(long)]
        temperature: Option<f64>,

        /// Maximum output tokens per case.
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Per-case timeout in seconds.
        #[arg(long)]
        timeout: Option<u32>,

        /// Cases sent concurrently.
        #[arg(long)]
        batch_size: Option<u32>,

        /// Start the task right away.
        #[arg(long)]
        start: bool,
    },

    /// Start a pending task.
    Start {
        /// Task ID.
        id: String,
    },

    /// Stop a pending or running task.
    Stop {
        /// Task ID.
        id: String,
    },

    /// Queue a failed or cancelled task again.
    Retry {
        /// Task ID.
        id: String,
    },

    /// Delete a finished task.
    Delete {
        /// Task ID.
        id: String,
    },

    /// List tasks.
    List {
        /// Only tasks with this status.
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// Follow a running task until it finishes.
    Watch {
        /// Task ID.
        id: String,
    },

    /// Fetch results of a finished task and write the report.
    Report {
        /// Task ID.
        id: String,

        /// Output directory (defaults to evalbench-output/<task id>).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: json, markdown, both, csv, or all.
        #[arg(short, long, default_value = "both")]
        format: OutputFormat,
    },
}

struct App {
    config: ClientConfig,
    controller: TaskController,
}

impl App {
    fn new(config: ClientConfig) -> Result<Self> {
        let service = HttpExecutionService::new(&config)?;
        let controller = TaskController::new(Arc::new(TaskRepository::new()), Arc::new(service));
        Ok(Self { config, controller })
    }

    async fn load(&self, id: &str) -> Result<TaskId> {
        let id = TaskId::new(id);
        self.controller
            .refresh_task(&id)
            .await
            .with_context(|| format!("failed to load task {}", id))?;
        Ok(id)
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

/// Run the CLI with the process arguments.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ClientConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!(base_url = %config.base_url, "Configuration loaded");
    let app = App::new(config)?;

    match cli.command {
        Commands::Create {
            name,
            benchmark,
            models,
            temperature,
            max_tokens,
            timeout,
            batch_size,
            start,
        } => {
            let spec = TaskSpec::new(name, benchmark, models).with_config(TaskConfig {
                temperature,
                max_tokens,
                timeout_secs: timeout,
                batch_size,
                ..Default::default()
            });
            let mut task = app.controller.create(&spec).await?;
            println!("{} task {}", "Created".green().bold(), task.id);
            if start {
                task = app.controller.start(&task.id).await?;
                println!("{} task {}", "Started".green().bold(), task.id);
            }
            println!("{}", output::task_details(&task));
        }
        Commands::Start { id } => {
            let id = app.load(&id).await?;
            let task = app.controller.start(&id).await?;
            println!("{} {}", "Started".green().bold(), output::task_line(&task));
        }
        Commands::Stop { id } => {
            let id = app.load(&id).await?;
            match app.controller.stop(&id).await {
                Ok(task) if task.is_terminal() => {
                    println!("{} {}", "Stopped".yellow().bold(), output::task_line(&task));
                }
                Ok(task) => {
                    println!("{} {}", "Stop requested".yellow().bold(), output::task_line(&task));
                }
                Err(e) if e.is_informational() => println!("{}", e),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Retry { id } => {
            let id = app.load(&id).await?;
            let task = app.controller.retry(&id).await?;
            println!("{} {}", "Queued".green().bold(), output::task_line(&task));
        }
        Commands::Delete { id } => {
            let id = app.load(&id).await?;
            app.controller.delete(&id).await?;
            println!("{} task {}", "Deleted".green().bold(), id);
        }
        Commands::List { status } => {
            let tasks = app.controller.refresh_list(status).await?;
            if tasks.is_empty() {
                println!("No tasks.");
            } else {
                println!("{}", output::task_header());
                for task in &tasks {
                    println!("{}", output::task_line(task));
                }
            }
            println!();
            println!("{}", output::statistics_line(&app.controller.repository().statistics()));
        }
        Commands::Watch { id } => watch(&app, &id).await?,
        Commands::Report { id, output, format } => report(&app, &id, output, format).await?,
    }

    Ok(())
}

async fn watch(app: &App, id: &str) -> Result<()> {
    let id = app.load(id).await?;
    let repository = app.controller.repository().clone();
    let task = repository
        .get(&id)
        .with_context(|| format!("task {} disappeared", id))?;
    if task.status != TaskStatus::Running {
        println!("{}", output::task_details(&task));
        return Ok(());
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=>-"),
    );
    if let Some(progress) = &task.progress {
        bar.set_position(progress.percentage().round() as u64);
    }

    let mut events = repository.subscribe();
    let handle = ProgressPoller::from_controller(&app.controller)
        .with_max_transient_failures(app.config.max_transient_failures)
        .spawn(id.clone(), app.config.detail_poll_interval());
    let finished = handle.finished();
    tokio::pin!(finished);

    loop {
        tokio::select! {
            _ = &mut finished => break,
            _ = tokio::signal::ctrl_c() => {
                bar.abandon_with_message("interrupted");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(RepositoryEvent::ProgressMerged { task_id, percentage }) if task_id == id => {
                    bar.set_position(percentage.round() as u64);
                    let current = repository
                        .get(&id)
                        .and_then(|t| t.progress)
                        .and_then(|p| p.current_model)
                        .map(|m| m.name);
                    if let Some(name) = current {
                        bar.set_message(name);
                    }
                }
                Ok(RepositoryEvent::PollDegraded { task_id, consecutive_failures, error }) if task_id == id => {
                    bar.println(format!(
                        "{} {} polls failed, still trying: {}",
                        "warning:".yellow().bold(),
                        consecutive_failures,
                        error
                    ));
                }
                Ok(RepositoryEvent::PollRecovered(task_id)) if task_id == id => {
                    bar.println(format!("{} connection restored", "info:".cyan().bold()));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    bar.finish_and_clear();
    let task = repository
        .get(&id)
        .with_context(|| format!("task {} disappeared", id))?;
    println!("{}", output::task_details(&task));
    Ok(())
}

async fn report(app: &App, id: &str, output: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let id = app.load(id).await?;
    let status = app.controller.repository().status_of(&id);
    if !status.is_some_and(TaskStatus::is_terminal) {
        bail!(
            "task {} is {}; reports are available once it finishes",
            id,
            status.map_or("unknown", TaskStatus::as_str)
        );
    }

    let fetcher = ResultFetcher::from_controller(&app.controller)
        .with_backoff(app.config.results_backoff());
    let options = AggregationOptions {
        confusion_threshold: app.config.confusion_threshold,
    };
    let report = fetcher.fetch_report(&id, options).await?;

    let results = app.controller.repository().results_of(&id);

    let dir = output.unwrap_or_else(|| default_output_dir(&report));
    let written = write_all_outputs(&report, results.as_ref(), &dir, format)?;

    println!("{}", llm_evalbench_report::generate_summary(&report));
    for path in written {
        println!("{} {}", "Wrote".green(), path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "evalbench", "create", "--name", "nightly", "--benchmark", "elecbench",
            "--model", "gpt-4o", "--model", "claude-3-5-sonnet", "--temperature", "0.2", "--start",
        ])
        .unwrap();
        match cli.command {
            Commands::Create { models, temperature, start, .. } => {
                assert_eq!(models, vec!["gpt-4o", "claude-3-5-sonnet"]);
                assert_eq!(temperature, Some(0.2));
                assert!(start);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_status_alias() {
        let cli = Cli::try_parse_from(["evalbench", "list", "--status", "stopped"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List { status: Some(TaskStatus::Cancelled) }
        ));
    }

    #[test]
    fn test_parse_report_format() {
        let cli = Cli::try_parse_from(["evalbench", "report", "42", "--format", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Report { format: OutputFormat::Json, .. }
        ));
        let cli = Cli::try_parse_from(["evalbench", "report", "42", "-f", "csv"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Report { format: OutputFormat::Csv, .. }
        ));
        assert!(Cli::try_parse_from(["evalbench", "report", "42", "--format", "pdf"]).is_err());
    }
}
