// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Report output for LLM EvalBench.
//!
//! Turns an aggregated [`Report`] into files a person can read or another
//! tool can load.
//!
//! # Modules
//!
//! - [`markdown`] - markdown summary and chart tables
//! - [`io`] - JSON, markdown and CSV writers, report directory layout

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod io;
pub mod markdown;

pub use io::{
    read_report_json, write_all_outputs, write_cases_csv, write_report_json, write_report_markdown,
    write_summary_csv, OutputFormat,
};
pub use llm_evalbench_core::report::Report;
pub use markdown::{generate_detailed_report, generate_summary};

use thiserror::Error;

/// Errors produced while writing or reading reports.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Output format name not recognized.
    #[error("Unknown output format '{0}' (expected json, markdown, both, csv or all)")]
    UnknownFormat(String),
}

/// Result type for report output.
pub type Result<T> = std::result::Result<T, Error>;
