// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reading and writing report files.
//!
//! [`write_all_outputs`] lays a report out in a directory:
//!
//! ```text
//! <dir>/report.json        full report
//! <dir>/summary.md         markdown summary and chart tables
//! <dir>/raw/<model>.json   one ranked entry per model
//! <dir>/summary.csv        metric,value rows
//! <dir>/cases.csv          one row per model and case
//! ```

use crate::markdown;
use crate::{Error, Result};
use llm_evalbench_core::report::{rank, Report};
use llm_evalbench_core::RawResultSet;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Default root of report directories.
pub const OUTPUT_DIR: &str = "evalbench-output";

/// File name of the JSON report.
pub const REPORT_FILE: &str = "report.json";

/// File name of the markdown summary.
pub const SUMMARY_FILE: &str = "summary.md";

/// Sub-directory holding one file per model.
pub const RAW_DIR: &str = "raw";

/// File name of the metric/value CSV.
pub const SUMMARY_CSV_FILE: &str = "summary.csv";

/// File name of the per-case CSV.
pub const CASES_CSV_FILE: &str = "cases.csv";

/// Which files [`write_all_outputs`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `report.json` and the per-model files.
    Json,
    /// `summary.md` only.
    Markdown,
    /// JSON and markdown.
    #[default]
    Both,
    /// `summary.csv`, plus `cases.csv` when raw results are at hand.
    Csv,
    /// Every file.
    All,
}

impl OutputFormat {
    fn includes_json(self) -> bool {
        matches!(self, Self::Json | Self::Both | Self::All)
    }

    fn includes_markdown(self) -> bool {
        matches!(self, Self::Markdown | Self::Both | Self::All)
    }

    fn includes_csv(self) -> bool {
        matches!(self, Self::Csv | Self::All)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "both" => Ok(Self::Both),
            "csv" => Ok(Self::Csv),
            "all" => Ok(Self::All),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

/// Default directory for a task's report.
pub fn default_output_dir(report: &Report) -> PathBuf {
    Path::new(OUTPUT_DIR).join(file_stem(report.task_id.as_str()))
}

fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Write the full report as pretty-printed JSON.
pub fn write_report_json(report: &Report, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    Ok(())
}

/// Write the markdown summary with chart tables.
pub fn write_report_markdown(report: &Report, path: impl AsRef<Path>) -> Result<()> {
    fs::write(path, markdown::generate_detailed_report(report))?;
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

/// Write the report summary as `metric,value` rows. Absent values are empty.
pub fn write_summary_csv(report: &Report, path: impl AsRef<Path>) -> Result<()> {
    let summary = &report.summary;
    let rows = [
        ("task_id", report.task_id.to_string()),
        ("task_name", report.task_name.clone()),
        ("benchmark_id", report.benchmark_id.clone()),
        ("status", report.status.to_string()),
        ("total_models", summary.total_models.to_string()),
        ("total_completed", summary.total_completed.to_string()),
        ("total_failed", summary.total_failed.to_string()),
        ("average_score", cell(summary.average_score)),
        ("median_score", cell(summary.median_score)),
        ("min_score", cell(summary.min_score)),
        ("max_score", cell(summary.max_score)),
        ("score_std_dev", cell(summary.score_std_dev)),
        ("average_execution_time", cell(summary.average_execution_time)),
        ("total_execution_time", cell(summary.total_execution_time)),
        ("total_duration_secs", cell(summary.total_duration_secs)),
    ];

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["metric", "value"])?;
    for (metric, value) in rows {
        writer.write_record([metric, value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct CaseRow<'a> {
    model_id: &'a str,
    case_id: &'a str,
    score: Option<f64>,
    execution_time: Option<f64>,
    passed: Option<bool>,
}

/// Write one row per model and case, models in ranking order.
pub fn write_cases_csv(results: &RawResultSet, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for model in rank(&results.model_results) {
        for case in &model.cases {
            writer.serialize(CaseRow {
                model_id: &model.model_id,
                case_id: &case.case_id,
                score: case.score,
                execution_time: case.execution_time,
                passed: case.passed,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_raw_models(report: &Report, dir: &Path) -> Result<Vec<PathBuf>> {
    let raw_dir = dir.join(RAW_DIR);
    fs::create_dir_all(&raw_dir)?;
    report
        .model_results
        .iter()
        .map(|model| -> Result<PathBuf> {
            let path = raw_dir.join(format!("{}.json", file_stem(&model.model_id)));
            fs::write(&path, serde_json::to_string_pretty(model)?)?;
            Ok(path)
        })
        .collect()
}

/// Write the files selected by `format` into `dir`, creating it if needed.
/// `cases.csv` needs the raw results and is skipped without them.
/// Returns the written paths.
pub fn write_all_outputs(
    report: &Report,
    results: Option<&RawResultSet>,
    dir: impl AsRef<Path>,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    if format.includes_json() {
        let path = dir.join(REPORT_FILE);
        write_report_json(report, &path)?;
        written.push(path);
        written.extend(write_raw_models(report, dir)?);
    }
    if format.includes_markdown() {
        let path = dir.join(SUMMARY_FILE);
        write_report_markdown(report, &path)?;
        written.push(path);
    }
    if format.includes_csv() {
        let path = dir.join(SUMMARY_CSV_FILE);
        write_summary_csv(report, &path)?;
        written.push(path);
        if let Some(results) = results {
            let path = dir.join(CASES_CSV_FILE);
            write_cases_csv(results, &path)?;
            written.push(path);
        }
    }

    debug!(task_id = %report.task_id, dir = %dir.display(), files = written.len(), "Report written");
    Ok(written)
}

/// Read a report written by [`write_report_json`].
pub fn read_report_json(path: impl AsRef<Path>) -> Result<Report> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{sample_report, sample_results};

    #[test]
    fn test_write_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();

        let written = write_all_outputs(&report, None, dir.path(), OutputFormat::Both).unwrap();
        assert_eq!(written.len(), 4);
        assert!(dir.path().join(REPORT_FILE).exists());
        assert!(dir.path().join(SUMMARY_FILE).exists());
        assert!(dir.path().join(RAW_DIR).join("model-a.json").exists());

        let read = read_report_json(dir.path().join(REPORT_FILE)).unwrap();
        assert_eq!(read, report);
    }

    #[test]
    fn test_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            write_all_outputs(&sample_report(), None, dir.path(), OutputFormat::Markdown).unwrap();
        assert_eq!(written, vec![dir.path().join(SUMMARY_FILE)]);
        assert!(!dir.path().join(REPORT_FILE).exists());
    }

    #[test]
    fn test_output_is_stable_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        write_report_json(&report, &first).unwrap();
        write_report_json(&report, &second).unwrap();
        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("all".parse::<OutputFormat>().unwrap(), OutputFormat::All);
        assert!("pdf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_default_output_dir_sanitizes_id() {
        let mut report = sample_report();
        report.task_id = llm_evalbench_core::TaskId::new("runs/42");
        assert_eq!(
            default_output_dir(&report),
            Path::new(OUTPUT_DIR).join("runs_42")
        );
    }

    #[test]
    fn test_csv_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        let results = sample_results();

        let written =
            write_all_outputs(&report, Some(&results), dir.path(), OutputFormat::Csv).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join(SUMMARY_CSV_FILE), dir.path().join(CASES_CSV_FILE)]
        );

        let summary = fs::read_to_string(dir.path().join(SUMMARY_CSV_FILE)).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "metric,value");
        assert!(lines.contains(&"task_id,42"));
        assert!(lines.contains(&"average_score,84"));
        assert!(lines.contains(&"average_execution_time,2"));
        assert!(lines.contains(&"total_execution_time,4"));

        let cases = fs::read_to_string(dir.path().join(CASES_CSV_FILE)).unwrap();
        let lines: Vec<&str> = cases.lines().collect();
        assert_eq!(lines[0], "model_id,case_id,score,execution_time,passed");
        // Model A ranks first even though B comes first in the raw set.
        assert_eq!(lines[1], "model-a,c1,95.0,1.5,true");
        assert_eq!(lines[2], "model-a,c2,,,");
        assert_eq!(lines[3], "model-b,c1,70.5,2.5,false");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_csv_without_raw_results_writes_summary_only() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            write_all_outputs(&sample_report(), None, dir.path(), OutputFormat::Csv).unwrap();
        assert_eq!(written, vec![dir.path().join(SUMMARY_CSV_FILE)]);
        assert!(!dir.path().join(CASES_CSV_FILE).exists());
    }

    #[test]
    fn test_all_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let results = sample_results();
        let written =
            write_all_outputs(&sample_report(), Some(&results), dir.path(), OutputFormat::All)
                .unwrap();
        assert_eq!(written.len(), 6);
    }
}
