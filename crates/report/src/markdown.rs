// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown rendering of reports.
//!
//! Output depends only on the report, so the same report always renders to
//! the same text.

use llm_evalbench_core::report::{RadarAxis, Report};
use std::fmt::{self, Write};

const MISSING: &str = "-";

fn opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{:.*}", precision, v))
}

fn duration(secs: Option<f64>) -> String {
    let Some(secs) = secs else {
        return MISSING.to_string();
    };
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Generate the markdown summary of a report: task header, headline
/// numbers and the ranking table.
pub fn generate_summary(report: &Report) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = write_summary(&mut output, report);
    output
}

/// Generate the summary followed by a section per chart series.
pub fn generate_detailed_report(report: &Report) -> String {
    let mut output = generate_summary(report);
    let _ = write_charts(&mut output, report);
    output
}

fn write_summary(out: &mut String, report: &Report) -> fmt::Result {
    let summary = &report.summary;

    writeln!(out, "# Evaluation Report: {}", report.task_name)?;
    writeln!(out)?;
    writeln!(out, "- **Task:** {}", report.task_id)?;
    writeln!(out, "- **Benchmark:** {}", report.benchmark_id)?;
    writeln!(out, "- **Status:** {}", report.status)?;
    if let Some(started) = report.started_at {
        writeln!(out, "- **Started:** {}", started.format("%Y-%m-%d %H:%M:%S UTC"))?;
    }
    if let Some(completed) = report.completed_at {
        writeln!(out, "- **Completed:** {}", completed.format("%Y-%m-%d %H:%M:%S UTC"))?;
    }
    writeln!(out, "- **Duration:** {}", duration(summary.total_duration_secs))?;
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "| Metric | Value |")?;
    writeln!(out, "|--------|-------|")?;
    writeln!(out, "| Models | {} |", summary.total_models)?;
    writeln!(out, "| Completed cases | {} |", summary.total_completed)?;
    writeln!(out, "| Failed cases | {} |", summary.total_failed)?;
    writeln!(out, "| Average score | {} |", opt(summary.average_score, 2))?;
    writeln!(out, "| Median score | {} |", opt(summary.median_score, 2))?;
    writeln!(out, "| Best score | {} |", opt(summary.max_score, 2))?;
    writeln!(out, "| Worst score | {} |", opt(summary.min_score, 2))?;
    writeln!(out, "| Score std dev | {} |", opt(summary.score_std_dev, 2))?;
    writeln!(out, "| Avg case time (s) | {} |", opt(summary.average_execution_time, 3))?;
    writeln!(out, "| Total case time (s) | {} |", opt(summary.total_execution_time, 1))?;
    writeln!(out)?;

    writeln!(out, "## Ranking")?;
    writeln!(out)?;
    if report.model_results.is_empty() {
        writeln!(out, "No model produced results.")?;
        return Ok(());
    }
    writeln!(out, "| Rank | Model | Provider | Score | Avg response (s) | Success rate (%) | Completed | Failed |")?;
    writeln!(out, "|------|-------|----------|-------|------------------|------------------|-----------|--------|")?;
    for m in &report.model_results {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            m.rank,
            m.model_name,
            m.provider_type.as_deref().unwrap_or(MISSING),
            opt(m.score, 2),
            opt(m.average_response_time, 3),
            opt(m.success_rate, 1),
            m.completed_cases,
            m.failed_cases,
        )?;
    }
    Ok(())
}

fn write_charts(out: &mut String, report: &Report) -> fmt::Result {
    let charts = &report.charts;

    if !charts.radar.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Metric Comparison (0-100)")?;
        writeln!(out)?;
        let axes: Vec<RadarAxis> = RadarAxis::ALL
            .into_iter()
            .filter(|a| charts.radar.contains_key(a.as_str()))
            .collect();
        write!(out, "| Model |")?;
        for axis in &axes {
            write!(out, " {} |", axis.as_str())?;
        }
        writeln!(out)?;
        write!(out, "|-------|")?;
        for _ in &axes {
            write!(out, "------|")?;
        }
        writeln!(out)?;

        let mut models: Vec<&String> = charts.radar.values().flat_map(|m| m.keys()).collect();
        models.sort();
        models.dedup();
        for model in models {
            write!(out, "| {} |", model)?;
            for axis in &axes {
                let value = charts.radar.get(axis.as_str()).and_then(|m| m.get(model)).copied();
                write!(out, " {} |", opt(value, 1))?;
            }
            writeln!(out)?;
        }
    }

    if !charts.cost_performance.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Cost vs Performance")?;
        writeln!(out)?;
        writeln!(out, "| Model | Cost / 1K tokens | Score | Score per $ |")?;
        writeln!(out, "|-------|------------------|-------|-------------|")?;
        for p in &charts.cost_performance {
            writeln!(
                out,
                "| {} | {:.4} | {:.2} | {} |",
                p.model,
                p.cost_per_1k,
                p.performance_score,
                opt(p.efficiency_ratio, 3)
            )?;
        }
    }

    if !charts.confusion.is_empty() || !charts.roc.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Classification")?;
        writeln!(out)?;
        writeln!(out, "| Model | TP | FP | FN | TN | Accuracy | Precision | Recall | F1 | AUC |")?;
        writeln!(out, "|-------|----|----|----|----|----------|-----------|--------|----|-----|")?;
        let mut models: Vec<&String> = charts.confusion.keys().chain(charts.roc.keys()).collect();
        models.sort();
        models.dedup();
        for model in models {
            let counts = charts.confusion.get(model);
            let cell = |v: Option<u64>| v.map_or_else(|| MISSING.to_string(), |v| v.to_string());
            writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                model,
                cell(counts.map(|c| c.tp)),
                cell(counts.map(|c| c.fp)),
                cell(counts.map(|c| c.fn_)),
                cell(counts.map(|c| c.tn)),
                opt(counts.and_then(|c| c.accuracy()).map(|a| a * 100.0), 1),
                opt(counts.and_then(|c| c.precision()).map(|p| p * 100.0), 1),
                opt(counts.and_then(|c| c.recall()).map(|r| r * 100.0), 1),
                opt(counts.and_then(|c| c.f1()), 3),
                opt(charts.roc.get(model).map(|r| r.auc), 3),
            )?;
        }
    }

    if !charts.score_distribution.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Score Distribution")?;
        writeln!(out)?;
        writeln!(out, "| Band | Range | Count |")?;
        writeln!(out, "|------|-------|-------|")?;
        for bucket in &charts.score_distribution {
            writeln!(out, "| {} | {} | {} |", bucket.name, bucket.range, bucket.count)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_report;

    #[test]
    fn test_summary_lists_models_in_rank_order() {
        let md = generate_summary(&sample_report());
        let a = md.find("| 1 | Model A |").unwrap();
        let b = md.find("| 2 | Model B |").unwrap();
        assert!(a < b);
        assert!(md.contains("| Average score | 84.00 |"));
        assert!(md.contains("| Score std dev | 6.00 |"));
        assert!(md.contains("| Avg case time (s) | 2.000 |"));
        assert!(md.contains("- **Duration:** 2m 0s"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let report = sample_report();
        assert_eq!(generate_detailed_report(&report), generate_detailed_report(&report));
    }

    #[test]
    fn test_absent_values_render_as_dash() {
        let mut report = sample_report();
        report.model_results[1].average_response_time = None;
        let md = generate_summary(&report);
        assert!(md.contains("| 2 | Model B | - | 78.00 | - |"));
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(duration(None), "-");
        assert_eq!(duration(Some(42.4)), "42s");
        assert_eq!(duration(Some(3725.0)), "1h 2m 5s");
    }
}
