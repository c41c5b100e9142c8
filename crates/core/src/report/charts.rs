// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chartable series derived from ranked results.
//!
//! Every series is a projection of what the execution service reported.
//! When a model lacks the raw field a series needs, that model is left out
//! of the series; nothing is estimated or filled in.

use crate::result::ModelResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One point of a model's score trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// 1-based position among the model's scored cases.
    pub index: usize,
    /// Benchmark case.
    pub case_id: String,
    /// Score of this case.
    pub score: f64,
    /// Mean score of all cases up to and including this one.
    pub running_average: f64,
}

/// Axes of the multi-metric comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadarAxis {
    /// Aggregate score.
    Accuracy,
    /// Inverse of the mean response time.
    Speed,
    /// Score per dollar.
    CostEfficiency,
    /// Success rate.
    Reliability,
}

impl RadarAxis {
    /// All axes in display order.
    pub const ALL: [RadarAxis; 4] = [
        RadarAxis::Accuracy,
        RadarAxis::Speed,
        RadarAxis::CostEfficiency,
        RadarAxis::Reliability,
    ];

    /// Axis name used as the series key.
    pub fn as_str(self) -> &'static str {
        match self {
            RadarAxis::Accuracy => "accuracy",
            RadarAxis::Speed => "speed",
            RadarAxis::CostEfficiency => "cost_efficiency",
            RadarAxis::Reliability => "reliability",
        }
    }

    fn raw_value(self, result: &ModelResult) -> Option<f64> {
        let value = match self {
            RadarAxis::Accuracy => result.valid_score(),
            RadarAxis::Speed => result
                .average_response_time
                .filter(|t| t.is_finite() && *t > 0.0)
                .map(|t| 1.0 / t),
            RadarAxis::CostEfficiency => efficiency_ratio(result),
            RadarAxis::Reliability => result.success_rate,
        };
        value.filter(|v| v.is_finite())
    }
}

/// One model on the cost-vs-performance scatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPerformancePoint {
    /// Series key of the model.
    pub model: String,
    /// Price in USD per 1K tokens.
    pub cost_per_1k: f64,
    /// Aggregate score.
    pub performance_score: f64,
    /// Score per dollar, absent for free models.
    pub efficiency_ratio: Option<f64>,
}

/// One operating point of a ROC curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    /// Score threshold; `None` for the origin (nothing predicted as pass).
    pub threshold: Option<f64>,
    /// False positive rate.
    pub fpr: f64,
    /// True positive rate.
    pub tpr: f64,
}

/// ROC curve of a model's case scores against the case verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    /// Points ordered by decreasing threshold.
    pub points: Vec<RocPoint>,
    /// Area under the curve (trapezoidal).
    pub auc: f64,
}

/// Confusion counts of "score at or above threshold" against case verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    /// Passed cases scored at or above the threshold.
    pub tp: u64,
    /// Failed cases scored at or above the threshold.
    pub fp: u64,
    /// Passed cases scored below the threshold.
    #[serde(rename = "fn")]
    pub fn_: u64,
    /// Failed cases scored below the threshold.
    pub tn: u64,
}

impl ConfusionCounts {
    /// Share of correctly classified cases.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.tp + self.fp + self.fn_ + self.tn;
        (total > 0).then(|| (self.tp + self.tn) as f64 / total as f64)
    }

    /// Share of cases at or above the threshold that actually passed.
    pub fn precision(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Share of passed cases scored at or above the threshold.
    pub fn recall(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Harmonic mean of precision and recall.
    pub fn f1(&self) -> Option<f64> {
        let (p, r) = (self.precision()?, self.recall()?);
        (p + r > 0.0).then(|| 2.0 * p * r / (p + r))
    }
}

fn ratio(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

/// A score band of the distribution histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    /// Band label.
    pub name: String,
    /// Score range, for display.
    pub range: String,
    /// Scores in the band.
    pub count: u64,
}

/// All chart series of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    /// Running-average score per model, keyed by model.
    pub time_series: BTreeMap<String, Vec<TimeSeriesPoint>>,
    /// Normalized metric values (0-100), keyed by axis then model.
    pub radar: BTreeMap<String, BTreeMap<String, f64>>,
    /// Cost against score, in ranking order.
    pub cost_performance: Vec<CostPerformancePoint>,
    /// ROC curves, keyed by model.
    pub roc: BTreeMap<String, RocCurve>,
    /// Confusion counts, keyed by model.
    pub confusion: BTreeMap<String, ConfusionCounts>,
    /// Histogram of case scores (model scores when no case data exists).
    pub score_distribution: Vec<ScoreBucket>,
}

impl ChartSeries {
    /// Derive every series from results in ranking order.
    pub fn derive(ranked: &[&ModelResult], confusion_threshold: f64) -> Self {
        let keys = series_keys(ranked);
        let keyed = || ranked.iter().zip(keys.iter());

        let time_series = keyed()
            .filter_map(|(r, key)| time_series(r).map(|s| (key.clone(), s)))
            .collect();

        let cost_performance = keyed()
            .filter_map(|(r, key)| {
                let cost = r.cost_per_1k_tokens.filter(|c| c.is_finite() && *c >= 0.0)?;
                let score = r.valid_score()?;
                Some(CostPerformancePoint {
                    model: key.clone(),
                    cost_per_1k: cost,
                    performance_score: score,
                    efficiency_ratio: efficiency_ratio(r),
                })
            })
            .collect();

        let roc = keyed()
            .filter_map(|(r, key)| roc_curve(r).map(|c| (key.clone(), c)))
            .collect();

        let confusion = keyed()
            .filter_map(|(r, key)| confusion_counts(r, confusion_threshold).map(|c| (key.clone(), c)))
            .collect();

        Self {
            time_series,
            radar: radar(ranked, &keys),
            cost_performance,
            roc,
            confusion,
            score_distribution: score_distribution(ranked),
        }
    }

    /// Whether no series has any data.
    pub fn is_empty(&self) -> bool {
        self.time_series.is_empty()
            && self.radar.is_empty()
            && self.cost_performance.is_empty()
            && self.roc.is_empty()
            && self.confusion.is_empty()
            && self.score_distribution.is_empty()
    }
}

/// Series keys: the model name, qualified with the model ID when two
/// models share a name.
fn series_keys(ranked: &[&ModelResult]) -> Vec<String> {
    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for r in ranked {
        *name_counts.entry(r.model_name.as_str()).or_default() += 1;
    }
    ranked
        .iter()
        .map(|r| {
            if name_counts[r.model_name.as_str()] > 1 {
                format!("{} ({})", r.model_name, r.model_id)
            } else {
                r.model_name.clone()
            }
        })
        .collect()
}

fn efficiency_ratio(result: &ModelResult) -> Option<f64> {
    let cost = result.cost_per_1k_tokens.filter(|c| c.is_finite() && *c > 0.0)?;
    let score = result.valid_score()?;
    Some(score / (cost * 1000.0))
}

fn time_series(result: &ModelResult) -> Option<Vec<TimeSeriesPoint>> {
    let mut sum = 0.0;
    let points: Vec<TimeSeriesPoint> = result
        .cases
        .iter()
        .filter_map(|c| c.score.filter(|s| s.is_finite()).map(|s| (c, s)))
        .enumerate()
        .map(|(i, (case, score))| {
            sum += score;
            TimeSeriesPoint {
                index: i + 1,
                case_id: case.case_id.clone(),
                score,
                running_average: sum / (i + 1) as f64,
            }
        })
        .collect();
    (!points.is_empty()).then_some(points)
}

/// Normalize each axis to 0-100 against the best value observed in the set.
fn radar(ranked: &[&ModelResult], keys: &[String]) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut axes = BTreeMap::new();
    for axis in RadarAxis::ALL {
        let values: Vec<(&String, f64)> = ranked
            .iter()
            .zip(keys)
            .filter_map(|(r, key)| axis.raw_value(r).map(|v| (key, v)))
            .collect();
        if values.is_empty() {
            continue;
        }
        let max = values.iter().map(|(_, v)| *v).fold(f64::MIN, f64::max);
        let normalized = values
            .into_iter()
            .map(|(key, v)| {
                let scaled = if max > 0.0 { v / max * 100.0 } else { 0.0 };
                (key.clone(), scaled.clamp(0.0, 100.0))
            })
            .collect();
        axes.insert(axis.as_str().to_string(), normalized);
    }
    axes
}

/// Scored cases that carry a verdict.
fn labelled_cases(result: &ModelResult) -> Vec<(f64, bool)> {
    result
        .cases
        .iter()
        .filter_map(|c| match (c.score, c.passed) {
            (Some(s), Some(p)) if s.is_finite() => Some((s, p)),
            _ => None,
        })
        .collect()
}

const ROC_STEP: usize = 5;

fn roc_curve(result: &ModelResult) -> Option<RocCurve> {
    let cases = labelled_cases(result);
    let positives = cases.iter().filter(|(_, p)| *p).count();
    let negatives = cases.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut points = vec![RocPoint {
        threshold: None,
        fpr: 0.0,
        tpr: 0.0,
    }];
    for t in (0..=100).rev().step_by(ROC_STEP) {
        let threshold = t as f64;
        let tp = cases.iter().filter(|(s, p)| *p && *s >= threshold).count();
        let fp = cases.iter().filter(|(s, p)| !*p && *s >= threshold).count();
        points.push(RocPoint {
            threshold: Some(threshold),
            fpr: fp as f64 / negatives as f64,
            tpr: tp as f64 / positives as f64,
        });
    }

    let auc = points
        .windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[0].tpr + w[1].tpr) / 2.0)
        .sum();
    Some(RocCurve { points, auc })
}

fn confusion_counts(result: &ModelResult, threshold: f64) -> Option<ConfusionCounts> {
    let cases = labelled_cases(result);
    if cases.is_empty() {
        return None;
    }
    let mut counts = ConfusionCounts::default();
    for (score, passed) in cases {
        match (score >= threshold, passed) {
            (true, true) => counts.tp += 1,
            (true, false) => counts.fp += 1,
            (false, true) => counts.fn_ += 1,
            (false, false) => counts.tn += 1,
        }
    }
    Some(counts)
}

const SCORE_BANDS: [(&str, &str, f64); 5] = [
    ("Excellent", "90-100", 90.0),
    ("Good", "80-89", 80.0),
    ("Fair", "70-79", 70.0),
    ("Poor", "60-69", 60.0),
    ("Failed", "<60", f64::NEG_INFINITY),
];

fn score_distribution(ranked: &[&ModelResult]) -> Vec<ScoreBucket> {
    let case_scores: Vec<f64> = ranked.iter().flat_map(|r| r.case_scores()).collect();
    let scores = if case_scores.is_empty() {
        ranked.iter().filter_map(|r| r.valid_score()).collect()
    } else {
        case_scores
    };
    if scores.is_empty() {
        return Vec::new();
    }

    let mut counts = [0u64; SCORE_BANDS.len()];
    for score in scores {
        if let Some(i) = SCORE_BANDS.iter().position(|(_, _, lower)| score >= *lower) {
            counts[i] += 1;
        }
    }
    SCORE_BANDS
        .iter()
        .zip(counts)
        .map(|((name, range, _), count)| ScoreBucket {
            name: format!("{} ({})", name, range),
            range: range.to_string(),
            count,
        })
        .collect()
}
