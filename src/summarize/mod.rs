//! Series summarization and sustained-threshold evaluation
//!
//! Reduces raw sample matrices into compact statistics and, when alert
//! evaluation is requested, measures how long each series stayed at or
//! above the configured thresholds.

use std::collections::HashMap;

use serde::Serialize;

use crate::client::{QueryData, RangeSeries, Sample};

/// Statistics for one series' valid samples
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sustain: Option<SustainReport>,
}

/// Sustained-threshold result for one tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SustainResult {
    pub threshold_pct: f64,
    /// Configured minimum duration for a breach
    pub min_duration_sec: i64,
    /// Longest observed run at or above the threshold
    pub max_duration_sec: f64,
    pub breached: bool,
}

/// Warning and critical tiers, evaluated independently
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SustainReport {
    pub warning: SustainResult,
    pub critical: SustainResult,
}

/// Threshold configuration attached to percent-style checks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertConfig {
    pub warn_pct: f64,
    pub crit_pct: f64,
    pub sustain_seconds: i64,
    pub step_seconds: i64,
}

/// One summarized series of a query response
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub metric: HashMap<String, String>,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Sample>>,
}

/// Reduce ordered samples to count/min/max/avg plus the last valid
/// point.
///
/// Samples whose value is unparseable or non-finite are skipped, not
/// fatal. Zero valid points yields a `{count: 0}` summary with no other
/// fields.
pub fn stats_from_values(values: &[Sample]) -> Summary {
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut last: Option<(f64, f64)> = None;

    for sample in values {
        if let Some(v) = sample.value() {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            last = Some((v, sample.timestamp()));
        }
    }

    if count == 0 {
        return Summary::default();
    }

    let (last_val, last_ts) = last.unwrap_or((0.0, 0.0));
    Summary {
        count,
        min: Some(min),
        max: Some(max),
        avg: Some(sum / count as f64),
        last: Some(last_val),
        last_ts: Some(last_ts),
        ..Summary::default()
    }
}

/// Longest contiguous span a series stayed at or above a threshold.
///
/// A run resets when the value drops below the threshold, when the gap
/// between consecutive timestamps exceeds 1.5x the nominal step (a data
/// gap is not a continued breach), or when a sample is unparseable.
pub fn max_sustain_duration(values: &[Sample], threshold: f64, step_seconds: i64) -> f64 {
    let gap_reset = std::cmp::max(1, (step_seconds as f64 * 1.5) as i64) as f64;
    let mut max_dur = 0.0f64;
    let mut active_start: Option<f64> = None;
    let mut last_ts: Option<f64> = None;

    for sample in values {
        let t = sample.timestamp();
        let Some(v) = sample.value() else {
            last_ts = None;
            active_start = None;
            continue;
        };

        if let Some(prev) = last_ts {
            if t - prev > gap_reset {
                active_start = None;
            }
        }

        if v >= threshold {
            let start = *active_start.get_or_insert(t);
            max_dur = max_dur.max(t - start);
        } else {
            active_start = None;
        }

        last_ts = Some(t);
    }

    max_dur
}

fn sustain_for(values: &[Sample], threshold: f64, config: &AlertConfig) -> SustainResult {
    let observed = max_sustain_duration(values, threshold, config.step_seconds);
    SustainResult {
        threshold_pct: threshold,
        min_duration_sec: config.sustain_seconds,
        max_duration_sec: observed,
        breached: observed >= config.sustain_seconds as f64,
    }
}

/// Summarize every series of a range-query matrix.
///
/// When an alert config is supplied, series with at least one valid
/// point also carry a two-tier sustain report. Raw samples are passed
/// through only when `include_samples` is set.
pub fn summarize_matrix(
    matrix: &[RangeSeries],
    include_samples: bool,
    alert_config: Option<&AlertConfig>,
) -> Vec<SeriesSummary> {
    matrix
        .iter()
        .map(|series| {
            let mut summary = stats_from_values(&series.values);
            if let Some(config) = alert_config {
                if summary.count > 0 {
                    summary.sustain = Some(SustainReport {
                        warning: sustain_for(&series.values, config.warn_pct, config),
                        critical: sustain_for(&series.values, config.crit_pct, config),
                    });
                }
            }
            SeriesSummary {
                metric: series.metric.clone(),
                summary,
                values: include_samples.then(|| series.values.clone()),
            }
        })
        .collect()
}

/// Summarize an instant-query result.
///
/// Vectors yield one single-sample summary per series; scalar and
/// string results yield a single summary with an empty label set. A
/// matrix (unexpected for instant mode) falls back to the range-mode
/// path without threshold evaluation.
pub fn summarize_instant(data: &QueryData, include_samples: bool) -> Vec<SeriesSummary> {
    match data {
        QueryData::Vector(series) => series
            .iter()
            .map(|s| {
                let samples = [s.value.clone()];
                SeriesSummary {
                    metric: s.metric.clone(),
                    summary: stats_from_values(&samples),
                    values: include_samples.then(|| samples.to_vec()),
                }
            })
            .collect(),
        QueryData::Scalar(sample) | QueryData::String(sample) => {
            let samples = [sample.clone()];
            vec![SeriesSummary {
                metric: HashMap::new(),
                summary: stats_from_values(&samples),
                values: include_samples.then(|| samples.to_vec()),
            }]
        }
        QueryData::Matrix(matrix) => summarize_matrix(matrix, include_samples, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InstantSeries;

    fn samples(points: &[(f64, &str)]) -> Vec<Sample> {
        points
            .iter()
            .map(|(ts, v)| Sample(*ts, v.to_string()))
            .collect()
    }

    #[test]
    fn test_stats_skip_malformed_samples() {
        let summary = stats_from_values(&samples(&[(0.0, "10"), (5.0, "bad"), (10.0, "20")]));
        assert_eq!(summary.count, 2);
        assert_eq!(summary.min, Some(10.0));
        assert_eq!(summary.max, Some(20.0));
        assert_eq!(summary.avg, Some(15.0));
        assert_eq!(summary.last, Some(20.0));
        assert_eq!(summary.last_ts, Some(10.0));
    }

    #[test]
    fn test_stats_skip_non_finite() {
        let summary = stats_from_values(&samples(&[(0.0, "inf"), (5.0, "NaN"), (10.0, "1")]));
        assert_eq!(summary.count, 1);
        assert_eq!(summary.avg, Some(1.0));
    }

    #[test]
    fn test_stats_empty_carries_only_count() {
        let summary = stats_from_values(&samples(&[(0.0, "x")]));
        assert_eq!(summary, Summary::default());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json, serde_json::json!({"count": 0}));
    }

    #[test]
    fn test_sustain_unbroken_run() {
        let values = samples(&[
            (0.0, "95"),
            (60.0, "95"),
            (120.0, "95"),
            (180.0, "95"),
            (240.0, "95"),
            (300.0, "95"),
        ]);
        assert_eq!(max_sustain_duration(&values, 90.0, 60), 300.0);
    }

    #[test]
    fn test_sustain_gap_resets_run() {
        // sample at t=120 missing: the 180s gap at t=240 exceeds the 90s
        // gap-reset threshold, so only the longest unbroken sub-run counts
        let values = samples(&[
            (0.0, "95"),
            (60.0, "95"),
            (240.0, "95"),
            (300.0, "95"),
        ]);
        assert_eq!(max_sustain_duration(&values, 90.0, 60), 60.0);
    }

    #[test]
    fn test_sustain_value_drop_resets_run() {
        let values = samples(&[
            (0.0, "95"),
            (60.0, "95"),
            (120.0, "50"),
            (180.0, "95"),
            (240.0, "95"),
        ]);
        assert_eq!(max_sustain_duration(&values, 90.0, 60), 60.0);
    }

    #[test]
    fn test_sustain_unparseable_resets_run_and_gap_reference() {
        let values = samples(&[
            (0.0, "95"),
            (60.0, "bad"),
            (120.0, "95"),
            (180.0, "95"),
        ]);
        assert_eq!(max_sustain_duration(&values, 90.0, 60), 60.0);
    }

    #[test]
    fn test_sustain_threshold_is_inclusive() {
        let values = samples(&[(0.0, "90"), (60.0, "90")]);
        assert_eq!(max_sustain_duration(&values, 90.0, 60), 60.0);
    }

    #[test]
    fn test_summarize_matrix_attaches_two_tier_sustain() {
        let matrix = vec![RangeSeries {
            metric: HashMap::from([("instance".to_string(), "a:9100".to_string())]),
            values: samples(&[(0.0, "96"), (60.0, "96"), (120.0, "96"), (180.0, "96")]),
        }];
        let config = AlertConfig {
            warn_pct: 85.0,
            crit_pct: 95.0,
            sustain_seconds: 120,
            step_seconds: 60,
        };

        let out = summarize_matrix(&matrix, false, Some(&config));
        assert_eq!(out.len(), 1);
        let sustain = out[0].summary.sustain.as_ref().unwrap();
        assert_eq!(sustain.warning.threshold_pct, 85.0);
        assert_eq!(sustain.warning.max_duration_sec, 180.0);
        assert!(sustain.warning.breached);
        assert_eq!(sustain.critical.threshold_pct, 95.0);
        assert!(sustain.critical.breached);
        assert!(out[0].values.is_none());
    }

    #[test]
    fn test_summarize_matrix_no_sustain_for_empty_series() {
        let matrix = vec![RangeSeries {
            metric: HashMap::new(),
            values: samples(&[(0.0, "bad")]),
        }];
        let config = AlertConfig {
            warn_pct: 85.0,
            crit_pct: 95.0,
            sustain_seconds: 300,
            step_seconds: 60,
        };
        let out = summarize_matrix(&matrix, false, Some(&config));
        assert_eq!(out[0].summary.count, 0);
        assert!(out[0].summary.sustain.is_none());
    }

    #[test]
    fn test_summarize_matrix_passes_samples_through() {
        let matrix = vec![RangeSeries {
            metric: HashMap::new(),
            values: samples(&[(0.0, "1")]),
        }];
        let out = summarize_matrix(&matrix, true, None);
        assert_eq!(out[0].values.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_summarize_instant_vector() {
        let data = QueryData::Vector(vec![InstantSeries {
            metric: HashMap::from([("job".to_string(), "node".to_string())]),
            value: Sample(1700000000.0, "3.5".to_string()),
        }]);
        let out = summarize_instant(&data, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].summary.count, 1);
        assert_eq!(out[0].summary.last, Some(3.5));
        assert_eq!(out[0].metric["job"], "node");
    }

    #[test]
    fn test_summarize_instant_scalar() {
        let data = QueryData::Scalar(Sample(1700000000.0, "7".to_string()));
        let out = summarize_instant(&data, true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].summary.last, Some(7.0));
        assert!(out[0].metric.is_empty());
        assert_eq!(out[0].values.as_ref().unwrap().len(), 1);
    }
}
