//! Time-range resolution and step handling
//!
//! Turns relative/absolute/offset range parameters into a concrete UTC
//! `[start, end]` pair with a validated step, and guards against
//! oversized sample requests before any query is dispatched.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// Default lookback when no relative or absolute bounds are given
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Caller-supplied range parameters, all optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeSpec {
    /// Relative lookback hours
    #[serde(default)]
    pub hours: Option<i64>,
    /// Relative lookback minutes
    #[serde(default)]
    pub minutes: Option<i64>,
    /// Relative lookback days
    #[serde(default)]
    pub days: Option<i64>,
    /// Absolute UTC start (ISO-8601); takes priority over relative fields
    #[serde(default)]
    pub start_time_utc: Option<String>,
    /// Absolute UTC end (ISO-8601); takes priority over offsets
    #[serde(default)]
    pub end_time_utc: Option<String>,
    /// Shift end backwards from now by minutes
    #[serde(default)]
    pub end_offset_minutes: Option<i64>,
    /// Shift end backwards from now by hours
    #[serde(default)]
    pub end_offset_hours: Option<i64>,
    /// Shift end backwards from now by days
    #[serde(default)]
    pub end_offset_days: Option<i64>,
}

/// A resolved query window: UTC bounds plus a validated step
#[derive(Debug, Clone)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Normalized step string, e.g. `5m`
    pub step: String,
    /// Step converted to seconds
    pub step_secs: i64,
}

impl TimeRange {
    /// Resolve a caller-supplied spec and step into a concrete range.
    ///
    /// End resolution order: explicit end > now minus offset > now.
    /// Start resolution order: explicit start > relative lookback >
    /// default 24h before end.
    pub fn resolve(spec: &RangeSpec, step: &str) -> Result<TimeRange, RangeError> {
        let step = parse_step(step)?;
        let step_secs = step_to_seconds(&step);
        let now = Utc::now();

        let end = if let Some(raw) = spec.end_time_utc.as_deref() {
            parse_iso_utc(raw)?
        } else if nonzero(spec.end_offset_minutes)
            || nonzero(spec.end_offset_hours)
            || nonzero(spec.end_offset_days)
        {
            now - Duration::minutes(spec.end_offset_minutes.unwrap_or(0))
                - Duration::hours(spec.end_offset_hours.unwrap_or(0))
                - Duration::days(spec.end_offset_days.unwrap_or(0))
        } else {
            now
        };

        let start = if let Some(raw) = spec.start_time_utc.as_deref() {
            parse_iso_utc(raw)?
        } else if nonzero(spec.minutes) || nonzero(spec.days) {
            end - Duration::hours(spec.hours.unwrap_or(0))
                - Duration::minutes(spec.minutes.unwrap_or(0))
                - Duration::days(spec.days.unwrap_or(0))
        } else {
            let hours = spec
                .hours
                .filter(|h| *h != 0)
                .unwrap_or(DEFAULT_LOOKBACK_HOURS);
            end - Duration::hours(hours)
        };

        if start > end {
            return Err(RangeError::InvalidRange);
        }

        Ok(TimeRange {
            start,
            end,
            step,
            step_secs,
        })
    }

    /// Window duration in whole seconds
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// Format the window duration for embedding into query templates
    pub fn range_str(&self) -> String {
        format_range(self.duration_secs())
    }

    /// Number of samples a range query over this window will return per
    /// series
    pub fn projected_samples(&self) -> i64 {
        self.duration_secs().max(0) / self.step_secs + 1
    }

    /// Guard against oversized responses when raw samples are retained.
    ///
    /// Only applies when `include_samples` is set; summaries alone are
    /// bounded regardless of range width.
    pub fn validate_sample_volume(
        &self,
        include_samples: bool,
        limit: i64,
    ) -> Result<(), RangeError> {
        if !include_samples {
            return Ok(());
        }
        let points = self.projected_samples();
        if points > limit {
            return Err(RangeError::TooManySamples { points, limit });
        }
        Ok(())
    }
}

/// Normalize and validate a step string.
///
/// Empty input defaults to `5m`; otherwise the step must match
/// `^\d+[smhd]$`.
pub fn parse_step(step: &str) -> Result<String, RangeError> {
    let s = step.trim().to_lowercase();
    if s.is_empty() {
        return Ok("5m".to_string());
    }
    let valid = regex::Regex::new(r"^\d+[smhd]$")
        .map(|re| re.is_match(&s))
        .unwrap_or(false);
    if !valid {
        return Err(RangeError::InvalidStep(step.to_string()));
    }
    Ok(s)
}

/// Convert a normalized step string to seconds.
///
/// The input must already be validated by [`parse_step`]; unit
/// multipliers are s=1, m=60, h=3600, d=86400.
pub fn step_to_seconds(step: &str) -> i64 {
    let (value, unit) = step.split_at(step.len() - 1);
    let value: i64 = value.parse().unwrap_or(0);
    match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => value * 86400,
    }
}

/// Format a duration in seconds as the largest exact unit.
///
/// Days if the duration divides 86400 evenly, else hours, else minutes,
/// else raw seconds. Zero or negative durations format as `0s`.
pub fn format_range(total_secs: i64) -> String {
    if total_secs <= 0 {
        return "0s".to_string();
    }
    if total_secs % 86400 == 0 {
        format!("{}d", total_secs / 86400)
    } else if total_secs % 3600 == 0 {
        format!("{}h", total_secs / 3600)
    } else if total_secs % 60 == 0 {
        format!("{}m", total_secs / 60)
    } else {
        format!("{}s", total_secs)
    }
}

/// Parse an ISO-8601 timestamp, assuming UTC when no zone is given
pub fn parse_iso_utc(value: &str) -> Result<DateTime<Utc>, RangeError> {
    let s = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(RangeError::InvalidTimestamp(value.to_string()))
}

/// Render a UTC instant as ISO-8601 with a `Z` suffix
pub fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Unix timestamp with fractional seconds, as the query API expects
pub fn to_unix(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

fn nonzero(v: Option<i64>) -> bool {
    v.is_some_and(|v| v != 0)
}

/// Range resolution errors
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("Invalid step format: {0}. Use formats like 30s, 5m, 1h, 1d.")]
    InvalidStep(String),

    #[error("Invalid UTC timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("start_time must be <= end_time")]
    InvalidRange,

    #[error(
        "Too many samples per series ({points}). Reduce range/increase step \
         or disable include_samples (limit={limit})."
    )]
    TooManySamples { points: i64, limit: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RangeSpec {
        RangeSpec::default()
    }

    #[test]
    fn test_parse_step_defaults_and_normalizes() {
        assert_eq!(parse_step("").unwrap(), "5m");
        assert_eq!(parse_step("  ").unwrap(), "5m");
        assert_eq!(parse_step(" 30S ").unwrap(), "30s");
        assert_eq!(parse_step("1h").unwrap(), "1h");
    }

    #[test]
    fn test_parse_step_rejects_bad_formats() {
        for bad in ["5", "m5", "5mm", "5 m", "-5m", "1w"] {
            assert!(parse_step(bad).is_err(), "expected rejection: {bad}");
        }
    }

    #[test]
    fn test_step_to_seconds_multipliers() {
        assert_eq!(step_to_seconds("30s"), 30);
        assert_eq!(step_to_seconds("5m"), 300);
        assert_eq!(step_to_seconds("2h"), 7200);
        assert_eq!(step_to_seconds("1d"), 86400);
    }

    #[test]
    fn test_format_range_largest_exact_unit() {
        assert_eq!(format_range(0), "0s");
        assert_eq!(format_range(-60), "0s");
        assert_eq!(format_range(90), "90s");
        assert_eq!(format_range(120), "2m");
        assert_eq!(format_range(7200), "2h");
        assert_eq!(format_range(172800), "2d");
        assert_eq!(format_range(86400 + 3600), "25h");
    }

    #[test]
    fn test_format_range_round_trips_under_step_grammar() {
        for secs in [1, 59, 60, 90, 3600, 5400, 86400, 90000] {
            let formatted = format_range(secs);
            let parsed = parse_step(&formatted).unwrap();
            assert_eq!(step_to_seconds(&parsed), secs, "round trip of {secs}");
        }
    }

    #[test]
    fn test_resolve_defaults_to_24h_lookback() {
        let range = TimeRange::resolve(&spec(), "5m").unwrap();
        assert_eq!(range.duration_secs(), 24 * 3600);
        assert_eq!(range.step, "5m");
        assert_eq!(range.step_secs, 300);
    }

    #[test]
    fn test_resolve_hours_only_uses_hours() {
        let range = TimeRange::resolve(
            &RangeSpec {
                hours: Some(6),
                ..spec()
            },
            "5m",
        )
        .unwrap();
        assert_eq!(range.duration_secs(), 6 * 3600);
    }

    #[test]
    fn test_resolve_combines_relative_fields_when_minutes_given() {
        let range = TimeRange::resolve(
            &RangeSpec {
                hours: Some(1),
                minutes: Some(30),
                ..spec()
            },
            "5m",
        )
        .unwrap();
        assert_eq!(range.duration_secs(), 5400);
    }

    #[test]
    fn test_resolve_absolute_inputs_ignore_relative_fields() {
        let range = TimeRange::resolve(
            &RangeSpec {
                hours: Some(99),
                minutes: Some(99),
                days: Some(99),
                end_offset_hours: Some(99),
                start_time_utc: Some("2024-03-01T00:00:00Z".to_string()),
                end_time_utc: Some("2024-03-02T00:00:00Z".to_string()),
                ..spec()
            },
            "1h",
        )
        .unwrap();
        assert_eq!(iso(range.start), "2024-03-01T00:00:00Z");
        assert_eq!(iso(range.end), "2024-03-02T00:00:00Z");
    }

    #[test]
    fn test_resolve_naive_timestamps_assume_utc() {
        let range = TimeRange::resolve(
            &RangeSpec {
                start_time_utc: Some("2024-03-01T00:00:00".to_string()),
                end_time_utc: Some("2024-03-01T12:00:00".to_string()),
                ..spec()
            },
            "5m",
        )
        .unwrap();
        assert_eq!(range.duration_secs(), 12 * 3600);
    }

    #[test]
    fn test_resolve_end_offset_shifts_end_backwards() {
        let range = TimeRange::resolve(
            &RangeSpec {
                hours: Some(1),
                end_offset_hours: Some(2),
                ..spec()
            },
            "5m",
        )
        .unwrap();
        let lag = Utc::now() - range.end;
        assert!(lag >= Duration::hours(2));
        assert!(lag < Duration::hours(2) + Duration::minutes(1));
        assert_eq!(range.duration_secs(), 3600);
    }

    #[test]
    fn test_resolve_rejects_inverted_range() {
        let err = TimeRange::resolve(
            &RangeSpec {
                start_time_utc: Some("2024-03-02T00:00:00Z".to_string()),
                end_time_utc: Some("2024-03-01T00:00:00Z".to_string()),
                ..spec()
            },
            "5m",
        )
        .unwrap_err();
        assert!(matches!(err, RangeError::InvalidRange));
    }

    #[test]
    fn test_resolve_rejects_bad_timestamp() {
        let err = TimeRange::resolve(
            &RangeSpec {
                end_time_utc: Some("yesterday".to_string()),
                ..spec()
            },
            "5m",
        )
        .unwrap_err();
        assert!(matches!(err, RangeError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_sample_volume_boundary() {
        // 1h window at 1m step: 61 projected samples
        let range = TimeRange::resolve(
            &RangeSpec {
                start_time_utc: Some("2024-03-01T00:00:00Z".to_string()),
                end_time_utc: Some("2024-03-01T01:00:00Z".to_string()),
                ..spec()
            },
            "1m",
        )
        .unwrap();
        assert_eq!(range.projected_samples(), 61);

        // exactly at the ceiling succeeds
        assert!(range.validate_sample_volume(true, 61).is_ok());
        // one past fails
        let err = range.validate_sample_volume(true, 60).unwrap_err();
        assert!(matches!(
            err,
            RangeError::TooManySamples {
                points: 61,
                limit: 60
            }
        ));
        // never enforced when samples are not retained
        assert!(range.validate_sample_volume(false, 1).is_ok());
    }
}
