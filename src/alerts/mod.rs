//! Active-alert retrieval and filtering
//!
//! Fetches firing alerts from the backend's alerts endpoint, applies
//! exact-match label filters, and reduces the result to per-label
//! frequency summaries.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::client::{ActiveAlert, PromClient};
use crate::config::AppConfig;
use crate::environment::resolve_env;
use crate::runner::RunError;
use crate::timerange::{iso, parse_iso_utc};

const TOP_N: usize = 20;

/// Exact-match alert filters plus environment selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub alertname: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    /// Include the full alert list, not just the summary
    #[serde(default = "default_true")]
    pub include_alerts: bool,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub env_hint: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One alert in the response, with its activation time normalized to
/// UTC when parseable
#[derive(Debug, Clone, Serialize)]
pub struct AlertEntry {
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub state: Option<String>,
    pub active_at_raw: Option<String>,
    pub active_at_utc: Option<String>,
    pub value: Option<String>,
}

/// Frequency of one label value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: usize,
}

/// Per-label frequency summaries over the filtered alerts
#[derive(Debug, Clone, Serialize)]
pub struct AlertsSummary {
    pub total_alerts: usize,
    pub severity: Vec<KeyCount>,
    pub state: Vec<KeyCount>,
    pub alertname: Vec<KeyCount>,
    pub job: Vec<KeyCount>,
    pub server_name: Vec<KeyCount>,
}

/// Filtered active alerts plus their summary
#[derive(Debug, Serialize)]
pub struct AlertsReport {
    pub environment: String,
    pub prom_url: String,
    pub retrieved_at_utc: String,
    pub summary: AlertsSummary,
    pub alerts: Vec<AlertEntry>,
}

/// Fetch active alerts and reduce them per the query's filters
pub async fn get_alerts(
    client: &PromClient,
    config: &AppConfig,
    query: &AlertsQuery,
) -> Result<AlertsReport, RunError> {
    let (env_key, prom_url) = resolve_env(
        &config.env_urls,
        config.default_url.as_deref(),
        query.environment.as_deref(),
        query.env_hint.as_deref(),
    )?;

    let raw = client.active_alerts(&prom_url).await?;
    let report = build_report(raw, query, env_key, prom_url);
    Ok(report)
}

fn build_report(
    raw: Vec<ActiveAlert>,
    query: &AlertsQuery,
    environment: String,
    prom_url: String,
) -> AlertsReport {
    let mut entries = Vec::new();
    let mut severity = HashMap::new();
    let mut state = HashMap::new();
    let mut alertname = HashMap::new();
    let mut job = HashMap::new();
    let mut server_name = HashMap::new();
    let mut total = 0;

    for alert in raw {
        if !matches_filters(&alert, query) {
            continue;
        }
        total += 1;

        count_label(&mut severity, alert.labels.get("severity"));
        count_label(&mut state, alert.state.as_ref());
        count_label(&mut alertname, alert.labels.get("alertname"));
        count_label(&mut job, alert.labels.get("job"));
        count_label(&mut server_name, alert.labels.get("server_name"));

        if !query.include_alerts {
            continue;
        }

        let active_at_utc = alert
            .active_at
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| parse_iso_utc(s).ok())
            .map(iso);

        entries.push(AlertEntry {
            labels: alert.labels,
            annotations: alert.annotations,
            state: alert.state,
            active_at_raw: alert.active_at,
            active_at_utc,
            value: alert.value,
        });
    }

    AlertsReport {
        environment,
        prom_url,
        retrieved_at_utc: iso(Utc::now()),
        summary: AlertsSummary {
            total_alerts: total,
            severity: top_counts(severity),
            state: top_counts(state),
            alertname: top_counts(alertname),
            job: top_counts(job),
            server_name: top_counts(server_name),
        },
        alerts: entries,
    }
}

fn matches_filters(alert: &ActiveAlert, query: &AlertsQuery) -> bool {
    let label_matches = |filter: &Option<String>, label: &str| match filter {
        Some(expected) => alert.labels.get(label).is_some_and(|v| v == expected),
        None => true,
    };

    if let Some(expected) = &query.state {
        if alert.state.as_deref() != Some(expected.as_str()) {
            return false;
        }
    }

    label_matches(&query.severity, "severity")
        && label_matches(&query.alertname, "alertname")
        && label_matches(&query.job, "job")
        && label_matches(&query.server_name, "server_name")
        && label_matches(&query.instance, "instance")
}

fn count_label(counter: &mut HashMap<String, usize>, value: Option<&String>) {
    let key = value
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    *counter.entry(key).or_insert(0) += 1;
}

/// Most frequent label values first; ties broken by key for stable
/// output
fn top_counts(counter: HashMap<String, usize>) -> Vec<KeyCount> {
    let mut counts: Vec<KeyCount> = counter
        .into_iter()
        .map(|(key, count)| KeyCount { key, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    counts.truncate(TOP_N);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(labels: &[(&str, &str)], state: &str) -> ActiveAlert {
        ActiveAlert {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            annotations: HashMap::new(),
            state: Some(state.to_string()),
            active_at: Some("2024-03-01T00:00:00Z".to_string()),
            value: Some("1".to_string()),
        }
    }

    #[test]
    fn test_filters_are_exact_match() {
        let raw = vec![
            alert(&[("severity", "critical"), ("job", "node")], "firing"),
            alert(&[("severity", "warning"), ("job", "node")], "firing"),
            alert(&[("severity", "critical"), ("job", "db")], "pending"),
        ];
        let query = AlertsQuery {
            severity: Some("critical".to_string()),
            state: Some("firing".to_string()),
            include_alerts: true,
            ..AlertsQuery::default()
        };
        let report = build_report(raw, &query, "prod".to_string(), "http://p".to_string());
        assert_eq!(report.summary.total_alerts, 1);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].labels["job"], "node");
    }

    #[test]
    fn test_summary_counts_and_ordering() {
        let raw = vec![
            alert(&[("severity", "warning")], "firing"),
            alert(&[("severity", "warning")], "firing"),
            alert(&[("severity", "critical")], "firing"),
            alert(&[], "firing"),
        ];
        let report = build_report(
            raw,
            &AlertsQuery {
                include_alerts: true,
                ..AlertsQuery::default()
            },
            "prod".to_string(),
            "http://p".to_string(),
        );
        assert_eq!(report.summary.total_alerts, 4);
        assert_eq!(
            report.summary.severity,
            vec![
                KeyCount {
                    key: "warning".to_string(),
                    count: 2
                },
                KeyCount {
                    key: "critical".to_string(),
                    count: 1
                },
                KeyCount {
                    key: "unknown".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_summary_only_mode_omits_alert_list() {
        let raw = vec![alert(&[("severity", "warning")], "firing")];
        let report = build_report(
            raw,
            &AlertsQuery {
                include_alerts: false,
                ..AlertsQuery::default()
            },
            "prod".to_string(),
            "http://p".to_string(),
        );
        assert_eq!(report.summary.total_alerts, 1);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn test_active_at_normalized_when_parseable() {
        let mut bad = alert(&[], "firing");
        bad.active_at = Some("not a time".to_string());
        let good = alert(&[], "firing");

        let report = build_report(
            vec![good, bad],
            &AlertsQuery {
                include_alerts: true,
                ..AlertsQuery::default()
            },
            "prod".to_string(),
            "http://p".to_string(),
        );
        assert_eq!(
            report.alerts[0].active_at_utc.as_deref(),
            Some("2024-03-01T00:00:00Z")
        );
        assert!(report.alerts[1].active_at_utc.is_none());
    }
}
