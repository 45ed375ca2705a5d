//! Process configuration loaded from the environment
//!
//! Built once at startup and passed through the call chain; nothing in
//! here mutates after load.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::environment::normalize_env;

/// Runtime configuration for backend access and check defaults
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Process-level default backend URL, used when no environment is
    /// selected
    pub default_url: Option<String>,
    /// Bearer token sent with every backend request
    pub bearer_token: Option<String>,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Warning-tier threshold for percent checks
    pub warn_pct: f64,
    /// Critical-tier threshold for percent checks
    pub crit_pct: f64,
    /// Minimum minutes a threshold must hold to count as breached
    pub sustain_minutes: i64,
    /// Ceiling on raw samples retained per series
    pub max_samples_per_series: i64,
    /// Worker-pool bound for catalog fan-out
    pub max_parallel_checks: usize,
    /// Normalized environment key -> backend base URL
    pub env_urls: BTreeMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_url: None,
            bearer_token: None,
            http_timeout: Duration::from_secs(15),
            warn_pct: 85.0,
            crit_pct: 95.0,
            sustain_minutes: 5,
            max_samples_per_series: 5000,
            max_parallel_checks: 6,
            env_urls: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_url = std::env::var("PROM_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        let bearer_token = std::env::var("PROM_BEARER_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        let http_timeout = std::env::var("PROM_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.http_timeout);

        Self {
            default_url,
            bearer_token,
            http_timeout,
            warn_pct: env_parse("ALERT_WARN_PCT", defaults.warn_pct),
            crit_pct: env_parse("ALERT_CRIT_PCT", defaults.crit_pct),
            sustain_minutes: env_parse("ALERT_SUSTAIN_MINUTES", defaults.sustain_minutes),
            max_samples_per_series: env_parse(
                "PROM_MAX_SAMPLES_PER_SERIES",
                defaults.max_samples_per_series,
            ),
            max_parallel_checks: env_parse(
                "PROM_MAX_PARALLEL_CHECKS",
                defaults.max_parallel_checks,
            ),
            env_urls: std::env::var("PROM_ENV_URLS")
                .map(|raw| parse_env_urls(&raw))
                .unwrap_or_default(),
        }
    }

    /// Sustain window in seconds
    pub fn sustain_seconds(&self) -> i64 {
        self.sustain_minutes * 60
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse the environment-to-URL map from its JSON representation.
///
/// Keys are normalized on load so lookups never re-normalize the map
/// side. Malformed input is logged and yields an empty map.
pub fn parse_env_urls(raw: &str) -> BTreeMap<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        tracing::warn!("PROM_ENV_URLS is not set; environment map is empty");
        return BTreeMap::new();
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| {
                let url = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (normalize_env(&key), url)
            })
            .collect(),
        Ok(_) => {
            tracing::warn!("PROM_ENV_URLS must be a JSON object; ignoring");
            BTreeMap::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse PROM_ENV_URLS; ignoring");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.warn_pct, 85.0);
        assert_eq!(config.crit_pct, 95.0);
        assert_eq!(config.sustain_seconds(), 300);
        assert_eq!(config.max_samples_per_series, 5000);
        assert_eq!(config.max_parallel_checks, 6);
        assert_eq!(config.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_parse_env_urls_normalizes_keys() {
        let map = parse_env_urls(
            r#"{"Production": "http://prod:9090", "dev-test": "http://dt:9090"}"#,
        );
        assert_eq!(map.get("prod").map(String::as_str), Some("http://prod:9090"));
        assert_eq!(map.get("dev_test").map(String::as_str), Some("http://dt:9090"));
    }

    #[test]
    fn test_parse_env_urls_rejects_non_objects() {
        assert!(parse_env_urls("[1,2]").is_empty());
        assert!(parse_env_urls("not json").is_empty());
        assert!(parse_env_urls("").is_empty());
    }
}
