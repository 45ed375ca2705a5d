//! Environment-key resolution
//!
//! Maps a logical environment key (or hint) to a backend base URL using
//! the read-only mapping built at startup.

use std::collections::BTreeMap;

/// Normalize an environment key.
///
/// Lowercases and trims the input, replaces spaces and hyphens with
/// underscores, and collapses known synonyms (including the Korean
/// spellings used by existing dashboards) to canonical keys. Anything
/// unrecognized passes through unchanged, so arbitrary custom keys in
/// the configured map still resolve.
pub fn normalize_env(value: &str) -> String {
    let v = value.trim().to_lowercase().replace(['-', ' '], "_");
    match v.as_str() {
        "prod" | "production" | "운영" => "prod".to_string(),
        "dev" | "develop" | "development" | "개발" => "dev".to_string(),
        "test" | "testing" | "qa" | "테스트" => "test".to_string(),
        "dr" | "disaster_recovery" | "재해복구" => "dr".to_string(),
        "dev_test" | "devtest" | "dev_and_test" => "dev_test".to_string(),
        _ => v,
    }
}

/// Resolve the backend base URL for a request.
///
/// Resolution order: explicit environment key (an error if absent from
/// the map) > hint key (silently ignored if absent) > the process-level
/// default URL. Returns the resolved key alongside the URL; the default
/// URL resolves under the key `default`.
pub fn resolve_env(
    env_urls: &BTreeMap<String, String>,
    default_url: Option<&str>,
    environment: Option<&str>,
    env_hint: Option<&str>,
) -> Result<(String, String), EnvError> {
    if let Some(environment) = environment.filter(|e| !e.trim().is_empty()) {
        let key = normalize_env(environment);
        return match env_urls.get(&key) {
            Some(url) => Ok((key, url.clone())),
            None => Err(EnvError::Unknown(environment.to_string())),
        };
    }

    if let Some(hint) = env_hint.filter(|h| !h.trim().is_empty()) {
        let key = normalize_env(hint);
        if let Some(url) = env_urls.get(&key) {
            return Ok((key, url.clone()));
        }
    }

    if let Some(url) = default_url.filter(|u| !u.is_empty()) {
        return Ok(("default".to_string(), url.to_string()));
    }

    Err(EnvError::NoneSelected)
}

/// Environment resolution errors
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("Unknown environment: {0}")]
    Unknown(String),

    #[error("No environment selected and no default backend URL is configured")]
    NoneSelected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("prod".to_string(), "http://prom-prod:9090".to_string()),
            ("dev".to_string(), "http://prom-dev:9090".to_string()),
        ])
    }

    #[test]
    fn test_normalize_aliases() {
        for alias in ["prod", "Production", " PROD ", "운영"] {
            assert_eq!(normalize_env(alias), "prod", "alias: {alias}");
        }
        for alias in ["dev", "develop", "development", "개발"] {
            assert_eq!(normalize_env(alias), "dev", "alias: {alias}");
        }
        for alias in ["test", "testing", "QA", "테스트"] {
            assert_eq!(normalize_env(alias), "test", "alias: {alias}");
        }
        for alias in ["dr", "disaster-recovery", "disaster recovery", "재해복구"] {
            assert_eq!(normalize_env(alias), "dr", "alias: {alias}");
        }
        for alias in ["dev_test", "DevTest", "dev and test"] {
            assert_eq!(normalize_env(alias), "dev_test", "alias: {alias}");
        }
    }

    #[test]
    fn test_normalize_passthrough() {
        assert_eq!(normalize_env(" Staging-EU "), "staging_eu");
        assert_eq!(normalize_env("custom"), "custom");
    }

    #[test]
    fn test_explicit_key_wins_over_hint_and_default() {
        let (key, url) = resolve_env(
            &urls(),
            Some("http://prom-default:9090"),
            Some("dev"),
            Some("prod"),
        )
        .unwrap();
        assert_eq!(key, "dev");
        assert_eq!(url, "http://prom-dev:9090");
    }

    #[test]
    fn test_unknown_explicit_key_fails() {
        let err = resolve_env(&urls(), Some("http://d"), Some("staging"), None).unwrap_err();
        assert!(matches!(err, EnvError::Unknown(_)));
    }

    #[test]
    fn test_unknown_hint_falls_through_to_default() {
        let (key, url) =
            resolve_env(&urls(), Some("http://prom-default:9090"), None, Some("staging")).unwrap();
        assert_eq!(key, "default");
        assert_eq!(url, "http://prom-default:9090");
    }

    #[test]
    fn test_hint_resolves_when_present() {
        let (key, _) = resolve_env(&urls(), None, None, Some("Production")).unwrap();
        assert_eq!(key, "prod");
    }

    #[test]
    fn test_nothing_selected_fails() {
        let err = resolve_env(&urls(), None, None, Some("staging")).unwrap_err();
        assert!(matches!(err, EnvError::NoneSelected));
    }
}
