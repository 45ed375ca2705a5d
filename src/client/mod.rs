//! Prometheus HTTP API client
//!
//! Thin wrapper over the `/api/v1` query endpoints with typed
//! responses. Transient-error retry lives here; the orchestration layer
//! above never retries.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::timerange::to_unix;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 300;

/// Client for querying a Prometheus-compatible backend
#[derive(Debug, Clone)]
pub struct PromClient {
    http_client: reqwest::Client,
    bearer_token: Option<String>,
}

/// One sample: `[unix_timestamp, value_string]` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample(pub f64, pub String);

impl Sample {
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    /// The sample value coerced to a finite float, if possible
    pub fn value(&self) -> Option<f64> {
        self.1.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// One series of a range-query matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<Sample>,
}

/// One series of an instant-query vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantSeries {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    pub value: Sample,
}

/// Query result payload, tagged by the backend's `resultType`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryData {
    Matrix(Vec<RangeSeries>),
    Vector(Vec<InstantSeries>),
    Scalar(Sample),
    String(Sample),
}

impl QueryData {
    pub fn result_type(&self) -> &'static str {
        match self {
            QueryData::Matrix(_) => "matrix",
            QueryData::Vector(_) => "vector",
            QueryData::Scalar(_) => "scalar",
            QueryData::String(_) => "string",
        }
    }
}

/// One active alert from `/api/v1/alerts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlert {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "activeAt")]
    pub active_at: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Standard response envelope shared by all v1 endpoints
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ApiEnvelope<T> {
    status: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlertsData {
    #[serde(default)]
    alerts: Vec<ActiveAlert>,
}

impl PromClient {
    pub fn new(timeout: Duration, bearer_token: Option<String>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            bearer_token,
        }
    }

    /// Execute a range query over `[start, end]` at the given step
    pub async fn query_range(
        &self,
        base_url: &str,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: &str,
    ) -> Result<QueryData, PromError> {
        let url = format!("{}/api/v1/query_range", base_url.trim_end_matches('/'));
        let params = [
            ("query", query.to_string()),
            ("start", to_unix(start).to_string()),
            ("end", to_unix(end).to_string()),
            ("step", step.to_string()),
        ];
        self.get_data(&url, &params).await
    }

    /// Execute an instant query at a single timestamp
    pub async fn query_instant(
        &self,
        base_url: &str,
        query: &str,
        at: DateTime<Utc>,
    ) -> Result<QueryData, PromError> {
        let url = format!("{}/api/v1/query", base_url.trim_end_matches('/'));
        let params = [
            ("query", query.to_string()),
            ("time", to_unix(at).to_string()),
        ];
        self.get_data(&url, &params).await
    }

    /// Fetch the values of a label, optionally restricted to series
    /// matching an expression
    pub async fn label_values(
        &self,
        base_url: &str,
        label: &str,
        match_expr: Option<&str>,
    ) -> Result<Vec<String>, PromError> {
        let url = format!(
            "{}/api/v1/label/{}/values",
            base_url.trim_end_matches('/'),
            label
        );
        let params: Vec<(&str, String)> = match match_expr {
            Some(m) => vec![("match[]", m.to_string())],
            None => vec![],
        };
        self.get_data(&url, &params).await
    }

    /// Fetch currently active alerts
    pub async fn active_alerts(&self, base_url: &str) -> Result<Vec<ActiveAlert>, PromError> {
        let url = format!("{}/api/v1/alerts", base_url.trim_end_matches('/'));
        let data: AlertsData = self.get_data(&url, &[]).await?;
        Ok(data.alerts)
    }

    /// GET an endpoint and unwrap the standard response envelope,
    /// retrying transport failures and retryable statuses
    async fn get_data<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, PromError> {
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let mut request = self.http_client.get(url).query(params);
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) if retryable_status(response.status()) && attempt < RETRY_ATTEMPTS => {
                    tracing::warn!(
                        url,
                        status = %response.status(),
                        attempt,
                        "Retrying query after retryable status"
                    );
                }
                Ok(response) => break response,
                Err(e) if attempt < RETRY_ATTEMPTS => {
                    tracing::warn!(url, error = %e, attempt, "Retrying query after transport error");
                }
                Err(e) => return Err(PromError::Network(e.to_string())),
            }

            let backoff = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PromError::Backend(format!("HTTP {}: {}", status, body)));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| PromError::Deserialization(e.to_string()))?;

        if envelope.status != "success" {
            return Err(PromError::Backend(format!(
                "{}: {}",
                envelope.error_type.unwrap_or_else(|| "error".to_string()),
                envelope.error.unwrap_or_default()
            )));
        }

        envelope
            .data
            .ok_or_else(|| PromError::Deserialization("missing data field".to_string()))
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Backend query errors
#[derive(Debug, thiserror::Error)]
pub enum PromError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Prometheus error: {0}")]
    Backend(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_value_coercion() {
        assert_eq!(Sample(0.0, "42.5".to_string()).value(), Some(42.5));
        assert_eq!(Sample(0.0, "bad".to_string()).value(), None);
        assert_eq!(Sample(0.0, "NaN".to_string()).value(), None);
        assert_eq!(Sample(0.0, "inf".to_string()).value(), None);
    }

    #[test]
    fn test_deserialize_matrix() {
        let raw = serde_json::json!({
            "resultType": "matrix",
            "result": [
                {
                    "metric": {"__name__": "up", "instance": "10.0.0.1:9100"},
                    "values": [[1700000000.0, "1"], [1700000300.0, "0"]]
                }
            ]
        });
        let data: QueryData = serde_json::from_value(raw).unwrap();
        match data {
            QueryData::Matrix(series) => {
                assert_eq!(series.len(), 1);
                assert_eq!(series[0].metric["instance"], "10.0.0.1:9100");
                assert_eq!(series[0].values[1], Sample(1700000300.0, "0".to_string()));
            }
            other => panic!("expected matrix, got {}", other.result_type()),
        }
    }

    #[test]
    fn test_deserialize_vector_and_scalar() {
        let vector: QueryData = serde_json::from_value(serde_json::json!({
            "resultType": "vector",
            "result": [{"metric": {}, "value": [1700000000.0, "3.14"]}]
        }))
        .unwrap();
        assert_eq!(vector.result_type(), "vector");

        let scalar: QueryData = serde_json::from_value(serde_json::json!({
            "resultType": "scalar",
            "result": [1700000000.0, "7"]
        }))
        .unwrap();
        match scalar {
            QueryData::Scalar(sample) => assert_eq!(sample.value(), Some(7.0)),
            other => panic!("expected scalar, got {}", other.result_type()),
        }
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let envelope: ApiEnvelope<QueryData> = serde_json::from_str(
            r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#,
        )
        .unwrap();
        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.error_type.as_deref(), Some("bad_data"));
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error.as_deref(), Some("parse error"));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!retryable_status(StatusCode::BAD_REQUEST));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
    }
}
