use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::alerts::{self, AlertsQuery, AlertsReport};
use crate::catalog::CheckMeta;
use crate::client::QueryData;
use crate::config::AppConfig;
use crate::environment::{resolve_env, EnvError};
use crate::runner::{
    AdhocParams, AdhocReport, CheckReport, FanOutReport, QueryParams, RunError, Runner,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runner: Runner,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Catalog & Environments
// ============================================================================

#[derive(Serialize)]
pub struct ChecksResponse {
    pub checks: Vec<CheckMeta>,
}

pub async fn list_checks(State(state): State<Arc<AppState>>) -> Json<ChecksResponse> {
    let checks = state.runner.catalog().iter().map(CheckMeta::from).collect();
    Json(ChecksResponse { checks })
}

#[derive(Serialize)]
pub struct EnvironmentInfo {
    pub key: String,
    pub prom_url: String,
}

#[derive(Serialize)]
pub struct EnvironmentsResponse {
    pub environments: Vec<EnvironmentInfo>,
}

pub async fn list_environments(State(state): State<Arc<AppState>>) -> Json<EnvironmentsResponse> {
    let environments = state
        .config
        .env_urls
        .iter()
        .map(|(key, url)| EnvironmentInfo {
            key: key.clone(),
            prom_url: url.clone(),
        })
        .collect();
    Json(EnvironmentsResponse { environments })
}

// ============================================================================
// Target Discovery
// ============================================================================

#[derive(Deserialize)]
pub struct EnvSelect {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub env_hint: Option<String>,
}

impl EnvSelect {
    fn resolve(&self, config: &AppConfig) -> Result<(String, String), EnvError> {
        resolve_env(
            &config.env_urls,
            config.default_url.as_deref(),
            self.environment.as_deref(),
            self.env_hint.as_deref(),
        )
    }
}

#[derive(Serialize)]
pub struct ServerInfo {
    pub instance: Option<String>,
    pub job: Option<String>,
    pub server_name: String,
}

#[derive(Serialize)]
pub struct ServersResponse {
    pub environment: String,
    pub prom_url: String,
    pub servers: Vec<ServerInfo>,
}

/// List monitored servers detected from recent `up{server_name!=""}`
/// series, unique by (instance, job)
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    Query(select): Query<EnvSelect>,
) -> Result<Json<ServersResponse>, ApiError> {
    let (environment, prom_url) = select.resolve(&state.config).map_err(RunError::from)?;

    let now = Utc::now();
    let data = state
        .runner
        .client()
        .query_range(
            &prom_url,
            r#"up{server_name!=""}"#,
            now - Duration::minutes(10),
            now,
            "5m",
        )
        .await
        .map_err(RunError::from)?;

    let series = match data {
        QueryData::Matrix(series) => series,
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut servers = Vec::new();
    for s in series {
        let Some(server_name) = s.metric.get("server_name").filter(|v| !v.is_empty()) else {
            continue;
        };
        let instance = s.metric.get("instance").cloned();
        let job = s.metric.get("job").cloned();
        if seen.insert((instance.clone(), job.clone())) {
            servers.push(ServerInfo {
                instance,
                job,
                server_name: server_name.clone(),
            });
        }
    }

    Ok(Json(ServersResponse {
        environment,
        prom_url,
        servers,
    }))
}

#[derive(Serialize)]
pub struct GroupsResponse {
    pub environment: String,
    pub prom_url: String,
    pub groups: Vec<String>,
}

/// List process group names from process-monitoring metrics
pub async fn list_process_groups(
    State(state): State<Arc<AppState>>,
    Query(select): Query<EnvSelect>,
) -> Result<Json<GroupsResponse>, ApiError> {
    let (environment, prom_url) = select.resolve(&state.config).map_err(RunError::from)?;

    let values = state
        .runner
        .client()
        .label_values(
            &prom_url,
            "groupname",
            Some(r#"namedprocess_namegroup_cpu_seconds_total{job="process_monitoring"}"#),
        )
        .await
        .map_err(RunError::from)?;

    let groups: BTreeSet<String> = values.into_iter().filter(|g| !g.is_empty()).collect();
    Ok(Json(GroupsResponse {
        environment,
        prom_url,
        groups: groups.into_iter().collect(),
    }))
}

// ============================================================================
// Check Execution
// ============================================================================

pub async fn run_check(
    State(state): State<Arc<AppState>>,
    Path(check_id): Path<String>,
    Json(params): Json<QueryParams>,
) -> Result<Json<CheckReport>, ApiError> {
    let report = state.runner.run_check(&check_id, &params).await?;
    Ok(Json(report))
}

pub async fn run_all_checks(
    State(state): State<Arc<AppState>>,
    Json(params): Json<QueryParams>,
) -> Result<Json<FanOutReport>, ApiError> {
    let report = state.runner.run_all_checks(&params).await?;
    Ok(Json(report))
}

pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(params): Json<AdhocParams>,
) -> Result<Json<AdhocReport>, ApiError> {
    let report = state.runner.run_adhoc(&params).await?;
    Ok(Json(report))
}

// ============================================================================
// Active Alerts
// ============================================================================

pub async fn active_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertsReport>, ApiError> {
    let report = alerts::get_alerts(state.runner.client(), &state.config, &query).await?;
    Ok(Json(report))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Backend(String),
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match &err {
            RunError::UnknownCheck(_) => ApiError::NotFound(err.to_string()),
            RunError::Environment(EnvError::Unknown(_)) => ApiError::NotFound(err.to_string()),
            RunError::Backend(_) => ApiError::Backend(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Backend(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
