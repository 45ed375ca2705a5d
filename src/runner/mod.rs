//! Check orchestration
//!
//! Composes and executes one check, fans out the full catalog through a
//! bounded worker pool, and runs approval-gated ad-hoc queries. All
//! validation happens before any backend dispatch; in fan-out mode a
//! per-check failure is recorded in that check's slot and never aborts
//! its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Check, CheckMeta};
use crate::client::{PromClient, PromError, QueryData};
use crate::config::AppConfig;
use crate::environment::EnvError;
use crate::promql::{apply_target_filter, render_template};
use crate::summarize::{summarize_instant, summarize_matrix, AlertConfig, SeriesSummary};
use crate::timerange::{iso, parse_step, RangeError, RangeSpec, TimeRange};

/// Fan-out always queries at a coarse fixed step to bound payload size
const FANOUT_STEP: &str = "5m";

/// Executes catalog checks and ad-hoc queries against the resolved
/// backend
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<AppConfig>,
    catalog: Arc<Catalog>,
    client: PromClient,
}

/// Common request parameters shared by every operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    #[serde(flatten)]
    pub range: RangeSpec,
    /// Range-query step, e.g. `1m`, `5m`, `15m`
    #[serde(default)]
    pub step: Option<String>,
    /// Retain raw samples in each series summary
    #[serde(default)]
    pub include_samples: bool,
    /// Filter by the `server_name` label
    #[serde(default)]
    pub server_name: Option<String>,
    /// Filter by the `instance` label, e.g. `host:9100`
    #[serde(default)]
    pub instance: Option<String>,
    /// Explicit environment key (highest priority)
    #[serde(default)]
    pub environment: Option<String>,
    /// Fallback environment hint
    #[serde(default)]
    pub env_hint: Option<String>,
}

/// Parameters for the ad-hoc query operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdhocParams {
    pub promql: String,
    /// Safety gate: queries never execute without this flag
    #[serde(default)]
    pub approved: bool,
    /// Use an instant query at the resolved end time
    #[serde(default)]
    pub instant: bool,
    /// Attach sustained-threshold evaluation to the results
    #[serde(default)]
    pub alert_pct: bool,
    #[serde(flatten)]
    pub common: QueryParams,
}

/// Target filter echoed in responses
#[derive(Debug, Clone, Serialize)]
pub struct FilterInfo {
    pub server_name: Option<String>,
    pub instance: Option<String>,
}

impl From<&QueryParams> for FilterInfo {
    fn from(params: &QueryParams) -> Self {
        Self {
            server_name: params.server_name.clone(),
            instance: params.instance.clone(),
        }
    }
}

/// Resolved query window echoed in responses
#[derive(Debug, Clone, Serialize)]
pub struct RangeInfo {
    pub start: String,
    pub end: String,
    pub step: String,
}

impl From<&TimeRange> for RangeInfo {
    fn from(range: &TimeRange) -> Self {
        Self {
            start: iso(range.start),
            end: iso(range.end),
            step: range.step.clone(),
        }
    }
}

/// Result of a single-check run
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub check: CheckMeta,
    pub environment: String,
    pub prom_url: String,
    pub filter: FilterInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_config: Option<AlertConfig>,
    pub range: RangeInfo,
    pub series_count: usize,
    pub elapsed_ms: u64,
    pub results: Vec<SeriesSummary>,
}

/// One successfully executed check within a fan-out
#[derive(Debug, Serialize)]
pub struct CheckRun {
    pub check: CheckMeta,
    pub series_count: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_config: Option<AlertConfig>,
    pub results: Vec<SeriesSummary>,
}

/// One failed check within a fan-out; carries only metadata and the
/// error text
#[derive(Debug, Serialize)]
pub struct CheckFailure {
    pub check: CheckMeta,
    pub error: String,
}

/// Per-check slot of a fan-out response
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckOutcome {
    Success(CheckRun),
    Failure(CheckFailure),
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckOutcome::Failure(_))
    }
}

/// Result of a full-catalog fan-out
#[derive(Debug, Serialize)]
pub struct FanOutReport {
    pub environment: String,
    pub prom_url: String,
    pub filter: FilterInfo,
    pub range: RangeInfo,
    pub parallel_workers: usize,
    pub failed_checks: usize,
    pub checks: Vec<CheckOutcome>,
}

/// Ad-hoc query acknowledged but not executed (approval gate)
#[derive(Debug, Serialize)]
pub struct AdhocSkipped {
    pub approved: bool,
    pub executed: bool,
    pub promql: String,
    pub instant: bool,
    pub message: String,
}

/// Ad-hoc query executed against the backend
#[derive(Debug, Serialize)]
pub struct AdhocExecuted {
    pub approved: bool,
    pub executed: bool,
    pub promql: String,
    pub instant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub filter: FilterInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_config: Option<AlertConfig>,
    pub environment: String,
    pub prom_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub series_count: usize,
    pub elapsed_ms: u64,
    pub results: Vec<SeriesSummary>,
}

/// Result of the ad-hoc operation
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AdhocReport {
    Skipped(AdhocSkipped),
    Executed(Box<AdhocExecuted>),
}

/// True when a check's results are percent-style and get threshold
/// evaluation attached
pub fn should_apply_alerts(check: &Check) -> bool {
    check.name.contains('%') || check.id.ends_with("_pct")
}

fn worker_pool_size(max_parallel: usize, checks: usize) -> usize {
    std::cmp::max(1, std::cmp::min(max_parallel, checks))
}

impl Runner {
    pub fn new(config: Arc<AppConfig>, catalog: Arc<Catalog>) -> Self {
        let client = PromClient::new(config.http_timeout, config.bearer_token.clone());
        Self {
            config,
            catalog,
            client,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn client(&self) -> &PromClient {
        &self.client
    }

    fn resolve_environment(&self, params: &QueryParams) -> Result<(String, String), EnvError> {
        crate::environment::resolve_env(
            &self.config.env_urls,
            self.config.default_url.as_deref(),
            params.environment.as_deref(),
            params.env_hint.as_deref(),
        )
    }

    fn alert_config_for(&self, check: &Check, step_seconds: i64) -> Option<AlertConfig> {
        should_apply_alerts(check).then(|| AlertConfig {
            warn_pct: self.config.warn_pct,
            crit_pct: self.config.crit_pct,
            sustain_seconds: self.config.sustain_seconds(),
            step_seconds,
        })
    }

    /// Run one allowlisted check and summarize its results
    pub async fn run_check(
        &self,
        check_id: &str,
        params: &QueryParams,
    ) -> Result<CheckReport, RunError> {
        let check = self
            .catalog
            .get(check_id)
            .ok_or_else(|| RunError::UnknownCheck(check_id.to_string()))?;

        let step = parse_step(params.step.as_deref().unwrap_or(""))?;
        let (env_key, prom_url) = self.resolve_environment(params)?;
        let range = TimeRange::resolve(&params.range, &step)?;
        range.validate_sample_volume(params.include_samples, self.config.max_samples_per_series)?;
        let range_str = range.range_str();

        let run = self
            .run_one(check, &prom_url, &range, &range_str, params)
            .await?;

        Ok(CheckReport {
            check: run.check,
            environment: env_key,
            prom_url,
            filter: FilterInfo::from(params),
            alert_config: run.alert_config,
            range: RangeInfo::from(&range),
            series_count: run.series_count,
            elapsed_ms: run.elapsed_ms,
            results: run.results,
        })
    }

    /// Run every catalog check in parallel for the same window and
    /// filters.
    ///
    /// The step is fixed to 5m regardless of the caller's value, and the
    /// shared range/volume preconditions are checked once up front; a
    /// failure there aborts the whole call. Individual check failures
    /// only mark their own slot.
    pub async fn run_all_checks(&self, params: &QueryParams) -> Result<FanOutReport, RunError> {
        let (env_key, prom_url) = self.resolve_environment(params)?;
        let range = TimeRange::resolve(&params.range, FANOUT_STEP)?;
        range.validate_sample_volume(params.include_samples, self.config.max_samples_per_series)?;
        let range_str = range.range_str();

        let max_workers = worker_pool_size(self.config.max_parallel_checks, self.catalog.len());

        let range_ref = &range;
        let range_str_ref = range_str.as_str();
        let prom_url_ref = prom_url.as_str();
        let mut futs = Vec::with_capacity(self.catalog.len());
        for check in self.catalog.iter() {
            futs.push(self.run_one_outcome(check, prom_url_ref, range_ref, range_str_ref, params));
        }
        let mut outcome_map: HashMap<&str, CheckOutcome> = futures::stream::iter(futs)
            .buffer_unordered(max_workers)
            .collect()
            .await;

        // emit in catalog definition order, not completion order
        let mut checks = Vec::with_capacity(self.catalog.len());
        let mut failed_checks = 0;
        for check in self.catalog.iter() {
            if let Some(outcome) = outcome_map.remove(check.id) {
                if outcome.is_failure() {
                    failed_checks += 1;
                }
                checks.push(outcome);
            }
        }

        Ok(FanOutReport {
            environment: env_key,
            prom_url,
            filter: FilterInfo::from(params),
            range: RangeInfo::from(&range),
            parallel_workers: max_workers,
            failed_checks,
            checks,
        })
    }

    /// Run a custom query, gated on explicit approval.
    ///
    /// Without the `approved` flag no backend call happens and the
    /// response echoes the trimmed query marked as not executed.
    pub async fn run_adhoc(&self, params: &AdhocParams) -> Result<AdhocReport, RunError> {
        let promql_text = params.promql.trim();
        if promql_text.is_empty() {
            return Err(RunError::EmptyQuery);
        }

        if !params.approved {
            return Ok(AdhocReport::Skipped(AdhocSkipped {
                approved: false,
                executed: false,
                promql: promql_text.to_string(),
                instant: params.instant,
                message: "Set approved=true to execute this custom query.".to_string(),
            }));
        }

        let common = &params.common;
        let step = parse_step(common.step.as_deref().unwrap_or(""))?;
        let (env_key, prom_url) = self.resolve_environment(common)?;
        let range = TimeRange::resolve(&common.range, &step)?;
        range.validate_sample_volume(
            common.include_samples && !params.instant,
            self.config.max_samples_per_series,
        )?;

        let filtered = apply_target_filter(
            promql_text,
            common.server_name.as_deref(),
            common.instance.as_deref(),
        );

        let mut warnings = Vec::new();
        let alert_config = (params.alert_pct && !params.instant).then(|| AlertConfig {
            warn_pct: self.config.warn_pct,
            crit_pct: self.config.crit_pct,
            sustain_seconds: self.config.sustain_seconds(),
            step_seconds: range.step_secs,
        });
        if params.alert_pct && params.instant {
            warnings.push("alert_pct is ignored in instant mode.".to_string());
        }

        let started = Instant::now();
        if params.instant {
            let data = self
                .client
                .query_instant(&prom_url, &filtered, range.end)
                .await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let results = summarize_instant(&data, common.include_samples);

            return Ok(AdhocReport::Executed(Box::new(AdhocExecuted {
                approved: true,
                executed: true,
                promql: promql_text.to_string(),
                instant: true,
                result_type: Some(data.result_type().to_string()),
                warnings,
                filter: FilterInfo::from(common),
                alert_config: None,
                environment: env_key,
                prom_url,
                range: None,
                time: Some(iso(range.end)),
                series_count: results.len(),
                elapsed_ms,
                results,
            })));
        }

        let data = self
            .client
            .query_range(&prom_url, &filtered, range.start, range.end, &range.step)
            .await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let matrix = match data {
            QueryData::Matrix(matrix) => matrix,
            _ => Vec::new(),
        };
        let results = summarize_matrix(&matrix, common.include_samples, alert_config.as_ref());

        Ok(AdhocReport::Executed(Box::new(AdhocExecuted {
            approved: true,
            executed: true,
            promql: promql_text.to_string(),
            instant: false,
            result_type: None,
            warnings,
            filter: FilterInfo::from(common),
            alert_config,
            environment: env_key,
            prom_url,
            range: Some(RangeInfo::from(&range)),
            time: None,
            series_count: results.len(),
            elapsed_ms,
            results,
        })))
    }

    /// Compose and execute one check against an already-resolved
    /// environment and window
    /// Run a single check and fold any failure into its own slot,
    /// returning the check id alongside the outcome.
    async fn run_one_outcome(
        &self,
        check: &Check,
        prom_url: &str,
        range: &TimeRange,
        range_str: &str,
        params: &QueryParams,
    ) -> (&'static str, CheckOutcome) {
        let outcome = match self.run_one(check, prom_url, range, range_str, params).await {
            Ok(run) => CheckOutcome::Success(run),
            Err(e) => {
                tracing::warn!(check_id = check.id, error = %e, "Check failed");
                CheckOutcome::Failure(CheckFailure {
                    check: check.into(),
                    error: e.to_string(),
                })
            }
        };
        (check.id, outcome)
    }

    async fn run_one(
        &self,
        check: &Check,
        prom_url: &str,
        range: &TimeRange,
        range_str: &str,
        params: &QueryParams,
    ) -> Result<CheckRun, PromError> {
        let promql = render_template(check.promql, range_str);
        let promql = apply_target_filter(
            &promql,
            params.server_name.as_deref(),
            params.instance.as_deref(),
        );
        let alert_config = self.alert_config_for(check, range.step_secs);

        let started = Instant::now();
        let data = self
            .client
            .query_range(prom_url, &promql, range.start, range.end, &range.step)
            .await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let matrix = match data {
            QueryData::Matrix(matrix) => matrix,
            _ => Vec::new(),
        };
        let results = summarize_matrix(&matrix, params.include_samples, alert_config.as_ref());

        Ok(CheckRun {
            check: check.into(),
            series_count: results.len(),
            elapsed_ms,
            alert_config,
            results,
        })
    }
}

/// Orchestration errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Unknown check_id: {0}")]
    UnknownCheck(String),

    #[error("promql is required")]
    EmptyQuery,

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Environment(#[from] EnvError),

    #[error("Backend error: {0}")]
    Backend(#[from] PromError),
}
