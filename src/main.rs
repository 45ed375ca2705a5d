//! Promwatch Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - PROMWATCH_HOST: Bind address (default: 0.0.0.0)
//! - PROMWATCH_PORT: Port number (default: 8080)
//! - PROM_URL: Default backend URL when no environment is selected
//! - PROM_ENV_URLS: JSON object of environment key -> backend URL
//! - PROM_BEARER_TOKEN: Bearer token for backend requests
//! - PROM_TIMEOUT_SEC: Per-request HTTP timeout (default: 15)
//! - ALERT_WARN_PCT / ALERT_CRIT_PCT: Thresholds for percent checks (85/95)
//! - ALERT_SUSTAIN_MINUTES: Minimum breach duration (default: 5)
//! - PROM_MAX_SAMPLES_PER_SERIES: Raw-sample ceiling (default: 5000)
//! - PROM_MAX_PARALLEL_CHECKS: Fan-out worker bound (default: 6)
//! - RUST_LOG: Log level (default: info)

use promwatch::api::{run_server, ServerConfig};
use promwatch::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("PROMWATCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PROMWATCH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let config = AppConfig::from_env();

    tracing::info!("Promwatch configuration:");
    tracing::info!("  Host: {}:{}", host, port);
    tracing::info!(
        "  Default backend URL: {}",
        config.default_url.as_deref().unwrap_or("(none)")
    );
    tracing::info!("  Environments: {}", config.env_urls.len());
    for key in config.env_urls.keys() {
        tracing::info!("    - {}", key);
    }
    tracing::info!(
        "  Bearer token: {}",
        if config.bearer_token.is_some() {
            "configured"
        } else {
            "(none)"
        }
    );
    tracing::info!("  HTTP timeout: {:?}", config.http_timeout);
    tracing::info!(
        "  Alert thresholds: warn {}%, crit {}%, sustain {} min",
        config.warn_pct,
        config.crit_pct,
        config.sustain_minutes
    );
    tracing::info!("  Max samples per series: {}", config.max_samples_per_series);
    tracing::info!("  Max parallel checks: {}", config.max_parallel_checks);

    run_server(ServerConfig { host, port }, config).await
}
