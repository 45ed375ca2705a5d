use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    active_alerts, health_check, list_checks, list_environments, list_process_groups,
    list_servers, run_all_checks, run_check, run_query, AppState,
};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::runner::Runner;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Catalog
        .route("/checks", get(list_checks))
        .route("/checks/run", post(run_all_checks))
        .route("/checks/:id/run", post(run_check))
        // Ad-hoc queries (approval-gated)
        .route("/query", post(run_query))
        // Environment & target discovery
        .route("/environments", get(list_environments))
        .route("/servers", get(list_servers))
        .route("/process-groups", get(list_process_groups))
        // Active alerts
        .route("/alerts", get(active_alerts))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(
    server: ServerConfig,
    config: AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let catalog = Arc::new(Catalog::builtin());
    let runner = Runner::new(Arc::clone(&config), catalog);

    let state = Arc::new(AppState { config, runner });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
    tracing::info!("Starting promwatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("promwatch server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received");
}
