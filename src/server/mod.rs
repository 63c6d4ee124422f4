//! Loopback HTTP surface of the agent.

pub mod handlers;
pub mod state;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AgentConfig;
use crate::error::AgentError;

pub use state::AppState;

/// Builds the router with its CORS and tracing layers.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/capture-and-process", post(handlers::capture_and_process))
        .route("/status", get(handlers::agent_status))
        .route("/status/{job_id}", get(handlers::job_status))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Binds the configured loopback address and serves until Ctrl+C.
pub async fn serve(config: &AgentConfig, state: AppState) -> Result<(), AgentError> {
    let addr = config
        .listen_addr()
        .map_err(|e| AgentError::Config(e.to_string()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Capture agent listening on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Capture agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
}
