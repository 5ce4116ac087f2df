//! `approvals serve` -- HTTP JSON API for the approval workflow.
//!
//! Runs the orchestration core over the in-memory engine using `axum` +
//! `tokio`. The acting identity comes from the `X-User-Id` and
//! `X-User-Roles` headers, or from the request body where an operation
//! accepts one.
//!
//! Endpoints:
//! - GET  /health                       - Server status
//! - POST /api/process/start            - Start a case
//! - GET  /api/process/{case_id}        - Resolved status of a case
//! - GET  /api/tasks?role=&userId=      - Tasks assigned to a user
//! - POST /api/tasks/{task_id}/approve  - Approve an approval task
//! - POST /api/tasks/{task_id}/reject   - Reject an approval task
//! - POST /api/tasks/{task_id}/complete - Complete a manual task
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use approvals_core::{AuditListener, TracingAuditSink, Workflow};
use approvals_engine::InMemoryEngine;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_approve, handle_complete, handle_find_tasks, handle_health, handle_not_found,
    handle_reject, handle_start, handle_status,
};
use self::middleware::{identity_middleware, trace_middleware};
use self::state::AppState;
use crate::config::ServeConfig;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Build the in-memory engine and the workflow over it, checking that the
/// configured definition exists.
pub(crate) async fn build_state(
    config: &ServeConfig,
) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let audit = Arc::new(TracingAuditSink);
    let engine = InMemoryEngine::new().with_listener(Arc::new(AuditListener::new(audit.clone())));
    let known = engine.definition_keys().await;
    if !known.contains(&config.definition_key) {
        return Err(format!(
            "unknown process definition '{}' (available: {})",
            config.definition_key,
            known.join(", ")
        )
        .into());
    }
    let workflow =
        Workflow::new(Arc::new(engine), audit).with_definition_key(&config.definition_key);
    Ok(Arc::new(AppState { workflow }))
}

pub(crate) fn router(state: Arc<AppState>, max_body_size: usize) -> Router {
    // CORS: permissive for local dev
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/process/start", post(handle_start))
        .route("/api/process/{case_id}", get(handle_status))
        .route("/api/tasks", get(handle_find_tasks))
        .route("/api/tasks/{task_id}/approve", post(handle_approve))
        .route("/api/tasks/{task_id}/reject", post(handle_reject))
        .route("/api/tasks/{task_id}/complete", post(handle_complete))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn(identity_middleware))
        .layer(axum_middleware::from_fn(trace_middleware))
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config).await?;
    let app = router(state, config.max_body_size);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        definition_key = %config.definition_key,
        "approval workflow listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
