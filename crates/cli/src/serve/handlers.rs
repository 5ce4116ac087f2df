//! HTTP route handlers: health, cases and tasks.

use std::sync::Arc;

use approvals_core::{
    ActionRequest, DecisionRequest, ErrorKind, RequestContext, StartCaseRequest, WorkflowError,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;

use super::json_error;
use super::state::AppState;

/// Map a core error to its HTTP status and a `{"error": ...}` body.
fn workflow_error(err: WorkflowError) -> Response {
    let status = match err.kind() {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &err.to_string()).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => workflow_error(e),
    }
}

fn bad_json(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, &rejection.body_text()).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// POST /api/process/start
pub(crate) async fn handle_start(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<StartCaseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    respond(state.workflow.start_case(&ctx, request).await)
}

/// GET /api/process/{case_id}
pub(crate) async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Response {
    respond(state.workflow.status(&case_id).await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskListParams {
    role: Option<String>,
    user_id: Option<String>,
}

/// GET /api/tasks?role=&userId=
pub(crate) async fn handle_find_tasks(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    params: Result<Query<TaskListParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, &rejection.body_text()).into_response()
        }
    };
    respond(
        state
            .workflow
            .find_tasks(&ctx, params.role.as_deref(), params.user_id.as_deref())
            .await,
    )
}

/// POST /api/tasks/{task_id}/approve
pub(crate) async fn handle_approve(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<String>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    respond(state.workflow.approve(&ctx, &task_id, request).await)
}

/// POST /api/tasks/{task_id}/reject
pub(crate) async fn handle_reject(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<String>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    respond(state.workflow.reject(&ctx, &task_id, request).await)
}

/// POST /api/tasks/{task_id}/complete
pub(crate) async fn handle_complete(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<String>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    respond(state.workflow.complete(&ctx, &task_id, request).await)
}
