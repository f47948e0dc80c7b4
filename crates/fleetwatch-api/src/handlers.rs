//! REST API handlers.
//!
//! Each handler delegates to the store, orchestrator, tracker or notifier
//! and returns the uniform JSON envelope.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use fleetwatch_health::HealthError;
use fleetwatch_notify::format_report;
use fleetwatch_rollout::{PipelineStatus, TrackerError};
use fleetwatch_state::{Snapshot, StateError, Target};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn state_error(e: StateError) -> axum::response::Response {
    if !e.is_client_error() {
        error!(error = %e, "state store operation failed");
    }
    let status = match &e {
        StateError::AlreadyExists(_) => StatusCode::CONFLICT,
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

/// Malformed, mistyped or missing JSON bodies are client errors.
fn rejected_body(e: JsonRejection) -> axum::response::Response {
    debug!(error = %e, "rejected request body");
    error_response(
        &format!("invalid request body: {}", e.body_text()),
        StatusCode::BAD_REQUEST,
    )
    .into_response()
}

fn health_error(e: HealthError) -> axum::response::Response {
    error!(error = %e, "health cycle failed");
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Pipeline status paired with a health snapshot.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub pipeline: PipelineStatus,
    pub health: Snapshot,
}

// ── Liveness ───────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "ok" }))
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn run_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.health.run_cycle().await {
        Ok(health) => ApiResponse::ok(StatusReport {
            pipeline: state.tracker.pipeline_status(),
            health,
        })
        .into_response(),
        Err(e) => health_error(e),
    }
}

/// GET /api/v1/status/latest
pub async fn latest_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.health.latest() {
        Ok(health) => ApiResponse::ok(serde_json::json!({
            "pipeline": state.tracker.pipeline_status(),
            "health": health,
        }))
        .into_response(),
        Err(e) => health_error(e),
    }
}

// ── Targets ────────────────────────────────────────────────────

/// Target registration body. Fields are optional so that missing values
/// get a 400 with a message instead of an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct RegisterTarget {
    pub name: Option<String>,
    pub url: Option<String>,
}

/// GET /api/v1/targets
pub async fn list_targets(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_targets() {
        Ok(targets) => ApiResponse::ok(targets).into_response(),
        Err(e) => state_error(e),
    }
}

/// POST /api/v1/targets
pub async fn register_target(
    State(state): State<ApiState>,
    body: Result<Json<RegisterTarget>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return rejected_body(e),
    };
    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    let url = req.url.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || url.is_empty() {
        return error_response("name and url are required", StatusCode::BAD_REQUEST)
            .into_response();
    }

    let target = Target::new(name, url, epoch_millis());
    match state.store.add_target(&target) {
        Ok(()) => {
            info!(target_name = %target.name, url = %target.url, "target registered");
            (StatusCode::CREATED, ApiResponse::ok(target)).into_response()
        }
        Err(e) => state_error(e),
    }
}

/// DELETE /api/v1/targets/{name}
pub async fn remove_target(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.remove_target(&name) {
        Ok(removed) => {
            info!(target_name = %removed.name, "target removed");
            ApiResponse::ok(removed).into_response()
        }
        Err(e) => state_error(e),
    }
}

// ── Deployments ────────────────────────────────────────────────

/// Deployment request body.
#[derive(Debug, Deserialize)]
pub struct StartDeployment {
    pub version: Option<String>,
}

/// GET /api/v1/deployments
pub async fn list_deployments(State(state): State<ApiState>) -> impl IntoResponse {
    match state.tracker.history() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(TrackerError::State(e)) => state_error(e),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
    }
}

/// POST /api/v1/deployments
pub async fn start_deployment(
    State(state): State<ApiState>,
    body: Result<Json<StartDeployment>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return rejected_body(e),
    };
    let version = req.version.unwrap_or_default();
    match state.tracker.start(&version).await {
        Ok(record) => (StatusCode::ACCEPTED, ApiResponse::ok(record)).into_response(),
        Err(TrackerError::Validation(msg)) => {
            error_response(&msg, StatusCode::BAD_REQUEST).into_response()
        }
        Err(TrackerError::State(e)) => state_error(e),
    }
}

// ── History log ────────────────────────────────────────────────

/// GET /api/v1/logs
pub async fn list_logs(State(state): State<ApiState>) -> impl IntoResponse {
    match state.health.history() {
        Ok(snapshots) => ApiResponse::ok(snapshots).into_response(),
        Err(e) => health_error(e),
    }
}

// ── Notifications ──────────────────────────────────────────────

/// POST /api/v1/notify
pub async fn send_report(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = match state.health.run_cycle().await {
        Ok(snapshot) => snapshot,
        Err(e) => return health_error(e),
    };

    let message = format_report(&snapshot, state.tracker.pipeline_status());
    let delivered = state.notifier.notify(&message).await;

    ApiResponse::ok(serde_json::json!({
        "delivered": delivered,
        "message": message,
    }))
    .into_response()
}
