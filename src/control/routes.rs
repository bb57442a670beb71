//! Control API route handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::warn;

use crate::engine::scheduler::{CycleReport, Scheduler, SchedulerError, SchedulerStatus};

pub type AppState = Arc<Scheduler>;

#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (StatusCode::CONFLICT, Json(body)).into_response()
    }
}

/// Reject action requests that lack the configured bearer token.
pub async fn require_token(
    State(token): State<Arc<SecretString>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(token.expose_secret().as_str()) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Control request without a valid token");
    let body = ErrorResponse {
        error: "missing or invalid bearer token".to_string(),
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status
pub async fn get_status(State(scheduler): State<AppState>) -> Json<SchedulerStatus> {
    Json(scheduler.status().await)
}

/// POST /api/start
pub async fn start(
    State(scheduler): State<AppState>,
) -> Result<Json<ActionResponse>, SchedulerError> {
    scheduler.start().await?;
    Ok(Json(ActionResponse {
        ok: true,
        running: scheduler.is_running(),
    }))
}

/// POST /api/stop
///
/// Returns once the stop is requested; an in-flight cycle still completes.
pub async fn stop(
    State(scheduler): State<AppState>,
) -> Result<Json<ActionResponse>, SchedulerError> {
    scheduler.stop()?;
    Ok(Json(ActionResponse {
        ok: true,
        running: scheduler.is_running(),
    }))
}

/// POST /api/cycle
pub async fn run_cycle(
    State(scheduler): State<AppState>,
) -> Result<Json<CycleReport>, SchedulerError> {
    Ok(Json(scheduler.run_cycle().await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
