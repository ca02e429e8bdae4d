// HTTP handlers for the management surface

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use common::errors::ManagementError;
use common::models::ScheduleRow;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "invalid_key" => StatusCode::BAD_REQUEST,
            "submission_rejected" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<ManagementError> for ErrorResponse {
    fn from(err: ManagementError) -> Self {
        let code = match &err {
            ManagementError::InvalidKey(_) => "invalid_key",
            ManagementError::Submission(_) => "submission_rejected",
            ManagementError::Query(_) => "query_failed",
            ManagementError::Build(_) => "internal_error",
        };
        ErrorResponse::new(code, err.to_string())
    }
}

/// Standard API success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Health check endpoint
#[tracing::instrument]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// Invoke a job immediately
///
/// The job key is `[<group>.]<name>`.
#[tracing::instrument(skip(state))]
pub async fn run_job_now(
    State(state): State<AppState>,
    Path(job_key): Path<String>,
) -> Result<SuccessResponse<String>, ErrorResponse> {
    let trigger_key = state.admin.run_immediately(&job_key).await?;
    Ok(SuccessResponse::new(trigger_key.to_string()))
}

/// Request body for delayed invocation
#[derive(Debug, Deserialize)]
pub struct RunAfterDelayRequest {
    pub delay_seconds: u64,
    /// When true the job fires immediately upon recovery however late;
    /// when false a missed fire window drops the invocation.
    #[serde(default)]
    pub persistent_retry: bool,
}

/// Invoke a job once after a delay
#[tracing::instrument(skip(state))]
pub async fn run_job_after_delay(
    State(state): State<AppState>,
    Path(job_key): Path<String>,
    Json(req): Json<RunAfterDelayRequest>,
) -> Result<SuccessResponse<String>, ErrorResponse> {
    let trigger_key = state
        .admin
        .run_after_delay(&job_key, req.delay_seconds, req.persistent_retry)
        .await?;
    Ok(SuccessResponse::new(trigger_key.to_string()))
}

/// List all registered job identities
#[tracing::instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<String>>, ErrorResponse> {
    Ok(SuccessResponse::new(state.admin.list_jobs().await?))
}

/// List all active triggers
#[tracing::instrument(skip(state))]
pub async fn list_schedule(
    State(state): State<AppState>,
) -> Result<SuccessResponse<Vec<ScheduleRow>>, ErrorResponse> {
    Ok(SuccessResponse::new(state.admin.list_schedule().await?))
}

/// Prometheus metrics endpoint
#[tracing::instrument(skip(state))]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.render())
}
