//! Request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::orchestrator::CaptureRequest;
use crate::state_machine::Job;

use super::state::AppState;

/// Body of a `202` answer to `POST /capture-and-process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub job_id: String,
    pub message: String,
}

/// Self-report served by `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusResponse {
    pub status: String,
    pub version: String,
    pub is_processing: bool,
}

/// POST /capture-and-process
///
/// Busy is decided before the body is read, so a busy agent answers `503`
/// even for a malformed request.
pub async fn capture_and_process(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    if state.pipeline.is_busy() {
        tracing::warn!("Rejected new request because agent is busy");
        return Err(ApiError::Busy);
    }

    let request = parse_capture_request(&body)?;
    let job_id = state
        .pipeline
        .submit(request)
        .map_err(|_| ApiError::Busy)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            job_id,
            message: "Request accepted for processing.".to_string(),
        }),
    ))
}

/// GET /status/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .pipeline
        .registry()
        .observe(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Job not found.".to_string()))
}

/// GET /status
pub async fn agent_status(State(state): State<AppState>) -> Json<AgentStatusResponse> {
    Json(AgentStatusResponse {
        status: "capture-agent is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        is_processing: state.pipeline.is_busy(),
    })
}

/// Any unknown route or method.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found.".to_string())
}

fn parse_capture_request(body: &[u8]) -> Result<CaptureRequest, ApiError> {
    // An absent body reads as `{}` and fails on the required fields.
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body)
            .map_err(|_| ApiError::Validation("Invalid JSON in request body.".to_string()))?
    };

    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    match (field("subjectId"), field("fingerCode")) {
        (Some(subject_id), Some(finger_code)) => Ok(CaptureRequest {
            subject_id,
            finger_code,
        }),
        _ => Err(ApiError::Validation(
            "subjectId and fingerCode are required.".to_string(),
        )),
    }
}
