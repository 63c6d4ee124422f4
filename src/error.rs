use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced synchronously to the HTTP caller.
///
/// Pipeline stage failures never show up here; they land in the job's
/// terminal `error` state instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Agent is busy with a previous request. Please wait.")]
    Busy,

    #[error("{0}")]
    NotFound(String),
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Busy => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ApiErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_status_codes() {
        assert_eq!(
            ApiError::Validation("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Busy.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::NotFound("Job not found.".into()).status_and_code(),
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        );
    }

    #[test]
    fn busy_display() {
        assert_eq!(
            ApiError::Busy.to_string(),
            "Agent is busy with a previous request. Please wait."
        );
    }

    #[test]
    fn agent_error_display() {
        let err = AgentError::Config("host must be loopback".into());
        assert_eq!(err.to_string(), "Config error: host must be loopback");
    }
}
