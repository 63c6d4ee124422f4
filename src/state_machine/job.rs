use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::{JobState, TransitionError};

/// Which pipeline stage failed, as reported to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    SpawnError,
    ProcessExitError,
    NoPayloadError,
    CaptureTimeout,
    ForwardError,
    /// The pipeline task itself panicked.
    InternalError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::SpawnError => "SpawnError",
            FailureKind::ProcessExitError => "ProcessExitError",
            FailureKind::NoPayloadError => "NoPayloadError",
            FailureKind::CaptureTimeout => "CaptureTimeout",
            FailureKind::ForwardError => "ForwardError",
            FailureKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// Terminal error body: every stage failure is normalized into this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            stderr: None,
            stdout: None,
            status_code: None,
            response_data: None,
        }
    }
}

/// Structured payload attached at each transition.
///
/// Untagged on the wire: `{kind, message, ...}` for failures,
/// `{result, statusCode}` on completion, `{message}` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobDetail {
    Failure(FailureDetail),
    Result {
        result: Value,
        #[serde(rename = "statusCode")]
        status_code: u16,
    },
    Message {
        message: String,
    },
}

impl JobDetail {
    pub fn message(message: impl Into<String>) -> Self {
        JobDetail::Message {
            message: message.into(),
        }
    }
}

/// One end-to-end pipeline execution, as stored in the registry and served to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub detail: JobDetail,
    /// Every state entered so far, starting with `pending`.
    pub state_history: Vec<JobState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Pending,
            detail: JobDetail::message("Request accepted for processing."),
            state_history: vec![JobState::Pending],
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job along one edge, replacing its detail.
    ///
    /// On an illegal edge the job is left untouched.
    pub fn advance(&mut self, next: JobState, detail: JobDetail) -> Result<(), TransitionError> {
        if !self.state.can_advance_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.detail = detail;
        self.state_history.push(next);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}
