//! Error type for the forwarding client.
//!
//! [`ForwardError`] separates the three ways a single forward attempt can
//! fail so the pipeline can report the remote status and body when one was
//! received, and a plain cause otherwise.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    /// The remote service answered with a non-2xx status.
    #[error("remote service returned status {status}")]
    Remote { status: u16, body: Option<Value> },

    /// No answer within the configured forward timeout.
    #[error("request to remote service timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Connection-level failure (DNS, refused connection, broken body).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl ForwardError {
    /// Remote HTTP status, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ForwardError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Remote response body, when one was received.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ForwardError::Remote { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}
