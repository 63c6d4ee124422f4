use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The six states of a capture job.
///
/// Each job flows through: pending → capturing → captured → forwarding → complete,
/// and may drop to `error` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Capturing,
    Captured,
    Forwarding,
    Complete,
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Capturing => write!(f, "capturing"),
            JobState::Captured => write!(f, "captured"),
            JobState::Forwarding => write!(f, "forwarding"),
            JobState::Complete => write!(f, "complete"),
            JobState::Error => write!(f, "error"),
        }
    }
}

impl JobState {
    /// `complete` and `error` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }

    /// Whether `next` directly follows `self`.
    ///
    /// Forward edges only; no state is skipped or revisited.
    pub fn can_advance_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Pending, JobState::Capturing)
            | (JobState::Capturing, JobState::Captured)
            | (JobState::Captured, JobState::Forwarding)
            | (JobState::Forwarding, JobState::Complete) => true,
            (from, JobState::Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Rejected attempt to move a job along an edge that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_edges() {
        let path = [
            JobState::Pending,
            JobState::Capturing,
            JobState::Captured,
            JobState::Forwarding,
            JobState::Complete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn skipping_or_going_back_is_rejected() {
        assert!(!JobState::Pending.can_advance_to(JobState::Captured));
        assert!(!JobState::Capturing.can_advance_to(JobState::Forwarding));
        assert!(!JobState::Forwarding.can_advance_to(JobState::Capturing));
        assert!(!JobState::Captured.can_advance_to(JobState::Captured));
    }

    #[test]
    fn error_reachable_from_every_non_terminal_state() {
        for state in [
            JobState::Pending,
            JobState::Capturing,
            JobState::Captured,
            JobState::Forwarding,
        ] {
            assert!(state.can_advance_to(JobState::Error), "{state}");
        }
        assert!(!JobState::Complete.can_advance_to(JobState::Error));
        assert!(!JobState::Error.can_advance_to(JobState::Error));
    }

    #[test]
    fn state_display_matches_wire_name() {
        for state in [
            JobState::Pending,
            JobState::Capturing,
            JobState::Captured,
            JobState::Forwarding,
            JobState::Complete,
            JobState::Error,
        ] {
            let wire = serde_json::to_value(state).unwrap();
            assert_eq!(wire, serde_json::Value::String(state.to_string()));
        }
    }

    #[test]
    fn transition_error_display() {
        let err = TransitionError {
            from: JobState::Complete,
            to: JobState::Capturing,
        };
        assert_eq!(err.to_string(), "illegal job transition complete -> capturing");
    }
}
