use std::sync::Arc;

use thiserror::Error;

use crate::capture::{CaptureError, CaptureRunner};
use crate::forward::{ForwardError, ForwardRequest, ForwardResult, PayloadSender};
use crate::gate::{AdmissionGate, AdmissionPermit};
use crate::registry::JobRegistry;
use crate::state_machine::{FailureDetail, FailureKind, JobDetail, JobState};

/// Caller identifiers that accompany a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub subject_id: String,
    pub finger_code: String,
}

/// Any failure that ends a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error("pipeline task aborted: {0}")]
    Aborted(String),
}

/// Returned by [`Pipeline::submit`] while another run holds the gate.
#[derive(Debug, Error)]
#[error("a capture is already in progress")]
pub struct AdmissionRejected;

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

impl From<&PipelineError> for FailureDetail {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::Capture(capture) => match capture {
                CaptureError::Spawn { .. } => {
                    FailureDetail::new(FailureKind::SpawnError, capture.to_string())
                }
                CaptureError::ProcessExit {
                    code,
                    stderr,
                    stdout,
                } => FailureDetail {
                    exit_code: Some(*code),
                    stderr: Some(stderr.clone()),
                    stdout: non_empty(stdout),
                    ..FailureDetail::new(FailureKind::ProcessExitError, capture.to_string())
                },
                CaptureError::NoPayload {
                    stdout,
                    stderr,
                    overflowed,
                } => {
                    let mut message = capture.to_string();
                    if *overflowed {
                        message.push_str(" (marker line exceeded the line limit)");
                    }
                    FailureDetail {
                        exit_code: Some(0),
                        stdout: Some(stdout.clone()),
                        stderr: non_empty(stderr),
                        ..FailureDetail::new(FailureKind::NoPayloadError, message)
                    }
                }
                CaptureError::Timeout { stderr, .. } => FailureDetail {
                    stderr: non_empty(stderr),
                    ..FailureDetail::new(FailureKind::CaptureTimeout, capture.to_string())
                },
            },
            PipelineError::Forward(forward) => FailureDetail {
                status_code: forward.status(),
                response_data: forward.body().cloned(),
                ..FailureDetail::new(FailureKind::ForwardError, forward.to_string())
            },
            PipelineError::Aborted(_) => {
                FailureDetail::new(FailureKind::InternalError, err.to_string())
            }
        }
    }
}

/// Drives capture jobs from admission to a terminal state.
///
/// Clones share the same components.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<JobRegistry>,
    gate: Arc<AdmissionGate>,
    runner: Arc<CaptureRunner>,
    sender: Arc<dyn PayloadSender>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<JobRegistry>,
        gate: Arc<AdmissionGate>,
        runner: Arc<CaptureRunner>,
        sender: Arc<dyn PayloadSender>,
    ) -> Self {
        Self {
            registry,
            gate,
            runner,
            sender,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Whether a run currently holds the admission gate.
    pub fn is_busy(&self) -> bool {
        self.gate.is_held()
    }

    /// Admits a new run, creates its job and starts it in the background.
    ///
    /// Returns as soon as the job exists; the outcome is only observable
    /// through the registry.
    pub fn submit(&self, request: CaptureRequest) -> Result<String, AdmissionRejected> {
        let Some(permit) = self.gate.try_permit() else {
            tracing::warn!("Rejected new request: a capture is already running");
            return Err(AdmissionRejected);
        };

        let job_id = self.registry.create();
        let pipeline = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            pipeline.supervise(permit, id, request).await;
        });
        Ok(job_id)
    }

    // Runs the stages on their own task so a panic still ends in a terminal
    // state. The permit is released only after that state is written.
    async fn supervise(self, permit: AdmissionPermit, job_id: String, request: CaptureRequest) {
        let worker = self.clone();
        let id = job_id.clone();
        let outcome = match tokio::spawn(async move { worker.execute(&id, request).await }).await
        {
            Ok(outcome) => outcome,
            Err(e) => Err(PipelineError::Aborted(e.to_string())),
        };

        self.finish(&job_id, outcome);
        drop(permit);
        tracing::info!(job_id = %job_id, "Processing finished. Agent is now free.");
    }

    async fn execute(
        &self,
        job_id: &str,
        request: CaptureRequest,
    ) -> Result<ForwardResult, PipelineError> {
        self.advance(
            job_id,
            JobState::Capturing,
            JobDetail::message("Waiting for capture from device..."),
        );
        let capture = self.runner.run().await?;

        self.advance(
            job_id,
            JobState::Captured,
            JobDetail::message("Capture completed successfully."),
        );

        self.advance(
            job_id,
            JobState::Forwarding,
            JobDetail::message(format!("Sending data to {}...", self.sender.endpoint())),
        );
        let forward = ForwardRequest {
            subject_id: request.subject_id,
            finger_code: request.finger_code,
            payload: capture.payload,
        };
        Ok(self.sender.send(&forward).await?)
    }

    fn finish(&self, job_id: &str, outcome: Result<ForwardResult, PipelineError>) {
        match outcome {
            Ok(result) => self.advance(
                job_id,
                JobState::Complete,
                JobDetail::Result {
                    result: result.body,
                    status_code: result.status,
                },
            ),
            Err(e) => {
                tracing::error!(job_id = %job_id, "Error in job: {e}");
                self.advance(job_id, JobState::Error, JobDetail::Failure(FailureDetail::from(&e)));
            }
        }
    }

    fn advance(&self, job_id: &str, state: JobState, detail: JobDetail) {
        if let Err(e) = self.registry.update(job_id, state, detail) {
            tracing::warn!(job_id = %job_id, "Dropped job update: {e}");
        }
    }
}
