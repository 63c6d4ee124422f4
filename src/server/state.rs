//! State shared by every handler.

use crate::orchestrator::Pipeline;

/// Passed to handlers via `State<AppState>`. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}
