mod job;
mod state;

pub use job::{FailureDetail, FailureKind, Job, JobDetail};
pub use state::{JobState, TransitionError};
