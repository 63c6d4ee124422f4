//! In-memory job store shared between the pipeline and status pollers.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::state_machine::{Job, JobDetail, JobState, TransitionError};

/// Jobs keyed by id.
///
/// Writers replace a job's whole snapshot under the shard lock, so a reader
/// never observes a partially updated job.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<String, Job>,
    // Ids with a pending removal, so repeated polls schedule one reap.
    reaping: DashSet<String>,
    reap_delay: Duration,
}

impl JobRegistry {
    pub fn new(reap_delay: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            reaping: DashSet::new(),
            reap_delay,
        }
    }

    /// Inserts a fresh `pending` job and returns its id.
    pub fn create(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.jobs.entry(id.clone()) {
                slot.insert(Job::with_id(id.clone()));
                tracing::info!(job_id = %id, "Job created");
                return id;
            }
        }
    }

    /// Advances a job and replaces its detail.
    ///
    /// Unknown ids are ignored. An illegal edge leaves the stored job as it was.
    pub fn update(
        &self,
        id: &str,
        state: JobState,
        detail: JobDetail,
    ) -> Result<(), TransitionError> {
        let Some(mut entry) = self.jobs.get_mut(id) else {
            tracing::debug!(job_id = %id, %state, "Update for unknown job ignored");
            return Ok(());
        };

        let mut next = entry.value().clone();
        next.advance(state, detail)?;
        *entry = next;
        tracing::info!(job_id = %id, %state, "Job status updated");
        Ok(())
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot for a status poll. A terminal job gets its removal scheduled
    /// the first time it is observed.
    pub fn observe(self: &Arc<Self>, id: &str) -> Option<Job> {
        let job = self.get(id)?;
        if job.is_terminal() {
            self.reap(id);
        }
        Some(job)
    }

    /// Schedules removal of `id` after the grace delay. Idempotent while a
    /// removal is pending.
    pub fn reap(self: &Arc<Self>, id: &str) {
        if !self.reaping.insert(id.to_string()) {
            return;
        }

        let registry = Arc::clone(self);
        let id = id.to_string();
        let delay = self.reap_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.jobs.remove(&id);
            registry.reaping.remove(&id);
            tracing::debug!(job_id = %id, remaining = registry.len(), "Job reaped");
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{FailureDetail, FailureKind};

    fn registry(delay_ms: u64) -> Arc<JobRegistry> {
        Arc::new(JobRegistry::new(Duration::from_millis(delay_ms)))
    }

    #[test]
    fn create_inserts_pending_job() {
        let registry = registry(10);
        let id = registry.create();
        let job = registry.get(&id).unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn create_never_reuses_ids() {
        let registry = registry(10);
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let registry = registry(10);
        assert!(
            registry
                .update("missing", JobState::Capturing, JobDetail::message("x"))
                .is_ok()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn update_replaces_state_and_detail() {
        let registry = registry(10);
        let id = registry.create();
        registry
            .update(&id, JobState::Capturing, JobDetail::message("waiting"))
            .unwrap();
        let job = registry.get(&id).unwrap();
        assert_eq!(job.state, JobState::Capturing);
        assert_eq!(job.detail, JobDetail::message("waiting"));
    }

    #[test]
    fn illegal_update_keeps_previous_snapshot() {
        let registry = registry(10);
        let id = registry.create();
        let err = registry
            .update(&id, JobState::Forwarding, JobDetail::message("skip"))
            .unwrap_err();
        assert_eq!(err.to, JobState::Forwarding);
        assert_eq!(registry.get(&id).unwrap().state, JobState::Pending);
    }

    #[tokio::test]
    async fn terminal_job_survives_grace_delay_then_disappears() {
        let registry = registry(200);
        let id = registry.create();
        registry
            .update(
                &id,
                JobState::Error,
                JobDetail::Failure(FailureDetail::new(FailureKind::SpawnError, "missing")),
            )
            .unwrap();

        assert!(registry.observe(&id).is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.observe(&id).is_some(), "gone before grace delay");
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(registry.get(&id).is_none(), "still present after grace delay");
    }

    #[tokio::test]
    async fn non_terminal_job_is_not_reaped_by_polling() {
        let registry = registry(20);
        let id = registry.create();
        assert!(registry.observe(&id).is_some());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(registry.get(&id).is_some());
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_snapshots() {
        let registry = registry(10);
        let id = registry.create();

        let reader = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..200 {
                    let job = registry.get(&id).unwrap();
                    assert_eq!(job.state_history.last(), Some(&job.state));
                    assert!(job.state_history.len() >= last, "state went backwards");
                    last = job.state_history.len();
                    tokio::task::yield_now().await;
                }
            })
        };

        for (state, msg) in [
            (JobState::Capturing, "capturing"),
            (JobState::Captured, "captured"),
            (JobState::Forwarding, "forwarding"),
        ] {
            registry
                .update(&id, state, JobDetail::message(msg))
                .unwrap();
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();
    }
}
