//! Single-flight admission for the capture pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A binary gate: at most one pipeline holds it at a time.
///
/// Rejection is immediate; there is no queue.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    held: AtomicBool,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the gate held. Returns `false` if it already was.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Frees the gate. Safe to call once per successful acquire.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquires the gate as a guard that releases it on drop, including
    /// when the owning task unwinds.
    pub fn try_permit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        self.try_acquire().then(|| AdmissionPermit {
            gate: Arc::clone(self),
        })
    }
}

/// Held for the lifetime of one pipeline run.
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release();
        tracing::debug!("Admission gate released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let gate = AdmissionGate::new();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(gate.is_held());
        gate.release();
        assert!(!gate.is_held());
        assert!(gate.try_acquire());
    }

    #[test]
    fn permit_releases_on_drop() {
        let gate = Arc::new(AdmissionGate::new());
        let permit = gate.try_permit().unwrap();
        assert!(gate.try_permit().is_none());
        drop(permit);
        assert!(!gate.is_held());
        assert!(gate.try_permit().is_some());
    }

    #[tokio::test]
    async fn permit_released_when_task_panics() {
        let gate = Arc::new(AdmissionGate::new());
        let permit = gate.try_permit().unwrap();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("pipeline blew up");
        });
        assert!(handle.await.is_err());
        assert!(!gate.is_held());
    }

    #[test]
    fn only_one_thread_wins() {
        let gate = Arc::new(AdmissionGate::new());
        let winners: usize = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.try_acquire() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }
}
