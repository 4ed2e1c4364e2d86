//! Per-job progress counters, polled by the upload UI while chunks arrive.
//!
//! The store is owned by the server state and passed by reference to every
//! handler; only the import task driving a given job mutates its entry.
//! Entries accumulate until a caller that finished polling removes them.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub value: usize,
    pub max: usize,
    pub complete: bool,
}

/// Display percentage, derived on demand and never stored. One decimal.
pub fn percent(snapshot: &ProgressSnapshot) -> f64 {
    if snapshot.complete {
        return 100.0;
    }
    if snapshot.max == 0 {
        return 0.0;
    }
    (snapshot.value as f64 * 1000.0 / snapshot.max as f64).round() / 10.0
}

#[derive(Debug, Default)]
pub struct ProgressStore {
    jobs: Mutex<HashMap<Uuid, ProgressSnapshot>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-if-absent: both the upload handler and the import task
    /// register the job, in either order, without resetting a counter that
    /// has already advanced.
    pub async fn create(&self, job: Uuid, total: usize) {
        self.jobs
            .lock()
            .await
            .entry(job)
            .or_insert(ProgressSnapshot {
                value: 0,
                max: total,
                complete: false,
            });
    }

    /// Monotone: the counter only moves forward and saturates at `max`.
    pub async fn advance(&self, job: Uuid, n: usize) {
        match self.jobs.lock().await.get_mut(&job) {
            Some(entry) => entry.value = entry.max.min(entry.value + n),
            None => warn!(%job, "progress advance for unknown job"),
        }
    }

    /// Driven by the terminal chunk; flips `complete` exactly once.
    pub async fn finish(&self, job: Uuid) {
        match self.jobs.lock().await.get_mut(&job) {
            Some(entry) => entry.complete = true,
            None => warn!(%job, "progress finish for unknown job"),
        }
    }

    pub async fn get(&self, job: Uuid) -> Option<ProgressSnapshot> {
        self.jobs.lock().await.get(&job).copied()
    }

    pub async fn remove(&self, job: Uuid) -> Option<ProgressSnapshot> {
        self.jobs.lock().await.remove(&job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn value_is_monotone_and_saturating() {
        let store = ProgressStore::new();
        let job = Uuid::new_v4();
        store.create(job, 300).await;

        let mut last = 0;
        for step in [256, 44, 10] {
            store.advance(job, step).await;
            let snapshot = store.get(job).await.expect("job exists");
            assert!(snapshot.value >= last);
            assert!(snapshot.value <= snapshot.max);
            last = snapshot.value;
        }
        assert_eq!(last, 300);
    }

    #[tokio::test]
    async fn complete_flips_once_via_finish() {
        let store = ProgressStore::new();
        let job = Uuid::new_v4();
        store.create(job, 2).await;

        assert!(!store.get(job).await.expect("exists").complete);
        store.advance(job, 2).await;
        store.finish(job).await;
        let snapshot = store.get(job).await.expect("exists");
        assert!(snapshot.complete);
        assert_eq!(percent(&snapshot), 100.0);

        // finishing again is a no-op
        store.finish(job).await;
        assert_eq!(store.get(job).await.expect("exists"), snapshot);
    }

    #[tokio::test]
    async fn recreating_a_job_keeps_its_advanced_counter() {
        let store = ProgressStore::new();
        let job = Uuid::new_v4();
        store.create(job, 5).await;
        store.advance(job, 2).await;
        store.create(job, 5).await;
        let snapshot = store.get(job).await.expect("exists");
        assert_eq!(snapshot.value, 2);
        assert_eq!(snapshot.max, 5);
    }

    #[tokio::test]
    async fn percent_is_derived_with_one_decimal() {
        let snapshot = ProgressSnapshot {
            value: 1,
            max: 3,
            complete: false,
        };
        assert_eq!(percent(&snapshot), 33.3);

        let empty = ProgressSnapshot {
            value: 0,
            max: 0,
            complete: false,
        };
        assert_eq!(percent(&empty), 0.0);
    }

    #[tokio::test]
    async fn removed_jobs_stop_reporting() {
        let store = ProgressStore::new();
        let job = Uuid::new_v4();
        store.create(job, 1).await;
        assert!(store.remove(job).await.is_some());
        assert!(store.get(job).await.is_none());
    }
}
