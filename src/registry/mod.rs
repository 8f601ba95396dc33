//! 作业注册表模块：作业生命周期状态的唯一事实来源。
//!
//! # Job Registry Module
//!
//! Holds every job the scheduler knows about and is the only place job
//! state changes. All transitions go through the [`Job`] state machine, so an
//! illegal transition (e.g. cancelling a job that is already processing)
//! surfaces as [`Error::InvalidState`] rather than corrupting the record.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`JobRegistry`] | Lifecycle operations keyed by [`JobId`] |
//! | [`JobStore`] | Pluggable backing store |
//! | [`InMemoryJobStore`] | Default `RwLock<HashMap>` store |

mod store;

pub use store::{InMemoryJobStore, JobStore};

use crate::types::{BatchId, Job, JobError, JobId, JobOutcome, JobStatusRecord};
use crate::{Error, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct JobRegistry {
    store: Arc<dyn JobStore>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryJobStore::new()))
    }

    pub fn insert(&self, job: Job) -> JobId {
        let id = job.id;
        self.store.insert(job);
        id
    }

    pub fn get(&self, id: &JobId) -> Result<Job> {
        self.store.get(id).ok_or_else(|| Error::not_found(id))
    }

    pub fn status(&self, id: &JobId) -> Result<JobStatusRecord> {
        self.get(id).map(|job| JobStatusRecord::from(&job))
    }

    pub fn outcome(&self, id: &JobId) -> Result<JobOutcome> {
        self.get(id).map(|job| JobOutcome::from(&job))
    }

    /// Run a transition under the store lock and return the updated record.
    fn apply(&self, id: &JobId, mut op: impl FnMut(&mut Job) -> Result<()>) -> Result<Job> {
        let mut outcome = None;
        let found = self.store.update(id, &mut |job| {
            outcome = Some(op(job).map(|_| job.clone()));
        });
        if !found {
            return Err(Error::not_found(id));
        }
        outcome.unwrap_or_else(|| Err(Error::not_found(id)))
    }

    pub fn mark_queued(&self, id: &JobId) -> Result<Job> {
        self.apply(id, |job| job.mark_queued())
    }

    /// Move every still-queued job of a batch to processing.
    ///
    /// Returns one flag per id; `false` means the job was cancelled (or is
    /// otherwise no longer queued) and must not be dispatched.
    pub fn begin_processing(&self, ids: &[JobId], batch_id: BatchId) -> Vec<bool> {
        ids.iter()
            .map(|id| self.apply(id, |job| job.mark_processing(batch_id)).is_ok())
            .collect()
    }

    pub fn complete(&self, id: &JobId, result: Value) -> Result<Job> {
        self.apply(id, |job| job.complete(result.clone()))
    }

    pub fn fail(&self, id: &JobId, error: &JobError) -> Result<Job> {
        self.apply(id, |job| job.fail(error.clone()))
    }

    pub fn cancel(&self, id: &JobId) -> Result<Job> {
        self.apply(id, |job| job.cancel())
    }

    /// Drop terminal jobs that finished more than `older_than` ago.
    pub fn purge_finished(&self, older_than: Duration) -> usize {
        let age = chrono::Duration::from_std(older_than)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let cutoff = Utc::now().checked_sub_signed(age);
        self.store.retain(&mut |job| {
            let finished = match (job.is_terminal(), job.completed_at, cutoff) {
                (true, Some(done), Some(cutoff)) => done <= cutoff,
                _ => false,
            };
            !finished
        })
    }

    /// Forget the given jobs regardless of state. Used to withdraw a
    /// submission that was never admitted.
    pub fn remove(&self, ids: &[JobId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let ids: HashSet<&JobId> = ids.iter().collect();
        self.store.retain(&mut |job| !ids.contains(&job.id))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobStatus, Priority, TaskType};
    use serde_json::json;

    fn queued(reg: &JobRegistry, input: &str) -> JobId {
        let id = reg.insert(Job::new(TaskType::Sentiment, Priority::Normal, input));
        reg.mark_queued(&id).unwrap();
        id
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let reg = JobRegistry::in_memory();
        let err = reg.status(&JobId::new()).unwrap_err();
        assert!(err.is_not_found());
        assert!(reg.outcome(&JobId::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_begin_processing_skips_cancelled() {
        let reg = JobRegistry::in_memory();
        let a = queued(&reg, "a");
        let b = queued(&reg, "b");
        let c = queued(&reg, "c");
        reg.cancel(&b).unwrap();

        let started = reg.begin_processing(&[a, b, c], BatchId(4));
        assert_eq!(started, vec![true, false, true]);
        assert_eq!(reg.get(&a).unwrap().status, JobStatus::Processing);
        assert_eq!(reg.get(&b).unwrap().status, JobStatus::Cancelled);
        assert_eq!(reg.get(&c).unwrap().batch_id, Some(BatchId(4)));
    }

    #[test]
    fn test_complete_and_fail() {
        let reg = JobRegistry::in_memory();
        let a = queued(&reg, "a");
        let b = queued(&reg, "b");
        reg.begin_processing(&[a, b], BatchId(1));

        let done = reg.complete(&a, json!({"score": 1})).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        let failed = reg.fail(&b, &JobError::processing("bad")).unwrap();
        assert_eq!(failed.error.unwrap().message, "bad");

        // terminal jobs reject further transitions
        assert!(matches!(
            reg.complete(&b, json!(0)).unwrap_err(),
            Error::InvalidState { .. }
        ));
    }

    #[test]
    fn test_cancel_processing_job_rejected() {
        let reg = JobRegistry::in_memory();
        let a = queued(&reg, "a");
        reg.begin_processing(&[a], BatchId(0));
        let err = reg.cancel(&a).unwrap_err();
        assert!(err.to_string().contains("cannot cancel"));
    }

    #[test]
    fn test_purge_finished_keeps_live_jobs() {
        let reg = JobRegistry::in_memory();
        let live = queued(&reg, "live");
        let done = queued(&reg, "done");
        reg.cancel(&done).unwrap();

        assert_eq!(reg.purge_finished(Duration::from_secs(3600)), 0);
        assert_eq!(reg.purge_finished(Duration::ZERO), 1);
        assert!(reg.get(&live).is_ok());
        assert!(reg.get(&done).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_withdraws_jobs_in_any_state() {
        let reg = JobRegistry::in_memory();
        let keep = queued(&reg, "keep");
        let a = queued(&reg, "a");
        let b = reg.insert(Job::new(TaskType::Topics, Priority::High, "b"));

        assert_eq!(reg.remove(&[a, b]), 2);
        assert_eq!(reg.remove(&[a]), 0);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&keep).is_ok());
        assert!(reg.get(&a).unwrap_err().is_not_found());
    }
}
