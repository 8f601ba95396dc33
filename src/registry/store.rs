//! Pluggable job state storage.

use crate::types::{Job, JobId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Backing store for job records.
///
/// The in-memory store is the default; a shared key/value store can be
/// plugged in here for multi-process deployments without touching the
/// scheduling logic.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job);
    fn get(&self, id: &JobId) -> Option<Job>;
    /// Apply `f` to the stored job under the store's write lock.
    /// Returns `false` if the id is unknown.
    fn update(&self, id: &JobId, f: &mut dyn FnMut(&mut Job)) -> bool;
    /// Keep only jobs for which `keep` returns true; returns how many were removed.
    fn retain(&self, keep: &mut dyn FnMut(&Job) -> bool) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) {
        self.jobs.write().insert(job.id, job);
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    fn update(&self, id: &JobId, f: &mut dyn FnMut(&mut Job)) -> bool {
        match self.jobs.write().get_mut(id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    fn retain(&self, keep: &mut dyn FnMut(&Job) -> bool) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| keep(job));
        before - jobs.len()
    }

    fn len(&self) -> usize {
        self.jobs.read().len()
    }
}
