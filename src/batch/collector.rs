//! Per-(task type, priority) accumulation buffer.

use crate::types::JobId;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// A job waiting in a buffer or sitting in a sealed batch.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub job_id: JobId,
    pub input: String,
    pub queued_at: Instant,
}

impl BatchJob {
    pub fn new(job_id: JobId, input: impl Into<String>) -> Self {
        Self {
            job_id,
            input: input.into(),
            queued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAddResult {
    Added { count: usize },
    ShouldSeal { count: usize },
}

impl BatchAddResult {
    pub fn should_seal(&self) -> bool {
        matches!(self, BatchAddResult::ShouldSeal { .. })
    }
    pub fn count(&self) -> usize {
        match self {
            BatchAddResult::Added { count } | BatchAddResult::ShouldSeal { count } => *count,
        }
    }
}

/// FIFO buffer with a single deadline, set when the first job lands in an
/// empty buffer and cleared when the buffer is drained.
#[derive(Debug)]
pub struct BatchCollector {
    max_batch_size: usize,
    max_wait: Duration,
    items: VecDeque<BatchJob>,
    deadline: Option<Instant>,
}

impl BatchCollector {
    pub fn new(max_batch_size: usize, max_wait: Duration) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            max_wait,
            items: VecDeque::new(),
            deadline: None,
        }
    }

    pub fn add(&mut self, item: BatchJob) -> BatchAddResult {
        if self.items.is_empty() {
            self.deadline = Some(item.queued_at + self.max_wait);
        }
        self.items.push_back(item);
        let count = self.items.len();
        if count >= self.max_batch_size {
            BatchAddResult::ShouldSeal { count }
        } else {
            BatchAddResult::Added { count }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_batch_size
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if now >= d) && !self.items.is_empty()
    }

    /// Snapshot-and-clear: the returned jobs are no longer in the buffer.
    pub fn drain(&mut self) -> Vec<BatchJob> {
        self.deadline = None;
        self.items.drain(..).collect()
    }

    /// Remove one job. The deadline follows the new oldest job.
    pub fn remove(&mut self, job_id: &JobId) -> bool {
        let Some(pos) = self.items.iter().position(|j| &j.job_id == job_id) else {
            return false;
        };
        self.items.remove(pos);
        self.deadline = self.items.front().map(|j| j.queued_at + self.max_wait);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
