//! Priority batch accumulator.

use super::collector::{BatchCollector, BatchJob};
use crate::types::{BatchId, JobId, Priority, TaskType};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Why a buffer was sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealTrigger {
    Size,
    Deadline,
    Urgent,
    Flush,
}

/// A sealed, homogeneous group of jobs. `jobs[i]` maps to result `i`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub task_type: TaskType,
    pub priority: Priority,
    pub jobs: Vec<BatchJob>,
    pub formed_at: Instant,
    pub trigger: SealTrigger,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|j| j.job_id).collect()
    }
}

#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    pub max_batch_size: usize,
    pub max_wait: Duration,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            max_wait: Duration::from_secs(2),
        }
    }
}

/// Ready queue ordering: highest priority first, then formation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyKey {
    priority: Reverse<Priority>,
    id: BatchId,
}

#[derive(Default)]
struct State {
    buffers: HashMap<(TaskType, Priority), BatchCollector>,
    ready: BTreeMap<ReadyKey, Batch>,
    next_id: u64,
    closed: bool,
}

impl State {
    fn seal(
        &mut self,
        key: (TaskType, Priority),
        trigger: SealTrigger,
        now: Instant,
    ) -> Option<BatchId> {
        let jobs = self.buffers.get_mut(&key)?.drain();
        if jobs.is_empty() {
            return None;
        }
        let id = BatchId(self.next_id);
        self.next_id += 1;
        let (task_type, priority) = key;
        debug!(
            batch = %id,
            task_type = %task_type,
            priority = %priority,
            size = jobs.len(),
            trigger = ?trigger,
            "sealed batch"
        );
        self.ready.insert(
            ReadyKey {
                priority: Reverse(priority),
                id,
            },
            Batch {
                id,
                task_type,
                priority,
                jobs,
                formed_at: now,
                trigger,
            },
        );
        Some(id)
    }

    fn seal_all(&mut self, now: Instant) -> usize {
        let mut sealed = 0;
        for priority in Priority::DESCENDING {
            for task_type in TaskType::ALL {
                if self
                    .seal((task_type, priority), SealTrigger::Flush, now)
                    .is_some()
                {
                    sealed += 1;
                }
            }
        }
        sealed
    }
}

/// One accumulation buffer per `(task_type, priority)`, sealed into batches by
/// size, deadline, or urgency, and a priority-ordered queue of ready batches.
///
/// Every mutation happens under a single lock, so sealing is an atomic
/// snapshot-and-clear: a job is never part of two batches and never dropped.
pub struct PriorityBatchAccumulator {
    config: AccumulatorConfig,
    state: Mutex<State>,
    ready_signal: Notify,
}

impl PriorityBatchAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
            ready_signal: Notify::new(),
        }
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// Append jobs (in order) to the `(task_type, priority)` buffer.
    ///
    /// Full buffers seal immediately; urgent buffers seal at the end of the
    /// call even when partially filled. Returns the number of batches sealed.
    pub fn enqueue(
        &self,
        task_type: TaskType,
        priority: Priority,
        jobs: Vec<BatchJob>,
    ) -> Result<usize> {
        let sealed = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(Error::ShuttingDown);
            }
            let key = (task_type, priority);
            let now = Instant::now();
            let mut sealed = 0;
            for job in jobs {
                let added = st
                    .buffers
                    .entry(key)
                    .or_insert_with(|| {
                        BatchCollector::new(self.config.max_batch_size, self.config.max_wait)
                    })
                    .add(job);
                if added.should_seal() && st.seal(key, SealTrigger::Size, now).is_some() {
                    sealed += 1;
                }
            }
            if priority.is_urgent() && st.seal(key, SealTrigger::Urgent, now).is_some() {
                sealed += 1;
            }
            sealed
        };
        for _ in 0..sealed {
            self.ready_signal.notify_one();
        }
        Ok(sealed)
    }

    /// Seal every buffer whose trigger has fired, visiting priorities from
    /// urgent down to low. Returns the number of batches sealed.
    pub fn seal_due(&self, now: Instant) -> usize {
        let sealed = {
            let mut st = self.state.lock();
            let mut sealed = 0;
            for priority in Priority::DESCENDING {
                for task_type in TaskType::ALL {
                    let key = (task_type, priority);
                    let trigger = match st.buffers.get(&key) {
                        Some(b) if b.is_empty() => continue,
                        Some(_) if priority.is_urgent() => SealTrigger::Urgent,
                        Some(b) if b.is_full() => SealTrigger::Size,
                        Some(b) if b.is_due(now) => SealTrigger::Deadline,
                        _ => continue,
                    };
                    if st.seal(key, trigger, now).is_some() {
                        sealed += 1;
                    }
                }
            }
            sealed
        };
        for _ in 0..sealed {
            self.ready_signal.notify_one();
        }
        sealed
    }

    /// Seal every non-empty buffer regardless of triggers.
    pub fn flush_all(&self) -> usize {
        let sealed = self.state.lock().seal_all(Instant::now());
        for _ in 0..sealed {
            self.ready_signal.notify_one();
        }
        sealed
    }

    /// Earliest pending buffer deadline, if any job is buffered.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .buffers
            .values()
            .filter_map(|b| b.deadline())
            .min()
    }

    /// Remove a job that has not been dispatched yet, whether it is still
    /// buffered or already sealed into a waiting batch.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let mut st = self.state.lock();
        if st.buffers.values_mut().any(|b| b.remove(job_id)) {
            return true;
        }
        let mut emptied = None;
        let mut found = false;
        for (key, batch) in st.ready.iter_mut() {
            if let Some(pos) = batch.jobs.iter().position(|j| &j.job_id == job_id) {
                batch.jobs.remove(pos);
                if batch.jobs.is_empty() {
                    emptied = Some(*key);
                }
                found = true;
                break;
            }
        }
        if let Some(key) = emptied {
            st.ready.remove(&key);
        }
        found
    }

    /// Pop the highest-priority, earliest-formed ready batch without waiting.
    pub fn try_next_batch(&self) -> Option<Batch> {
        self.state.lock().ready.pop_first().map(|(_, b)| b)
    }

    /// Wait for the next ready batch. Returns `None` once the accumulator is
    /// closed and the ready queue has been drained.
    pub async fn next_batch(&self) -> Option<Batch> {
        loop {
            let notified = self.ready_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.state.lock();
                if let Some((_, batch)) = st.ready.pop_first() {
                    return Some(batch);
                }
                if st.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Seal whatever is buffered, reject further submissions and wake idle
    /// workers so they drain the ready queue and exit. Returns the number of
    /// batches sealed by the final flush.
    pub fn close(&self) -> usize {
        let sealed = {
            let mut st = self.state.lock();
            let sealed = st.seal_all(Instant::now());
            st.closed = true;
            sealed
        };
        self.ready_signal.notify_waiters();
        sealed
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Jobs buffered (not yet sealed).
    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffers.values().map(|b| b.len()).sum()
    }

    /// Sealed batches waiting for a worker.
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Jobs of one task type that are buffered or sealed but not dispatched.
    pub fn depth(&self, task_type: TaskType) -> usize {
        let st = self.state.lock();
        let buffered: usize = st
            .buffers
            .iter()
            .filter(|((t, _), _)| *t == task_type)
            .map(|(_, b)| b.len())
            .sum();
        let ready: usize = st
            .ready
            .values()
            .filter(|b| b.task_type == task_type)
            .map(|b| b.len())
            .sum();
        buffered + ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(max_batch_size: usize, max_wait_ms: u64) -> PriorityBatchAccumulator {
        PriorityBatchAccumulator::new(AccumulatorConfig {
            max_batch_size,
            max_wait: Duration::from_millis(max_wait_ms),
        })
    }

    fn jobs(n: usize) -> Vec<BatchJob> {
        (0..n)
            .map(|i| BatchJob::new(JobId::new(), format!("text-{}", i)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_trigger_splits_into_full_batches() {
        let a = acc(32, 2000);
        let sealed = a
            .enqueue(TaskType::Sentiment, Priority::Normal, jobs(100))
            .unwrap();
        assert_eq!(sealed, 3);
        assert_eq!(a.buffered_len(), 4);
        assert_eq!(a.depth(TaskType::Sentiment), 100);

        let mut sizes = Vec::new();
        while let Some(b) = a.try_next_batch() {
            sizes.push(b.len());
        }
        assert_eq!(sizes, vec![32, 32, 32]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_fifo_order() {
        let a = acc(3, 2000);
        let input = jobs(6);
        let expected: Vec<_> = input.iter().map(|j| j.job_id).collect();
        a.enqueue(TaskType::Topics, Priority::Low, input).unwrap();
        let first = a.try_next_batch().unwrap();
        let second = a.try_next_batch().unwrap();
        assert!(first.id < second.id);
        let got: Vec<_> = first.job_ids().into_iter().chain(second.job_ids()).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_trigger() {
        let a = acc(32, 2000);
        a.enqueue(TaskType::Entities, Priority::Normal, jobs(4)).unwrap();
        assert_eq!(a.seal_due(Instant::now()), 0);
        let deadline = a.next_deadline().unwrap();
        tokio::time::advance(Duration::from_millis(1999)).await;
        assert_eq!(a.seal_due(Instant::now()), 0);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(Instant::now(), deadline);
        assert_eq!(a.seal_due(Instant::now()), 1);
        let batch = a.try_next_batch().unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.trigger, SealTrigger::Deadline);
        assert!(a.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_urgent_seals_without_waiting() {
        let a = acc(32, 2000);
        let sealed = a.enqueue(TaskType::Sentiment, Priority::Urgent, jobs(1)).unwrap();
        assert_eq!(sealed, 1);
        let batch = a.try_next_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.trigger, SealTrigger::Urgent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_urgent_dispatched_before_normal() {
        let a = acc(32, 0);
        a.enqueue(TaskType::Sentiment, Priority::Normal, jobs(2)).unwrap();
        a.enqueue(TaskType::Sentiment, Priority::Urgent, jobs(2)).unwrap();
        // normal buffer is due immediately (zero wait) and seals after urgent
        assert_eq!(a.seal_due(Instant::now()), 1);
        assert_eq!(a.try_next_batch().unwrap().priority, Priority::Urgent);
        assert_eq!(a.try_next_batch().unwrap().priority, Priority::Normal);
        assert!(a.try_next_batch().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_ties_broken_by_formation_order() {
        let a = acc(2, 2000);
        a.enqueue(TaskType::Topics, Priority::High, jobs(2)).unwrap();
        a.enqueue(TaskType::Sentiment, Priority::High, jobs(2)).unwrap();
        a.enqueue(TaskType::Entities, Priority::Low, jobs(2)).unwrap();
        assert_eq!(a.try_next_batch().unwrap().task_type, TaskType::Topics);
        assert_eq!(a.try_next_batch().unwrap().task_type, TaskType::Sentiment);
        assert_eq!(a.try_next_batch().unwrap().task_type, TaskType::Entities);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_buffer_and_ready_queue() {
        let a = acc(3, 2000);
        let input = jobs(5);
        let ids: Vec<_> = input.iter().map(|j| j.job_id).collect();
        a.enqueue(TaskType::Sentiment, Priority::Normal, input).unwrap();

        // ids[0..3] sealed by size, ids[3..5] still buffered
        assert!(a.cancel(&ids[1]));
        assert!(a.cancel(&ids[4]));
        assert!(!a.cancel(&ids[4]));

        let sealed = a.try_next_batch().unwrap();
        assert_eq!(sealed.job_ids(), vec![ids[0], ids[2]]);
        assert_eq!(a.flush_all(), 1);
        assert_eq!(a.try_next_batch().unwrap().job_ids(), vec![ids[3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_last_job_drops_ready_batch() {
        let a = acc(32, 2000);
        let input = jobs(1);
        let id = input[0].job_id;
        a.enqueue(TaskType::Full, Priority::Urgent, input).unwrap();
        assert_eq!(a.ready_len(), 1);
        assert!(a.cancel(&id));
        assert_eq!(a.ready_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_rejects_enqueue_and_releases_waiters() {
        let a = std::sync::Arc::new(acc(32, 2000));
        let waiter = {
            let a = a.clone();
            tokio::spawn(async move { a.next_batch().await })
        };
        tokio::task::yield_now().await;
        a.close();
        assert!(waiter.await.unwrap().is_none());
        assert!(matches!(
            a.enqueue(TaskType::Sentiment, Priority::Low, jobs(1)),
            Err(Error::ShuttingDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_batch_wakes_on_seal() {
        let a = std::sync::Arc::new(acc(2, 2000));
        let waiter = {
            let a = a.clone();
            tokio::spawn(async move { a.next_batch().await })
        };
        tokio::task::yield_now().await;
        a.enqueue(TaskType::Difficulty, Priority::Normal, jobs(2)).unwrap();
        let batch = waiter.await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drains_ready_before_none() {
        let a = acc(1, 2000);
        a.enqueue(TaskType::Sentiment, Priority::Low, jobs(2)).unwrap();
        a.close();
        assert!(a.next_batch().await.is_some());
        assert!(a.next_batch().await.is_some());
        assert!(a.next_batch().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_partial_buffers() {
        let a = acc(32, 2000);
        a.enqueue(TaskType::Topics, Priority::Normal, jobs(3)).unwrap();
        assert_eq!(a.close(), 1);
        let batch = a.next_batch().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.trigger, SealTrigger::Flush);
        assert!(a.next_batch().await.is_none());
    }
}
