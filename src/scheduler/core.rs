use crate::batch::BatchJob;
use crate::config::BatchProcessorConfig;
use crate::events::JobEvent;
use crate::stats::StatisticsSnapshot;
use crate::types::{Job, JobId, JobOutcome, JobStatus, JobStatusRecord, Priority, TaskType};
use crate::worker::{WorkerContext, WorkerPool};
use crate::{Error, ErrorContext, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Returned by [`BatchScheduler::submit`]: one id per input, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub job_ids: Vec<JobId>,
    /// Rough wait until the submitted jobs are processed. Zero when every
    /// input was answered from the cache.
    pub estimated_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCleared {
    pub entries_removed: usize,
}

/// Front door of the scheduler.
///
/// Admission is synchronous and never waits for queue space; processing
/// happens on the worker tasks spawned by [`BatchSchedulerBuilder::build`](super::BatchSchedulerBuilder::build).
/// Dropping the scheduler closes the accumulator and stops the ticker;
/// call [`shutdown`](Self::shutdown) to also wait for in-flight batches.
pub struct BatchScheduler {
    config: BatchProcessorConfig,
    ctx: Arc<WorkerContext>,
    workers: Mutex<Option<WorkerPool>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
}

impl BatchScheduler {
    pub(crate) fn from_parts(
        config: BatchProcessorConfig,
        ctx: Arc<WorkerContext>,
        workers: WorkerPool,
        ticker: JoinHandle<()>,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            ctx,
            workers: Mutex::new(Some(workers)),
            ticker: Mutex::new(Some(ticker)),
            token,
        }
    }

    pub fn builder() -> super::BatchSchedulerBuilder {
        super::BatchSchedulerBuilder::new()
    }

    pub fn config(&self) -> &BatchProcessorConfig {
        &self.config
    }

    /// Admit a group of inputs for one task type and priority.
    ///
    /// Inputs with a cached result become `completed` jobs immediately;
    /// the rest are queued for batching. Nothing is admitted when the input
    /// count is out of range.
    pub async fn submit(
        &self,
        inputs: Vec<String>,
        task_type: TaskType,
        priority: Priority,
    ) -> Result<SubmitReceipt> {
        self.validate_submission(&inputs)?;
        if self.ctx.accumulator.is_closed() {
            return Err(Error::ShuttingDown);
        }

        let total = inputs.len();
        let mut jobs = Vec::with_capacity(total);
        let mut events = Vec::new();
        for input in inputs {
            let job = match self.ctx.cache.lookup(task_type, &input).await {
                Some(result) => {
                    let job = Job::from_cache(task_type, priority, input, result);
                    events.extend(JobEvent::from_record(JobStatusRecord::from(&job)));
                    job
                }
                None => {
                    let mut job = Job::new(task_type, priority, input);
                    job.mark_queued()?;
                    job
                }
            };
            jobs.push(job);
        }

        let mut job_ids = Vec::with_capacity(total);
        let mut queued = Vec::new();
        for job in jobs {
            if job.status == JobStatus::Queued {
                queued.push(BatchJob::new(job.id, job.input.clone()));
            }
            job_ids.push(self.ctx.registry.insert(job));
        }

        let cached = events.len();
        let pending = queued.len();
        if pending > 0 {
            self.ctx.stats.record_enqueued(task_type, pending);
            if let Err(e) = self.ctx.accumulator.enqueue(task_type, priority, queued) {
                // Lost the race with shutdown: nothing from this call was admitted.
                self.ctx.stats.record_dequeued(task_type, pending);
                self.ctx.registry.remove(&job_ids);
                return Err(e);
            }
        }
        let estimated_time = self.estimate(task_type, pending);

        self.ctx.stats.record_submitted(total);
        self.ctx.stats.record_completed(cached);
        if !events.is_empty() {
            if let Err(e) = self.ctx.sink.publish_batch(events).await {
                warn!(error = %e, "job event sink rejected cache-hit events");
            }
        }

        debug!(
            task_type = %task_type,
            priority = %priority,
            submitted = total,
            cache_hits = cached,
            queued = pending,
            "jobs admitted"
        );
        Ok(SubmitReceipt {
            job_ids,
            estimated_time,
        })
    }

    fn validate_submission(&self, inputs: &[String]) -> Result<()> {
        let max = self.config.max_inputs_per_submission;
        if inputs.is_empty() || inputs.len() > max {
            return Err(Error::validation_with_context(
                format!("expected between 1 and {} inputs, got {}", max, inputs.len()),
                ErrorContext::new().with_field_path("inputs"),
            ));
        }
        Ok(())
    }

    /// `ceil(backlog / max_batch_size)` batches at the recent average batch
    /// duration, or `max_wait` per batch before any batch has run. The
    /// backlog is every job of `task_type` not yet taken by a worker,
    /// including the `pending` jobs just queued.
    fn estimate(&self, task_type: TaskType, pending: usize) -> Duration {
        if pending == 0 {
            return Duration::ZERO;
        }
        let depth = usize::try_from(self.ctx.stats.queue_depth(task_type)).unwrap_or(usize::MAX);
        let backlog = depth.max(pending);
        let per_batch = self
            .ctx
            .stats
            .average_batch_duration()
            .unwrap_or_else(|| self.config.max_wait());
        let batches = backlog.div_ceil(self.config.max_batch_size).max(1);
        per_batch.saturating_mul(u32::try_from(batches).unwrap_or(u32::MAX))
    }

    pub fn get_status(&self, job_id: &JobId) -> Result<JobStatusRecord> {
        self.ctx.registry.status(job_id)
    }

    /// Never blocks: unfinished jobs return [`JobOutcome::Pending`].
    pub fn get_result(&self, job_id: &JobId) -> Result<JobOutcome> {
        self.ctx.registry.outcome(job_id)
    }

    /// Cancel a job that has not been dispatched yet.
    pub async fn cancel(&self, job_id: &JobId) -> Result<JobStatusRecord> {
        let job = self.ctx.registry.cancel(job_id)?;
        if self.ctx.accumulator.cancel(job_id) {
            self.ctx.stats.record_dequeued(job.task_type, 1);
        }
        self.ctx.stats.record_cancelled();
        let record = JobStatusRecord::from(&job);
        if let Some(event) = JobEvent::from_record(record.clone()) {
            if let Err(e) = self.ctx.sink.publish(event).await {
                warn!(job_id = %job_id, error = %e, "job event sink rejected cancel event");
            }
        }
        debug!(job_id = %job_id, "job cancelled");
        Ok(record)
    }

    pub fn get_statistics(&self) -> StatisticsSnapshot {
        self.ctx.stats.snapshot(&self.ctx.cache.stats())
    }

    /// Drop every cached result. Jobs already queued or running are unaffected.
    pub async fn clear_cache(&self) -> CacheCleared {
        let entries_removed = self.ctx.cache.clear().await;
        info!(entries_removed, "result cache cleared");
        CacheCleared { entries_removed }
    }

    /// Forget terminal jobs that finished more than `older_than` ago.
    pub fn purge_finished(&self, older_than: Duration) -> usize {
        let removed = self.ctx.registry.purge_finished(older_than);
        if removed > 0 {
            debug!(removed, "purged finished jobs");
        }
        removed
    }

    /// Stop accepting work, seal every buffer, and wait until the workers
    /// have processed everything already admitted.
    pub async fn shutdown(&self) {
        let workers = self.workers.lock().take();
        let Some(workers) = workers else {
            return;
        };
        let flushed = self.ctx.accumulator.close();
        info!(flushed, "batch scheduler shutting down");
        workers.join().await;

        self.token.cancel();
        let ticker = self.ticker.lock().take();
        if let Some(ticker) = ticker {
            if let Err(e) = ticker.await {
                warn!(error = %e, "deadline ticker ended abnormally");
            }
        }
        if let Err(e) = self.ctx.sink.close().await {
            warn!(error = %e, "job event sink failed to close");
        }
        info!("batch scheduler stopped");
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        self.ctx.accumulator.close();
        self.token.cancel();
    }
}
