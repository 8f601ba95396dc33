//! 工作池模块：从就绪队列取出批次，调用分析器并写回每个作业的结果。
//!
//! # Worker Pool Module
//!
//! `worker_count` tokio tasks pull sealed batches from the
//! [`PriorityBatchAccumulator`] and run them through the registered
//! [`BatchAnalyzer`](crate::analyzer::BatchAnalyzer). A single deadline ticker
//! seals buffers whose wait budget has run out.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`WorkerContext`] | Shared handles a worker needs to process one batch |
//! | [`WorkerPool`] | The spawned worker tasks |
//! | [`spawn_deadline_ticker`] | Time-trigger task for the accumulator |
//!
//! A batch either completes as a whole (one result per job, in input order)
//! or fails as a whole: analyzer error, wrong result count, panic, timeout
//! and missing analyzer all mark every job in the batch `failed` with the same
//! [`JobError`].

use crate::analyzer::{panic_message, AnalyzerRegistry};
use crate::batch::{Batch, PriorityBatchAccumulator};
use crate::cache::ResultCache;
use crate::events::{JobEvent, JobEventSink};
use crate::registry::JobRegistry;
use crate::stats::StatisticsCollector;
use crate::types::{JobError, JobId, JobStatusRecord, TaskType};
use crate::{Error, ErrorContext, Result};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a worker touches while processing a batch.
pub struct WorkerContext {
    pub accumulator: Arc<PriorityBatchAccumulator>,
    pub registry: JobRegistry,
    pub analyzers: AnalyzerRegistry,
    pub cache: Arc<ResultCache>,
    pub stats: Arc<StatisticsCollector>,
    pub sink: Arc<dyn JobEventSink>,
    pub batch_timeout: Duration,
}

impl WorkerContext {
    /// Dispatch one sealed batch and record the outcome on every job in it.
    pub async fn process_batch(&self, batch: Batch) {
        let Batch {
            id: batch_id,
            task_type,
            jobs,
            ..
        } = batch;
        self.stats.record_dequeued(task_type, jobs.len());

        let ids: Vec<JobId> = jobs.iter().map(|j| j.job_id).collect();
        let admitted = self.registry.begin_processing(&ids, batch_id);
        let (ids, inputs): (Vec<JobId>, Vec<String>) = jobs
            .into_iter()
            .zip(admitted)
            .filter(|(_, ok)| *ok)
            .map(|(job, _)| (job.job_id, job.input))
            .unzip();
        if ids.is_empty() {
            debug!(batch = %batch_id, "every job in batch was cancelled; skipping");
            return;
        }

        debug!(batch = %batch_id, task_type = %task_type, size = ids.len(), "dispatching batch");
        let started = Instant::now();
        let outcome = self.run_analyzer(task_type, &inputs).await;
        let elapsed = started.elapsed();

        let mut events = Vec::with_capacity(ids.len());
        match outcome {
            Ok(results) => {
                for ((id, input), value) in ids.iter().zip(&inputs).zip(results) {
                    self.cache.store(task_type, input, &value).await;
                    match self.registry.complete(id, value) {
                        Ok(job) => events.extend(JobEvent::from_record(JobStatusRecord::from(&job))),
                        Err(e) => warn!(job_id = %id, error = %e, "could not record result"),
                    }
                }
                self.stats.record_completed(events.len());
                self.stats.record_batch(elapsed, false, false);
                debug!(
                    batch = %batch_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "batch completed"
                );
            }
            Err(err) => {
                let timed_out = matches!(err, Error::Timeout { .. });
                let job_error = JobError::from(&err);
                for id in &ids {
                    match self.registry.fail(id, &job_error) {
                        Ok(job) => events.extend(JobEvent::from_record(JobStatusRecord::from(&job))),
                        Err(e) => warn!(job_id = %id, error = %e, "could not record failure"),
                    }
                }
                self.stats.record_failed(events.len());
                self.stats.record_batch(elapsed, true, timed_out);
                warn!(
                    batch = %batch_id,
                    task_type = %task_type,
                    size = ids.len(),
                    error = %err,
                    "batch failed"
                );
            }
        }

        if let Err(e) = self.sink.publish_batch(events).await {
            warn!(batch = %batch_id, error = %e, "job event sink rejected events");
        }
    }

    async fn run_analyzer(&self, task_type: TaskType, inputs: &[String]) -> Result<Vec<Value>> {
        let analyzer = self.analyzers.get(task_type).ok_or_else(|| {
            Error::processing_with_context(
                format!("No analyzer registered for task type '{task_type}'"),
                ErrorContext::new().with_field_path("task_type"),
            )
        })?;
        let call = AssertUnwindSafe(analyzer.analyze_batch(inputs)).catch_unwind();
        let results = match tokio::time::timeout(self.batch_timeout, call).await {
            Err(_) => {
                return Err(Error::Timeout {
                    limit: self.batch_timeout,
                })
            }
            Ok(Err(panic)) => {
                return Err(Error::processing_with_context(
                    format!("Analyzer panicked: {}", panic_message(panic.as_ref())),
                    ErrorContext::new().with_source(analyzer.name()),
                ))
            }
            Ok(Ok(results)) => results?,
        };
        if results.len() != inputs.len() {
            return Err(Error::processing_with_context(
                format!(
                    "Analyzer returned {} results for {} inputs",
                    results.len(),
                    inputs.len()
                ),
                ErrorContext::new().with_source(analyzer.name()),
            ));
        }
        Ok(results)
    }
}

/// Handles to the spawned worker tasks.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers on the current tokio runtime.
    pub fn spawn(ctx: Arc<WorkerContext>, count: usize) -> Self {
        let handles = (0..count.max(1))
            .map(|worker| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    debug!(worker, "worker started");
                    while let Some(batch) = ctx.accumulator.next_batch().await {
                        ctx.process_batch(batch).await;
                    }
                    debug!(worker, "worker stopped");
                })
            })
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Workers exit once the accumulator is
    /// closed and its ready queue is empty.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }

    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Seal buffers whose deadline has passed. Sleeps until the earliest buffer
/// deadline, but never longer than `tick`, so jobs arriving mid-sleep are
/// sealed at most `tick` late.
pub fn spawn_deadline_ticker(
    accumulator: Arc<PriorityBatchAccumulator>,
    tick: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Instant::now();
            let wake = match accumulator.next_deadline() {
                Some(deadline) => deadline.min(now + tick),
                None => now + tick,
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep_until(wake) => {}
            }
            let sealed = accumulator.seal_due(Instant::now());
            if sealed > 0 {
                debug!(sealed, "deadline ticker sealed batches");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{BatchAnalyzer, FnAnalyzer};
    use crate::batch::{AccumulatorConfig, BatchJob};
    use crate::cache::{CacheConfig, MemoryCache};
    use crate::telemetry::InMemoryJobSink;
    use crate::types::{Job, JobErrorKind, JobStatus, Priority};
    use async_trait::async_trait;
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl BatchAnalyzer for Slow {
        async fn analyze_batch(&self, inputs: &[String]) -> Result<Vec<Value>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(inputs.iter().map(|_| json!(null)).collect())
        }
    }

    /// Panics inside the analyzer future itself, not in a blocking closure.
    struct Explodes;

    #[async_trait]
    impl BatchAnalyzer for Explodes {
        async fn analyze_batch(&self, _inputs: &[String]) -> Result<Vec<Value>> {
            tokio::task::yield_now().await;
            panic!("gpu fell over")
        }

        fn name(&self) -> &str {
            "explodes"
        }
    }

    fn context(analyzers: AnalyzerRegistry, sink: Arc<InMemoryJobSink>) -> WorkerContext {
        WorkerContext {
            accumulator: Arc::new(PriorityBatchAccumulator::new(AccumulatorConfig::default())),
            registry: JobRegistry::in_memory(),
            analyzers,
            cache: Arc::new(ResultCache::new(
                CacheConfig::new(),
                Box::new(MemoryCache::new(16)),
            )),
            stats: Arc::new(StatisticsCollector::default()),
            sink,
            batch_timeout: Duration::from_secs(1),
        }
    }

    /// Register and enqueue jobs, then pop the sealed urgent batch.
    fn sealed_batch(ctx: &WorkerContext, task_type: TaskType, inputs: &[&str]) -> (Batch, Vec<JobId>) {
        let mut jobs = Vec::new();
        let mut ids = Vec::new();
        for input in inputs {
            let id = ctx.registry.insert(Job::new(task_type, Priority::Urgent, *input));
            ctx.registry.mark_queued(&id).unwrap();
            jobs.push(BatchJob::new(id, *input));
            ids.push(id);
        }
        ctx.stats.record_enqueued(task_type, ids.len());
        ctx.accumulator
            .enqueue(task_type, Priority::Urgent, jobs)
            .unwrap();
        (ctx.accumulator.try_next_batch().unwrap(), ids)
    }

    #[tokio::test]
    async fn test_success_writes_results_in_order_and_caches() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let analyzers = AnalyzerRegistry::new().with(
            TaskType::Difficulty,
            FnAnalyzer::new("len", |inputs: &[String]| {
                Ok(inputs.iter().map(|s| json!(s.len())).collect())
            }),
        );
        let ctx = context(analyzers, sink.clone());
        let (batch, ids) = sealed_batch(&ctx, TaskType::Difficulty, &["a", "bbb"]);
        ctx.process_batch(batch).await;

        let first = ctx.registry.get(&ids[0]).unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(first.result, Some(json!(1)));
        assert_eq!(ctx.registry.get(&ids[1]).unwrap().result, Some(json!(3)));
        assert_eq!(
            ctx.cache.lookup(TaskType::Difficulty, "bbb").await,
            Some(json!(3))
        );
        assert_eq!(ctx.stats.queue_depth(TaskType::Difficulty), 0);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_result_count_fails_whole_batch() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let analyzers = AnalyzerRegistry::new().with(
            TaskType::Topics,
            FnAnalyzer::new("short", |_: &[String]| Ok(vec![json!([])])),
        );
        let ctx = context(analyzers, sink.clone());
        let (batch, ids) = sealed_batch(&ctx, TaskType::Topics, &["a", "b", "c"]);
        ctx.process_batch(batch).await;

        for id in &ids {
            let job = ctx.registry.get(id).unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert!(job.result.is_none());
            assert_eq!(job.error.unwrap().kind, JobErrorKind::Processing);
        }
        assert!(ctx.cache.lookup(TaskType::Topics, "a").await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_analyzer_fails_its_batch() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let analyzers = AnalyzerRegistry::new().with(
            TaskType::Entities,
            FnAnalyzer::new("boom", |_: &[String]| -> Result<Vec<Value>> {
                panic!("model exploded")
            }),
        );
        let ctx = context(analyzers, sink);
        let (batch, ids) = sealed_batch(&ctx, TaskType::Entities, &["x"]);
        ctx.process_batch(batch).await;

        let job = ctx.registry.get(&ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().message.contains("model exploded"));
    }

    #[tokio::test]
    async fn test_async_panic_is_caught_by_worker() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let mut analyzers = AnalyzerRegistry::new();
        analyzers.register(TaskType::Topics, Arc::new(Explodes));
        let ctx = context(analyzers, sink.clone());
        let (batch, ids) = sealed_batch(&ctx, TaskType::Topics, &["x", "y"]);
        ctx.process_batch(batch).await;

        for id in &ids {
            let error = ctx.registry.get(id).unwrap().error.unwrap();
            assert_eq!(error.kind, JobErrorKind::Processing);
            assert!(error.message.contains("gpu fell over"));
        }
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_timeout_kind() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let mut analyzers = AnalyzerRegistry::new();
        analyzers.register(TaskType::Sentiment, Arc::new(Slow));
        let ctx = context(analyzers, sink);
        let (batch, ids) = sealed_batch(&ctx, TaskType::Sentiment, &["x", "y"]);
        ctx.process_batch(batch).await;

        for id in &ids {
            let job = ctx.registry.get(id).unwrap();
            assert_eq!(job.error.unwrap().kind, JobErrorKind::Timeout);
        }
        let snap = ctx.stats.snapshot(&ctx.cache.stats());
        assert_eq!(snap.batch_timeouts, 1);
        assert_eq!(snap.jobs_failed, 2);
    }

    #[tokio::test]
    async fn test_missing_analyzer_fails_batch() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let ctx = context(AnalyzerRegistry::new(), sink);
        let (batch, ids) = sealed_batch(&ctx, TaskType::Full, &["x"]);
        ctx.process_batch(batch).await;
        let job = ctx.registry.get(&ids[0]).unwrap();
        assert!(job.error.unwrap().message.contains("No analyzer"));
    }

    #[tokio::test]
    async fn test_cancelled_jobs_are_not_dispatched() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let record = seen.clone();
        let analyzers = AnalyzerRegistry::new().with(
            TaskType::Sentiment,
            FnAnalyzer::new("record", move |inputs: &[String]| {
                record.lock().extend(inputs.iter().cloned());
                Ok(inputs.iter().map(|_| json!(0.0)).collect())
            }),
        );
        let ctx = context(analyzers, sink);
        let (batch, ids) = sealed_batch(&ctx, TaskType::Sentiment, &["keep", "drop"]);
        // cancelled after sealing, before a worker picked the batch up
        ctx.registry.cancel(&ids[1]).unwrap();
        ctx.process_batch(batch).await;

        assert_eq!(*seen.lock(), vec!["keep".to_string()]);
        assert_eq!(ctx.registry.get(&ids[1]).unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_seals_on_deadline() {
        let acc = Arc::new(PriorityBatchAccumulator::new(AccumulatorConfig {
            max_batch_size: 8,
            max_wait: Duration::from_millis(200),
        }));
        let token = CancellationToken::new();
        let ticker = spawn_deadline_ticker(acc.clone(), Duration::from_millis(50), token.clone());
        acc.enqueue(
            TaskType::Sentiment,
            Priority::Normal,
            vec![BatchJob::new(JobId::new(), "x")],
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(acc.ready_len(), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(acc.ready_len(), 1);

        token.cancel();
        ticker.await.unwrap();
    }

    #[tokio::test]
    async fn test_pool_exits_after_close() {
        let sink = Arc::new(InMemoryJobSink::new(16));
        let ctx = Arc::new(context(AnalyzerRegistry::new(), sink));
        let pool = WorkerPool::spawn(ctx.clone(), 3);
        assert_eq!(pool.len(), 3);
        ctx.accumulator.close();
        pool.join().await;
    }
}
