//! # analysis-scheduler
//!
//! 面向逐条文本分析例程的批量累积作业调度器：按任务类型和优先级聚合作业，批量调用分析器。
//!
//! Batch-accumulation job scheduler for per-item text analysis routines
//! (sentiment, entity extraction, topic tagging, difficulty scoring).
//!
//! ## Overview
//!
//! Callers submit many small analysis jobs. Instead of invoking an analyzer
//! once per input, the scheduler groups jobs of the same task type and
//! priority into batches, dispatches each batch to a bounded pool of workers,
//! and writes one result back per job. Repeated inputs are answered from a
//! bounded LRU result cache without touching the queue.
//!
//! ## Key Features
//!
//! - **Batching**: size, deadline and urgency triggers via [`batch::PriorityBatchAccumulator`]
//! - **Priorities**: urgent batches dispatch immediately; higher priorities are served first
//! - **Caching**: content-addressed result cache with pluggable backends via [`cache`]
//! - **Isolation**: analyzer errors, panics and timeouts fail only their own batch
//! - **Observability**: `tracing` logs, [`stats`] snapshots, and [`telemetry`] job event sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use analysis_scheduler::analyzer::FnAnalyzer;
//! use analysis_scheduler::{BatchScheduler, JobOutcome, Priority, TaskType};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> analysis_scheduler::Result<()> {
//!     let scheduler = BatchScheduler::builder()
//!         .analyzer(
//!             TaskType::Difficulty,
//!             FnAnalyzer::new("word-count", |inputs: &[String]| {
//!                 Ok(inputs
//!                     .iter()
//!                     .map(|s| json!(s.split_whitespace().count()))
//!                     .collect())
//!             }),
//!         )
//!         .build()?;
//!
//!     let receipt = scheduler
//!         .submit(vec!["one two three".into()], TaskType::Difficulty, Priority::Urgent)
//!         .await?;
//!     scheduler.shutdown().await;
//!
//!     let outcome = scheduler.get_result(&receipt.job_ids[0])?;
//!     assert_eq!(outcome, JobOutcome::Completed { result: json!(3) });
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`scheduler`] | Facade and builder |
//! | [`batch`] | Per-(task type, priority) buffers and the ready queue |
//! | [`worker`] | Worker pool and deadline ticker |
//! | [`analyzer`] | Analyzer trait, closure adapter and `full` composite |
//! | [`registry`] | Job lifecycle and pluggable job store |
//! | [`cache`] | Result cache with multiple backends |
//! | [`stats`] | Counters, queue depth and batch duration window |
//! | [`telemetry`] | Job event sinks |
//! | [`config`] | Processor configuration (defaults, YAML, environment) |
//! | [`types`] | Jobs, task types, priorities and outcomes |

pub mod analyzer;
pub mod batch;
pub mod cache;
pub mod config;
pub mod events;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod telemetry;
pub mod types;
pub mod worker;

// Re-export main types for convenience
pub use analyzer::{AnalyzerRegistry, BatchAnalyzer, FnAnalyzer};
pub use config::BatchProcessorConfig;
pub use scheduler::{BatchScheduler, BatchSchedulerBuilder, CacheCleared, SubmitReceipt};
pub use stats::StatisticsSnapshot;
pub use telemetry::{JobEvent, JobEventSink};
pub use types::{
    BatchId, Job, JobError, JobErrorKind, JobId, JobOutcome, JobStatus, JobStatusRecord,
    Priority, TaskType,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
