//! 批次累积模块：按任务类型与优先级缓冲作业，并按大小、时间或紧急程度封装批次。
//!
//! # Batch Accumulation Module
//!
//! Admitted jobs collect in one buffer per `(task_type, priority)` pair until
//! a trigger fires, then the buffer is sealed into an immutable [`Batch`]
//! and handed to the worker pool through a priority-ordered ready queue.
//!
//! ## Triggers
//!
//! | Trigger | Fires when |
//! |---------|------------|
//! | Size | the buffer reaches `max_batch_size` |
//! | Deadline | the oldest buffered job has waited `max_wait` |
//! | Urgent | any job is buffered in an `urgent` buffer |
//! | Flush | shutdown seals whatever is left |
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PriorityBatchAccumulator`] | All buffers plus the ready queue behind one lock |
//! | [`BatchCollector`] | A single FIFO buffer with its deadline |
//! | [`BatchJob`] | A job reference (id, input, queue time) inside a buffer or batch |
//! | [`Batch`] | A sealed, ordered, single-task-type group of jobs |
//!
//! ## Example
//!
//! ```rust
//! use analysis_scheduler::batch::{AccumulatorConfig, BatchJob, PriorityBatchAccumulator};
//! use analysis_scheduler::{JobId, Priority, TaskType};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let acc = PriorityBatchAccumulator::new(AccumulatorConfig::default());
//! acc.enqueue(
//!     TaskType::Sentiment,
//!     Priority::Urgent,
//!     vec![BatchJob::new(JobId::new(), "ship it today")],
//! )
//! .unwrap();
//! let batch = acc.try_next_batch().unwrap();
//! assert_eq!(batch.len(), 1);
//! # }
//! ```

mod accumulator;
mod collector;

pub use accumulator::{AccumulatorConfig, Batch, PriorityBatchAccumulator, SealTrigger};
pub use collector::{BatchAddResult, BatchCollector, BatchJob};
