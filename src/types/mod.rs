//! 类型系统模块：定义作业、批次、任务类型与优先级等核心数据类型。
//!
//! # Types Module
//!
//! Core data types shared by every scheduler component.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Job`] | One caller-submitted unit of work and its lifecycle state |
//! | [`JobStatus`] | `pending → queued → processing → completed / failed`, or `cancelled` |
//! | [`JobStatusRecord`] | Status view returned by `get_status` |
//! | [`JobOutcome`] | Result view returned by `get_result` (with a pending marker) |
//! | [`TaskType`] | Analysis kind (`sentiment`, `entities`, `topics`, `difficulty`, `full`) |
//! | [`Priority`] | Priority class (`low`, `normal`, `high`, `urgent`) |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`job`] | Job records, identifiers and the state machine |
//! | [`task`] | Task type and priority enumerations |

pub mod job;
pub mod task;

pub use job::{
    BatchId, Job, JobError, JobErrorKind, JobId, JobOutcome, JobStatus, JobStatusRecord,
};
pub use task::{Priority, TaskType};
