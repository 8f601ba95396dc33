//! 调度器模块：提交、查询、取消作业的统一入口，以及调度器构建器。
//!
//! # Scheduler Module
//!
//! [`BatchScheduler`] ties the pieces together: it answers repeated inputs
//! from the result cache, registers the rest in the job registry, hands them
//! to the priority accumulator, and exposes status, results and statistics.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchScheduler`] | Submission, status, result, cancel and statistics |
//! | [`BatchSchedulerBuilder`] | Wires config, analyzers, cache, store and sink |
//! | [`SubmitReceipt`] | Job ids plus an estimated wait |
//! | [`CacheCleared`] | Result of `clear_cache` |

mod builder;
mod core;

pub use builder::BatchSchedulerBuilder;
pub use core::{BatchScheduler, CacheCleared, SubmitReceipt};
