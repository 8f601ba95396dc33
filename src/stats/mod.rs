//! 统计模块：汇总吞吐量、队列深度与缓存命中等运行指标。
//!
//! # Statistics Module
//!
//! Append-only atomic counters written by the submission path and the worker
//! pool, plus a bounded window of recent batch durations that feeds the
//! `estimated_time` heuristic. [`StatisticsCollector::snapshot`] produces a
//! read-only, serializable view.

use crate::cache::CacheStats;
use crate::types::TaskType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub batches_dispatched: u64,
    pub batches_failed: u64,
    pub batch_timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub queue_depth: BTreeMap<TaskType, u64>,
    pub total_queue_depth: u64,
    pub average_batch_duration_ms: Option<f64>,
    /// Completed jobs per second since the collector started.
    pub throughput_per_sec: f64,
    pub uptime_secs: f64,
}

pub struct StatisticsCollector {
    started_at: Instant,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_failed: AtomicU64,
    timeouts: AtomicU64,
    queue_depth: [AtomicU64; 5],
    durations: Mutex<VecDeque<Duration>>,
    window: usize,
}

impl StatisticsCollector {
    pub fn new(window: usize) -> Self {
        Self {
            started_at: Instant::now(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            queue_depth: Default::default(),
            durations: Mutex::new(VecDeque::with_capacity(window.max(1))),
            window: window.max(1),
        }
    }

    pub fn record_submitted(&self, n: usize) {
        self.submitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_completed(&self, n: usize) {
        self.completed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, n: usize) {
        self.failed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self, task_type: TaskType, n: usize) {
        self.queue_depth[task_type.index()].fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Jobs left the queue (dispatched to a worker or cancelled).
    pub fn record_dequeued(&self, task_type: TaskType, n: usize) {
        let _ = self.queue_depth[task_type.index()].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |d| Some(d.saturating_sub(n as u64)),
        );
    }

    pub fn record_batch(&self, duration: Duration, failed: bool, timed_out: bool) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
        if timed_out {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        let mut window = self.durations.lock();
        if window.len() == self.window {
            window.pop_front();
        }
        window.push_back(duration);
    }

    pub fn queue_depth(&self, task_type: TaskType) -> u64 {
        self.queue_depth[task_type.index()].load(Ordering::Relaxed)
    }

    pub fn total_queue_depth(&self) -> u64 {
        self.queue_depth
            .iter()
            .map(|d| d.load(Ordering::Relaxed))
            .sum()
    }

    /// Mean of the recent batch-duration window.
    pub fn average_batch_duration(&self) -> Option<Duration> {
        let window = self.durations.lock();
        if window.is_empty() {
            return None;
        }
        let total: Duration = window.iter().sum();
        Some(total / window.len() as u32)
    }

    pub fn snapshot(&self, cache: &CacheStats) -> StatisticsSnapshot {
        let uptime = self.started_at.elapsed().as_secs_f64();
        let completed = self.completed.load(Ordering::Relaxed);
        let queue_depth: BTreeMap<TaskType, u64> = TaskType::ALL
            .iter()
            .map(|t| (*t, self.queue_depth(*t)))
            .collect();
        StatisticsSnapshot {
            jobs_submitted: self.submitted.load(Ordering::Relaxed),
            jobs_completed: completed,
            jobs_failed: self.failed.load(Ordering::Relaxed),
            jobs_cancelled: self.cancelled.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            batch_timeouts: self.timeouts.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_hit_rate: cache.hit_ratio(),
            total_queue_depth: queue_depth.values().sum(),
            queue_depth,
            average_batch_duration_ms: self
                .average_batch_duration()
                .map(|d| d.as_secs_f64() * 1000.0),
            throughput_per_sec: if uptime > 0.0 {
                completed as f64 / uptime
            } else {
                0.0
            },
            uptime_secs: uptime,
        }
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new(100)
    }
}
