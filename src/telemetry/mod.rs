//! 遥测模块：作业事件的内存、日志与组合 sink 实现。
//!
//! Job event sink implementations.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`JobEvent`] | Terminal job transition event |
//! | [`JobEventSink`] | Trait for event destinations |
//! | [`NoopJobSink`] | Default no-op sink |
//! | [`InMemoryJobSink`] | Bounded in-memory sink for testing |
//! | [`TracingJobSink`] | Emits each event as a `tracing` record |
//! | [`CompositeJobSink`] | Multi-destination composite sink |

pub use crate::events::{noop_sink, JobEvent, JobEventSink, NoopJobSink};

use crate::types::JobId;
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// In-memory sink for testing. Keeps the most recent `max_events`.
pub struct InMemoryJobSink {
    events: RwLock<VecDeque<JobEvent>>,
    max_events: usize,
}
impl InMemoryJobSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max.max(1),
        }
    }
    pub fn get_events(&self) -> Vec<JobEvent> {
        self.events.read().iter().cloned().collect()
    }
    pub fn get_events_for_job(&self, job_id: &JobId) -> Vec<JobEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| &e.job_id() == job_id)
            .cloned()
            .collect()
    }
    pub fn clear(&self) {
        self.events.write().clear();
    }
    pub fn len(&self) -> usize {
        self.events.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
#[async_trait]
impl JobEventSink for InMemoryJobSink {
    async fn publish(&self, event: JobEvent) -> Result<()> {
        let mut events = self.events.write();
        events.push_back(event);
        if events.len() > self.max_events {
            events.pop_front();
        }
        Ok(())
    }
}

/// Logs each event at `info` (completed, cancelled) or `warn` (failed).
#[derive(Default)]
pub struct TracingJobSink;

#[async_trait]
impl JobEventSink for TracingJobSink {
    async fn publish(&self, event: JobEvent) -> Result<()> {
        let r = event.record();
        match &event {
            JobEvent::Failed(_) => warn!(
                job_id = %r.id,
                task_type = %r.task_type,
                error = r.error.as_ref().map(|e| e.message.as_str()).unwrap_or(""),
                "job failed"
            ),
            _ => info!(
                job_id = %r.id,
                task_type = %r.task_type,
                status = %r.status,
                cache_hit = r.cache_hit,
                "job finished"
            ),
        }
        Ok(())
    }
}

/// Composite sink for multiple destinations. One failing sink does not stop the others.
pub struct CompositeJobSink {
    sinks: Vec<Arc<dyn JobEventSink>>,
}
impl CompositeJobSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }
    pub fn add_sink(mut self, sink: Arc<dyn JobEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}
impl Default for CompositeJobSink {
    fn default() -> Self {
        Self::new()
    }
}
#[async_trait]
impl JobEventSink for CompositeJobSink {
    async fn publish(&self, event: JobEvent) -> Result<()> {
        for s in &self.sinks {
            if let Err(e) = s.publish(event.clone()).await {
                warn!(error = %e, "job event sink failed");
            }
        }
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        for s in &self.sinks {
            let _ = s.close().await;
        }
        Ok(())
    }
}
