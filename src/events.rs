//! 作业事件：终态作业通知的 sink trait 与事件类型（始终编译）。
//!
//! Core job event types.
//!
//! Provides the [`JobEventSink`] trait, the [`JobEvent`] enum and
//! [`NoopJobSink`]. Persistence layers and notification channels subscribe to
//! terminal job transitions through a sink; the scheduler never depends on a
//! sink for correctness, and sink errors are logged and dropped.

use crate::types::{JobId, JobStatus, JobStatusRecord};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Emitted once per job when it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "job", rename_all = "lowercase")]
pub enum JobEvent {
    Completed(JobStatusRecord),
    Failed(JobStatusRecord),
    Cancelled(JobStatusRecord),
}

impl JobEvent {
    /// Build the event matching a terminal record; `None` for live jobs.
    pub fn from_record(record: JobStatusRecord) -> Option<Self> {
        match record.status {
            JobStatus::Completed => Some(JobEvent::Completed(record)),
            JobStatus::Failed => Some(JobEvent::Failed(record)),
            JobStatus::Cancelled => Some(JobEvent::Cancelled(record)),
            _ => None,
        }
    }

    pub fn record(&self) -> &JobStatusRecord {
        match self {
            JobEvent::Completed(r) | JobEvent::Failed(r) | JobEvent::Cancelled(r) => r,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.record().id
    }
}

/// Job event sink trait.
#[async_trait]
pub trait JobEventSink: Send + Sync {
    async fn publish(&self, event: JobEvent) -> Result<()>;
    async fn publish_batch(&self, events: Vec<JobEvent>) -> Result<()> {
        for e in events {
            self.publish(e).await?;
        }
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// No-op sink (always available).
pub struct NoopJobSink;

#[async_trait]
impl JobEventSink for NoopJobSink {
    async fn publish(&self, _: JobEvent) -> Result<()> {
        Ok(())
    }
}

/// Returns a no-op job event sink.
pub fn noop_sink() -> Arc<dyn JobEventSink> {
    Arc::new(NoopJobSink)
}
