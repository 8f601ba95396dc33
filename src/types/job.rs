//! Job records and their lifecycle state machine.

use super::task::{Priority, TaskType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier, assigned at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|_| Error::not_found(s))
    }
}

/// Monotonic identifier of a sealed batch. Lower ids were formed earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobErrorKind {
    Processing,
    Timeout,
}

/// Error recorded on a failed job. Every job of a failed batch carries the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::Processing,
            message: message.into(),
        }
    }
}

impl From<&Error> for JobError {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Timeout { .. } => JobErrorKind::Timeout,
            _ => JobErrorKind::Processing,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One caller-submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task_type: TaskType,
    pub priority: Priority,
    pub input: String,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<JobError>,
    pub cache_hit: bool,
    pub batch_id: Option<BatchId>,
    pub submitted_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(task_type: TaskType, priority: Priority, input: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            task_type,
            priority,
            input: input.into(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            cache_hit: false,
            batch_id: None,
            submitted_at: Utc::now(),
            queued_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// A job answered from the result cache; it never enters a buffer.
    pub fn from_cache(
        task_type: TaskType,
        priority: Priority,
        input: impl Into<String>,
        result: Value,
    ) -> Self {
        let mut job = Self::new(task_type, priority, input);
        job.status = JobStatus::Completed;
        job.result = Some(result);
        job.cache_hit = true;
        job.completed_at = Some(job.submitted_at);
        job
    }

    fn transition(&mut self, allowed: &[JobStatus], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                job_id: self.id.to_string(),
                status: self.status.to_string(),
                operation,
            })
        }
    }

    pub fn mark_queued(&mut self) -> Result<()> {
        self.transition(&[JobStatus::Pending], "queue")?;
        self.status = JobStatus::Queued;
        self.queued_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_processing(&mut self, batch_id: BatchId) -> Result<()> {
        self.transition(&[JobStatus::Queued], "start processing")?;
        self.status = JobStatus::Processing;
        self.batch_id = Some(batch_id);
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<()> {
        self.transition(&[JobStatus::Processing], "complete")?;
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: JobError) -> Result<()> {
        self.transition(&[JobStatus::Processing], "fail")?;
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition(&[JobStatus::Pending, JobStatus::Queued], "cancel")?;
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Status view returned by `get_status`. Mirrors the job without its input text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub id: JobId,
    pub task_type: TaskType,
    pub priority: Priority,
    pub status: JobStatus,
    pub cache_hit: bool,
    pub batch_id: Option<BatchId>,
    pub submitted_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<&Job> for JobStatusRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            task_type: job.task_type,
            priority: job.priority,
            status: job.status,
            cache_hit: job.cache_hit,
            batch_id: job.batch_id,
            submitted_at: job.submitted_at,
            queued_at: job.queued_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

/// Answer of `get_result`: either a terminal outcome or a "still processing" marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobOutcome {
    Pending { status: JobStatus },
    Completed { result: Value },
    Failed { error: JobError },
    Cancelled,
}

impl JobOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, JobOutcome::Pending { .. })
    }
}

impl From<&Job> for JobOutcome {
    fn from(job: &Job) -> Self {
        match (job.status, &job.result, &job.error) {
            (JobStatus::Completed, Some(result), _) => JobOutcome::Completed {
                result: result.clone(),
            },
            (JobStatus::Failed, _, Some(error)) => JobOutcome::Failed {
                error: error.clone(),
            },
            (JobStatus::Cancelled, _, _) => JobOutcome::Cancelled,
            (status, _, _) => JobOutcome::Pending { status },
        }
    }
}
