//! Durable job queue
//!
//! The queue wraps a [`QueueStore`] and owns the job lifecycle:
//!
//! ```text
//! enqueue ──► queued ──dequeue──► running ──┬─ complete_job ─► completed
//!                                           └─ fail_job ─────► failed
//! ```
//!
//! ## Store layout
//!
//! - `{prefix}:jobs:{id}` hash, field `data`: the JSON job record
//! - `{prefix}:queue` list: pending job ids, pushed at the head, popped at the tail
//!
//! ## Dequeue gap
//!
//! `dequeue` pops the id and then writes the `running` record as two separate
//! store operations. If the process dies in between, the job is no longer
//! pending but still recorded as `queued`; it stays reachable through
//! [`JobQueue::get_job`]. Nothing reconciles such jobs automatically.

pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;
pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryQueueStore;
pub use store::{HealthStatus, QueueStore};

/// Hash field holding the serialized job record
const DATA_FIELD: &str = "data";

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One command-execution request tracked through the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub agent_id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,

    /// Declared command timeout; stored but not enforced by the queue
    #[serde(with = "duration_nanos")]
    pub timeout: Duration,

    pub created_at: DateTime<Utc>,
    pub status: JobStatus,

    /// Result payload for completed jobs, error message for failed ones
    #[serde(default)]
    pub result: String,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            command: command.into(),
            args,
            timeout,
            created_at: Utc::now(),
            status: JobStatus::Queued,
            result: String::new(),
        }
    }
}

/// Durations are stored as integer nanoseconds
pub(crate) mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}

/// Job queue backed by a [`QueueStore`]
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn QueueStore>,
    prefix: String,
}

impl JobQueue {
    pub fn new(store: Arc<dyn QueueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Queue over a fresh in-memory store
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryQueueStore::new()), prefix)
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}:jobs:{}", self.prefix, job_id)
    }

    fn queue_key(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    /// Store the job as `queued` and push its id onto the pending queue.
    ///
    /// Record and queue entry are written in one store transaction. An id
    /// already present in this queue is rejected with [`Error::Conflict`] and
    /// leaves the existing record untouched.
    #[instrument(skip(self, job), fields(job_id = %job.id, agent_id = %job.agent_id))]
    pub async fn enqueue(&self, mut job: Job) -> Result<()> {
        job.status = JobStatus::Queued;
        let data = serde_json::to_string(&job)?;

        self.store
            .push_with_field(
                &self.job_key(&job.id),
                DATA_FIELD,
                &data,
                &self.queue_key(),
                &job.id,
            )
            .await
            .map_err(|e| match e {
                StoreError::DuplicateKey(_) => {
                    Error::Conflict(format!("job {} already exists", job.id))
                }
                other => Error::StoreFailure(other),
            })?;

        debug!("job enqueued");
        Ok(())
    }

    /// Pop the oldest pending job and mark it `running`.
    ///
    /// Returns `Ok(None)` when no job is pending.
    #[instrument(skip(self))]
    pub async fn dequeue(&self) -> Result<Option<Job>> {
        let Some(job_id) = self.store.pop_tail(&self.queue_key()).await? else {
            trace!("no job available");
            return Ok(None);
        };

        let mut job = self.load(&job_id).await?;
        self.transition(&mut job, JobStatus::Running)?;
        self.save(&job).await?;

        debug!(job_id = %job.id, "job dequeued");
        Ok(Some(job))
    }

    /// Mark a running job as completed with its result payload
    #[instrument(skip(self, result))]
    pub async fn complete_job(&self, job_id: &str, result: impl Into<String>) -> Result<Job> {
        self.finish(job_id, JobStatus::Completed, result.into()).await
    }

    /// Mark a running job as failed with an error message
    #[instrument(skip(self, message))]
    pub async fn fail_job(&self, job_id: &str, message: impl Into<String>) -> Result<Job> {
        self.finish(job_id, JobStatus::Failed, message.into()).await
    }

    /// Read-only fetch of a job record
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.load(job_id).await
    }

    /// Number of jobs waiting to be dequeued
    pub async fn pending(&self) -> Result<usize> {
        Ok(self.store.list_len(&self.queue_key()).await?)
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        Ok(self.store.health_check().await?)
    }

    /// Release the store connection; safe to call repeatedly
    pub async fn close(&self) -> Result<()> {
        Ok(self.store.close().await?)
    }

    async fn finish(&self, job_id: &str, status: JobStatus, payload: String) -> Result<Job> {
        let mut job = self.load(job_id).await?;
        self.transition(&mut job, status)?;
        job.result = payload;
        self.save(&job).await?;

        debug!("job {job_id} {status}");
        Ok(job)
    }

    fn transition(&self, job: &mut Job, next: JobStatus) -> Result<()> {
        if !job.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: job.id.clone(),
                from: job.status.to_string(),
                to: next.to_string(),
            });
        }
        job.status = next;
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Job> {
        let data = self
            .store
            .get_field(&self.job_key(job_id), DATA_FIELD)
            .await?
            .ok_or_else(|| Error::not_found("job", job_id))?;

        serde_json::from_str(&data)
            .map_err(|e| Error::Serialization(format!("failed to decode job {job_id}: {e}")))
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let data = serde_json::to_string(job)?;
        self.store
            .set_field(&self.job_key(&job.id), DATA_FIELD, &data)
            .await?;
        Ok(())
    }
}
