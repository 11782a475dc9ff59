//! Command dispatch to one agent or the whole fleet
//!
//! Dispatch is fire-and-forget: a submission returns as soon as the job is in
//! the queue. Observing completion is a separate [`CommandDispatcher::get_job`]
//! call.
//!
//! ```text
//! run_on_all ─► snapshot registry ─┬─► task(agent-1) ─► enqueue ─┐
//!                                  ├─► task(agent-2) ─► enqueue ─┼─► results (Mutex)
//!                                  └─► task(agent-N) ─► enqueue ─┘
//!                                            join all submissions ◄┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{Agent, AgentCommand, AgentRegistry};
use crate::error::Result;
use crate::queue::{Job, JobQueue, JobStatus};

/// Receipt for a queued job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    pub agent_id: String,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

/// Per-agent outcome of a fan-out submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutOutcome {
    Result(Submission),
    Error(String),
}

impl FanOutOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, FanOutOutcome::Error(_))
    }

    pub fn submission(&self) -> Option<&Submission> {
        match self {
            FanOutOutcome::Result(submission) => Some(submission),
            FanOutOutcome::Error(_) => None,
        }
    }
}

/// Submits commands as jobs for registered agents
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<AgentRegistry>,
    queue: JobQueue,

    /// Bound on in-flight fan-out submissions; `None` means one task per agent at once
    limiter: Option<Arc<Semaphore>>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<AgentRegistry>, queue: JobQueue) -> Self {
        Self {
            registry,
            queue,
            limiter: None,
        }
    }

    /// Cap the number of concurrent submissions during `run_on_all`
    pub fn with_max_concurrency(mut self, max: Option<usize>) -> Self {
        self.limiter = max.map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Queue `command` for one agent
    #[instrument(skip(self, command), fields(command = %command.command))]
    pub async fn run_on_agent(&self, agent_id: &str, command: &AgentCommand) -> Result<Submission> {
        let agent = self.registry.get(agent_id).await?;
        self.submit(&agent, command).await
    }

    /// Queue `command` for every agent registered at call time.
    ///
    /// Returns once every submission has returned, with exactly one entry per agent.
    #[instrument(skip(self, command), fields(command = %command.command))]
    pub async fn run_on_all(&self, command: &AgentCommand) -> HashMap<String, FanOutOutcome> {
        let agents = self.registry.list().await;
        debug!("fanning out to {} agents", agents.len());

        let results = Arc::new(Mutex::new(HashMap::with_capacity(agents.len())));
        let mut agent_ids = Vec::with_capacity(agents.len());
        let mut tasks = Vec::with_capacity(agents.len());

        for agent in agents {
            agent_ids.push(agent.id.clone());

            let dispatcher = self.clone();
            let command = command.clone();
            let results = results.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = match &dispatcher.limiter {
                    Some(limiter) => limiter.clone().acquire_owned().await.ok(),
                    None => None,
                };

                let outcome = match dispatcher.submit(&agent, &command).await {
                    Ok(submission) => FanOutOutcome::Result(submission),
                    Err(e) => {
                        warn!(agent_id = %agent.id, "submission failed: {e}");
                        FanOutOutcome::Error(e.to_string())
                    }
                };

                results.lock().await.insert(agent.id, outcome);
            }));
        }

        let joined = join_all(tasks).await;

        let mut results = results.lock().await;
        for (agent_id, joined) in agent_ids.into_iter().zip(joined) {
            if let Err(e) = joined {
                error!(agent_id = %agent_id, "submission task aborted: {e}");
                results
                    .entry(agent_id)
                    .or_insert_with(|| FanOutOutcome::Error(format!("submission task aborted: {e}")));
            }
        }

        std::mem::take(&mut *results)
    }

    /// Current state of a submitted job
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.queue.get_job(job_id).await
    }

    async fn submit(&self, agent: &Agent, command: &AgentCommand) -> Result<Submission> {
        let job = Job::new(
            job_id_for(&agent.id),
            agent.id.clone(),
            command.command.clone(),
            command.args.clone(),
            command.timeout,
        );
        let job_id = job.id.clone();

        self.queue.enqueue(job).await?;

        Ok(Submission {
            job_id,
            agent_id: agent.id.clone(),
            status: JobStatus::Queued,
            timestamp: Utc::now(),
        })
    }
}

/// Agent id plus a random disambiguator, unique under concurrent submissions
pub fn job_id_for(agent_id: &str) -> String {
    format!("{}-{}", agent_id, Uuid::new_v4().simple())
}
