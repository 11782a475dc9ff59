//! Service facade owning the queue, registry, dispatcher, monitor and alert manager
//!
//! Everything outside the crate talks to a [`Coordinator`]: it is built once,
//! either from explicit parts or from a [`Config`], and shut down once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::agents::{Agent, AgentCommand, AgentRegistry, CommandDispatcher, FanOutOutcome, Submission};
use crate::alerts::discord::DiscordNotifier;
use crate::alerts::webhook::{SlackNotifier, WebhookNotifier};
use crate::alerts::{Alert, AlertManager, Notifier};
use crate::config::{Config, NotifierConfig, QueueBackend};
use crate::error::Result;
use crate::monitoring::{AgentEndpoint, HttpCollector, Metric, MetricsCollector, Monitor, TickOutcome};
use crate::queue::{Job, JobQueue, MemoryQueueStore, QueueStore};

pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    dispatcher: CommandDispatcher,
    monitor: Monitor,
    alerts: Arc<AlertManager>,
}

impl Coordinator {
    pub fn new(
        queue: JobQueue,
        collector: Arc<dyn MetricsCollector>,
        notifiers: Vec<Arc<dyn Notifier>>,
        max_concurrency: Option<usize>,
    ) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let alerts = Arc::new(AlertManager::new(notifiers));
        let dispatcher =
            CommandDispatcher::new(registry.clone(), queue).with_max_concurrency(max_concurrency);
        let monitor = Monitor::new(registry.clone(), collector, alerts.clone());

        Self {
            registry,
            dispatcher,
            monitor,
            alerts,
        }
    }

    /// Build every service from `config`, then register and start the configured agents
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = open_store(config).await?;
        let queue = JobQueue::new(store, config.queue.prefix.clone());

        let mut collector = HttpCollector::new(config.monitoring.collector_timeout())?;
        for agent in &config.agents {
            collector = collector.with_endpoint(
                agent.id.clone(),
                AgentEndpoint::new(&agent.hostname, agent.port, agent.token.clone()),
            );
        }

        let notifiers = build_notifiers(&config.notifiers)?;
        info!("{} notifiers configured", notifiers.len());

        let coordinator = Self::new(
            queue,
            Arc::new(collector),
            notifiers,
            config.dispatch.max_concurrency,
        );
        coordinator.bootstrap(config).await?;

        Ok(coordinator)
    }

    /// Register the configured agents, apply their thresholds and start polling
    async fn bootstrap(&self, config: &Config) -> anyhow::Result<()> {
        for agent_config in &config.agents {
            let agent = Agent::new(agent_config.id.clone(), agent_config.hostname.clone())
                .with_tags(agent_config.tags.iter().cloned());
            self.register_agent(agent).await;

            for (metric, threshold) in &agent_config.thresholds {
                self.set_alert_threshold(&agent_config.id, metric, *threshold)
                    .await;
            }

            if config.monitoring.autostart {
                let interval = config.monitoring.interval_for(agent_config);
                self.start_monitoring(&agent_config.id, interval)
                    .await
                    .with_context(|| format!("failed to start monitoring {}", agent_config.id))?;
            }
        }
        Ok(())
    }

    pub async fn register_agent(&self, agent: Agent) {
        self.registry.register(agent).await;
    }

    pub async fn heartbeat(&self, agent_id: &str) -> Result<Agent> {
        self.registry.heartbeat(agent_id).await
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry.list().await
    }

    pub async fn run_on_agent(&self, agent_id: &str, command: &AgentCommand) -> Result<Submission> {
        self.dispatcher.run_on_agent(agent_id, command).await
    }

    pub async fn run_on_all(&self, command: &AgentCommand) -> HashMap<String, FanOutOutcome> {
        self.dispatcher.run_on_all(command).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.dispatcher.get_job(job_id).await
    }

    /// Queue used by job executors to dequeue and report results
    pub fn queue(&self) -> &JobQueue {
        self.dispatcher.queue()
    }

    pub async fn start_monitoring(&self, agent_id: &str, interval: Duration) -> Result<()> {
        self.monitor.start_monitoring(agent_id, interval).await
    }

    pub async fn stop_monitoring(&self, agent_id: &str) -> Result<()> {
        self.monitor.stop_monitoring(agent_id).await
    }

    pub async fn poll_now(&self, agent_id: &str) -> Result<TickOutcome> {
        self.monitor.poll_now(agent_id).await
    }

    pub async fn get_metrics(&self, agent_id: &str) -> Result<Vec<Metric>> {
        self.monitor.get_metrics(agent_id).await
    }

    pub async fn query_metrics(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Metric>> {
        self.monitor.query_metrics(agent_id, start, end).await
    }

    pub async fn get_alerts(&self, agent_id: &str) -> Result<Vec<Alert>> {
        self.monitor.get_alerts(agent_id).await
    }

    pub async fn set_alert_threshold(&self, agent_id: &str, metric: &str, threshold: f64) {
        self.monitor
            .set_alert_threshold(agent_id, metric, threshold)
            .await;
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> Result<Alert> {
        self.alerts.resolve_alert(alert_id).await
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.alerts.get_active_alerts().await
    }

    /// Stop every poller, then release the queue store
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        self.monitor.shutdown().await;
        self.dispatcher.queue().close().await?;
        debug!("coordinator shut down");
        Ok(())
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn QueueStore>> {
    match config.queue.backend {
        QueueBackend::Memory => {
            info!("using in-memory job queue");
            Ok(Arc::new(MemoryQueueStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        QueueBackend::Sqlite => {
            info!("using SQLite job queue at {}", config.queue.path.display());
            let store = crate::queue::sqlite::SqliteQueueStore::new(&config.queue.path)
                .await
                .context("failed to open SQLite queue store")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        QueueBackend::Sqlite => {
            anyhow::bail!("SQLite queue backend requires the `storage-sqlite` feature")
        }
    }
}

/// Instantiate the configured notifiers in order
pub fn build_notifiers(configs: &[NotifierConfig]) -> anyhow::Result<Vec<Arc<dyn Notifier>>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::with_capacity(configs.len());

    for config in configs {
        match config {
            NotifierConfig::Discord(discord) => notifiers.push(Arc::new(DiscordNotifier::new(
                discord.url.clone(),
                discord.user_id.clone(),
            ))),
            NotifierConfig::Slack(slack) => {
                notifiers.push(Arc::new(SlackNotifier::new(slack.url.clone())))
            }
            NotifierConfig::Webhook(webhook) => {
                notifiers.push(Arc::new(WebhookNotifier::new(webhook.url.clone())))
            }
            #[cfg(feature = "email")]
            NotifierConfig::Email(email) => {
                let settings = crate::alerts::email::SmtpSettings {
                    host: email.host.clone(),
                    port: email.port,
                    username: email.username.clone(),
                    password: email.password.clone(),
                    from: email.from.clone(),
                    to: email.to.clone(),
                };
                let notifier = crate::alerts::email::EmailNotifier::new(&settings)
                    .context("invalid email notifier configuration")?;
                notifiers.push(Arc::new(notifier));
            }
            #[cfg(not(feature = "email"))]
            NotifierConfig::Email(email) => {
                tracing::warn!("email notifier for {} skipped: built without the `email` feature", email.host);
            }
        }
    }

    Ok(notifiers)
}
