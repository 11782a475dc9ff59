//! Per-agent polling supervisor
//!
//! The [`Monitor`] owns one `AgentPoller` task per monitored agent. Each
//! poller is an actor: it ticks on its own interval, answers commands sent
//! through its handle, and exits when its cancellation signal fires.
//!
//! ## Lifecycle
//!
//! - `start_monitoring` spawns a poller; a second start for the same agent is
//!   a conflict while the first is still running
//! - `stop_monitoring` fires the cancellation signal and waits for the task
//!   to exit, so no tick of the old poller can run after it returns. The
//!   supervisor lock is released while waiting; until the poller has exited a
//!   new start for that agent is still a conflict
//! - dropping the [`Monitor`] drops every signal sender, which also stops the
//!   pollers
//!
//! A tick that is already collecting is never interrupted; cancellation is
//! observed before the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use super::{Metric, MetricsCollector, ThresholdTable};
use crate::agents::AgentRegistry;
use crate::alerts::{Alert, AlertManager};
use crate::error::{Error, Result};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The agent is not registered; nothing was collected
    Skipped,
    Collected { metrics: usize, alerts: usize },
}

/// State shared by the supervisor and every poller
struct MonitorShared {
    registry: Arc<AgentRegistry>,
    collector: Arc<dyn MetricsCollector>,
    alerts: Arc<AlertManager>,
    series: RwLock<HashMap<String, Vec<Metric>>>,
    thresholds: ThresholdTable,
}

impl MonitorShared {
    /// Collect, record and evaluate one batch for `agent_id`
    async fn tick(&self, agent_id: &str) -> Result<TickOutcome> {
        let agent = match self.registry.get(agent_id).await {
            Ok(agent) => agent,
            Err(e) if e.is_not_found() => {
                trace!(agent_id, "agent not registered, skipping tick");
                return Ok(TickOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let limits = self.thresholds.for_agent(agent_id).await;
        let batch = self.collector.collect(&agent).await?;

        {
            let mut series = self.series.write().await;
            series
                .entry(agent_id.to_string())
                .or_default()
                .extend(batch.iter().cloned());
        }

        let raised_at = Utc::now();
        let mut raised = 0;
        for metric in &batch {
            let Some(&threshold) = limits.get(&metric.name) else {
                continue;
            };
            if metric.value > threshold {
                let alert = Alert::breach(agent_id, &metric.name, metric.value, threshold, raised_at);
                self.alerts.add_alert(alert).await;
                raised += 1;
            }
        }

        trace!(agent_id, metrics = batch.len(), alerts = raised, "tick complete");
        Ok(TickOutcome::Collected {
            metrics: batch.len(),
            alerts: raised,
        })
    }
}

enum PollerCommand {
    PollNow {
        respond_to: oneshot::Sender<Result<TickOutcome>>,
    },
    UpdateInterval {
        interval: Duration,
    },
}

/// Polling actor for a single agent
struct AgentPoller {
    agent_id: String,
    shared: Arc<MonitorShared>,
    command_rx: mpsc::Receiver<PollerCommand>,
    cancel: watch::Receiver<bool>,
    interval: Duration,
}

impl AgentPoller {
    #[instrument(skip(self), fields(agent_id = %self.agent_id))]
    async fn run(mut self) {
        debug!("starting poller, interval {:?}", self.interval);

        let mut ticker = Self::ticker(self.interval);

        loop {
            tokio::select! {
                biased;

                _ = cancelled(&mut self.cancel) => {
                    debug!("cancellation requested");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.shared.tick(&self.agent_id).await {
                        warn!("tick failed, retrying on next interval: {e}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            let _ = respond_to.send(self.shared.tick(&self.agent_id).await);
                        }
                        PollerCommand::UpdateInterval { interval } => {
                            debug!("updating interval to {interval:?}");
                            self.interval = interval;
                            ticker = Self::ticker(interval);
                        }
                    }
                }
            }
        }

        debug!("poller stopped");
    }

    /// First tick fires one full period after start
    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// Resolves once cancellation is requested or the supervisor side is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// Supervisor-side handle to a running poller
struct PollerHandle {
    commands: mpsc::Sender<PollerCommand>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    fn spawn(agent_id: &str, interval: Duration, shared: Arc<MonitorShared>) -> Self {
        let (commands, command_rx) = mpsc::channel(16);
        let (cancel, cancel_rx) = watch::channel(false);

        let poller = AgentPoller {
            agent_id: agent_id.to_string(),
            shared,
            command_rx,
            cancel: cancel_rx,
            interval,
        };

        Self {
            commands,
            cancel,
            task: tokio::spawn(poller.run()),
        }
    }

    /// Not cancelled and not exited
    fn is_running(&self) -> bool {
        !*self.cancel.borrow() && !self.task.is_finished()
    }

    /// Fire the cancellation signal.
    ///
    /// `closed()` on the returned sender resolves once the poller has exited.
    fn cancel(&self) -> mpsc::Sender<PollerCommand> {
        self.cancel.send_replace(true);
        self.commands.clone()
    }

    async fn join(self, agent_id: &str) {
        if let Err(e) = self.task.await {
            warn!(agent_id, "poller task ended abnormally: {e}");
        }
    }
}

/// Supervises one polling task per monitored agent
pub struct Monitor {
    shared: Arc<MonitorShared>,
    pollers: Mutex<HashMap<String, PollerHandle>>,
}

impl Monitor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        collector: Arc<dyn MetricsCollector>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                registry,
                collector,
                alerts,
                series: RwLock::new(HashMap::new()),
                thresholds: ThresholdTable::new(),
            }),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Begin polling `agent_id` every `interval`.
    ///
    /// The agent does not need to be registered yet; ticks are skipped until it is.
    #[instrument(skip(self))]
    pub async fn start_monitoring(&self, agent_id: &str, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::InvalidInput(format!(
                "polling interval for {agent_id} must be positive"
            )));
        }

        let mut pollers = self.pollers.lock().await;
        // a cancelled poller that has not exited yet still counts
        if pollers
            .get(agent_id)
            .is_some_and(|existing| !existing.task.is_finished())
        {
            return Err(Error::Conflict(format!("{agent_id} is already being monitored")));
        }

        pollers.insert(
            agent_id.to_string(),
            PollerHandle::spawn(agent_id, interval, self.shared.clone()),
        );
        info!("monitoring started");
        Ok(())
    }

    /// Cancel the poller for `agent_id` and wait for it to exit.
    ///
    /// Collected metrics and raised alerts are kept.
    #[instrument(skip(self))]
    pub async fn stop_monitoring(&self, agent_id: &str) -> Result<()> {
        let exited = {
            let pollers = self.pollers.lock().await;
            pollers
                .get(agent_id)
                .filter(|handle| handle.is_running())
                .map(PollerHandle::cancel)
                .ok_or_else(|| Error::not_found("monitoring task", agent_id))?
        };

        exited.closed().await;
        self.reap(agent_id, &exited).await;
        info!("monitoring stopped");
        Ok(())
    }

    /// Stop every poller; all are cancelled first, then awaited together
    pub async fn shutdown(&self) {
        let exiting: Vec<(String, mpsc::Sender<PollerCommand>)> = {
            let pollers = self.pollers.lock().await;
            pollers
                .iter()
                .map(|(agent_id, handle)| (agent_id.clone(), handle.cancel()))
                .collect()
        };

        join_all(exiting.iter().map(|(_, exited)| exited.closed())).await;
        for (agent_id, exited) in &exiting {
            self.reap(agent_id, exited).await;
        }
        debug!("all pollers stopped");
    }

    /// Drop the entry of an exited poller, unless a new poller already took its place
    async fn reap(&self, agent_id: &str, exited: &mpsc::Sender<PollerCommand>) {
        let handle = {
            let mut pollers = self.pollers.lock().await;
            let same_poller = pollers
                .get(agent_id)
                .is_some_and(|handle| handle.commands.same_channel(exited));
            if same_poller {
                pollers.remove(agent_id)
            } else {
                None
            }
        };

        if let Some(handle) = handle {
            handle.join(agent_id).await;
        }
    }

    /// Run a tick right away, outside the regular interval
    pub async fn poll_now(&self, agent_id: &str) -> Result<TickOutcome> {
        let commands = self.commands_for(agent_id).await?;
        let (tx, rx) = oneshot::channel();

        commands
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .map_err(|_| Error::not_found("monitoring task", agent_id))?;

        rx.await
            .map_err(|_| Error::not_found("monitoring task", agent_id))?
    }

    /// Change the polling interval of a running poller
    pub async fn update_interval(&self, agent_id: &str, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::InvalidInput(format!(
                "polling interval for {agent_id} must be positive"
            )));
        }

        let commands = self.commands_for(agent_id).await?;
        commands
            .send(PollerCommand::UpdateInterval { interval })
            .await
            .map_err(|_| Error::not_found("monitoring task", agent_id))
    }

    pub async fn is_monitoring(&self, agent_id: &str) -> bool {
        let pollers = self.pollers.lock().await;
        pollers.get(agent_id).is_some_and(PollerHandle::is_running)
    }

    /// Ids of all agents with a running poller
    pub async fn monitored_agents(&self) -> Vec<String> {
        let pollers = self.pollers.lock().await;
        let mut ids: Vec<String> = pollers
            .iter()
            .filter(|(_, handle)| handle.is_running())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Full metric history for `agent_id`
    pub async fn get_metrics(&self, agent_id: &str) -> Result<Vec<Metric>> {
        let series = self.shared.series.read().await;
        series
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::not_found("metric series", agent_id))
    }

    /// Metrics with `start <= timestamp <= end`
    pub async fn query_metrics(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Metric>> {
        let series = self.shared.series.read().await;
        let metrics = series
            .get(agent_id)
            .ok_or_else(|| Error::not_found("metric series", agent_id))?;

        Ok(metrics
            .iter()
            .filter(|metric| metric.timestamp >= start && metric.timestamp <= end)
            .cloned()
            .collect())
    }

    /// Every alert raised for `agent_id`, with its current status
    pub async fn get_alerts(&self, agent_id: &str) -> Result<Vec<Alert>> {
        self.shared.alerts.alerts_for_agent(agent_id).await
    }

    /// Set the threshold for one metric; applies from the next tick on
    pub async fn set_alert_threshold(&self, agent_id: &str, metric: &str, threshold: f64) {
        debug!(agent_id, metric, threshold, "threshold set");
        self.shared.thresholds.set(agent_id, metric, threshold).await;
    }

    pub async fn alert_threshold(&self, agent_id: &str, metric: &str) -> Option<f64> {
        self.shared.thresholds.get(agent_id, metric).await
    }

    async fn commands_for(&self, agent_id: &str) -> Result<mpsc::Sender<PollerCommand>> {
        let pollers = self.pollers.lock().await;
        pollers
            .get(agent_id)
            .filter(|handle| handle.is_running())
            .map(|handle| handle.commands.clone())
            .ok_or_else(|| Error::not_found("monitoring task", agent_id))
    }
}
