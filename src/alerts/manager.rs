//! Alert storage and notification fan-out
//!
//! `add_alert` stores the alert and returns right away. Delivery runs in one
//! spawned task per notifier, so a slow or failing notifier never delays the
//! caller or the other notifiers. Failures are logged, not retried.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use super::{Alert, AlertStatus, Notifier};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct AlertBook {
    alerts: HashMap<String, Alert>,

    /// Alert ids per agent, in the order they were raised
    by_agent: HashMap<String, Vec<String>>,
}

/// Stores alerts and dispatches them to every registered notifier
pub struct AlertManager {
    book: RwLock<AlertBook>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl AlertManager {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            book: RwLock::new(AlertBook::default()),
            notifiers,
        }
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Store `alert` and hand it to every notifier in the background.
    ///
    /// The returned handles may be awaited to observe delivery; dropping them
    /// leaves the deliveries running. An id that is already stored keeps its
    /// first record and is not delivered again.
    #[instrument(skip(self, alert), fields(alert_id = %alert.id, agent_id = %alert.agent_id))]
    pub async fn add_alert(&self, alert: Alert) -> Vec<JoinHandle<()>> {
        {
            let mut book = self.book.write().await;
            let AlertBook { alerts, by_agent } = &mut *book;
            match alerts.entry(alert.id.clone()) {
                Entry::Occupied(_) => {
                    debug!("alert already recorded");
                    return Vec::new();
                }
                Entry::Vacant(slot) => {
                    slot.insert(alert.clone());
                    by_agent
                        .entry(alert.agent_id.clone())
                        .or_default()
                        .push(alert.id.clone());
                }
            }
        }

        info!("{}", alert.message);

        self.notifiers
            .iter()
            .map(|notifier| {
                let notifier = Arc::clone(notifier);
                let alert = alert.clone();
                tokio::spawn(async move {
                    match notifier.notify(&alert).await {
                        Ok(()) => debug!(notifier = notifier.name(), alert_id = %alert.id, "notification sent"),
                        Err(e) => error!(
                            notifier = notifier.name(),
                            alert_id = %alert.id,
                            "failed to send notification: {e}"
                        ),
                    }
                })
            })
            .collect()
    }

    /// Mark an alert resolved; resolving twice is a no-op
    #[instrument(skip(self))]
    pub async fn resolve_alert(&self, alert_id: &str) -> Result<Alert> {
        let mut book = self.book.write().await;
        let alert = book
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| Error::not_found("alert", alert_id))?;

        if alert.status != AlertStatus::Resolved {
            alert.status = AlertStatus::Resolved;
            debug!("alert resolved");
        }
        Ok(alert.clone())
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Alert> {
        let book = self.book.read().await;
        book.alerts
            .get(alert_id)
            .cloned()
            .ok_or_else(|| Error::not_found("alert", alert_id))
    }

    /// Snapshot of all active alerts, oldest first
    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        let book = self.book.read().await;
        let mut active: Vec<Alert> = book
            .alerts
            .values()
            .filter(|alert| alert.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        active
    }

    /// Every alert ever raised for `agent_id`, in raise order
    pub async fn alerts_for_agent(&self, agent_id: &str) -> Result<Vec<Alert>> {
        let book = self.book.read().await;
        let ids = book
            .by_agent
            .get(agent_id)
            .ok_or_else(|| Error::not_found("alerts for agent", agent_id))?;

        Ok(ids
            .iter()
            .filter_map(|id| book.alerts.get(id))
            .cloned()
            .collect())
    }
}
