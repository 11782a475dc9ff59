//! Fan-out of one command to every registered agent

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleet_dispatch::agents::{AgentCommand, AgentRegistry, CommandDispatcher, FanOutOutcome};
use fleet_dispatch::queue::{
    HealthStatus, JobQueue, JobStatus, MemoryQueueStore, QueueStore, StoreResult,
};
use wiremock::MockServer;

use crate::helpers::*;

#[tokio::test]
async fn test_run_on_all_has_one_entry_per_agent() {
    let server = MockServer::start().await;
    let ids: Vec<String> = (0..25).map(|i| format!("agent-{i:02}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let coordinator = coordinator_with(&server, &id_refs, Vec::new()).await;

    let results = coordinator.run_on_all(&AgentCommand::new("uptime")).await;

    assert_eq!(results.len(), ids.len());
    let job_ids: HashSet<_> = results
        .values()
        .map(|outcome| outcome.submission().unwrap().job_id.clone())
        .collect();
    assert_eq!(job_ids.len(), ids.len());

    for id in &ids {
        let submission = results[id].submission().unwrap();
        let job = coordinator.get_job(&submission.job_id).await.unwrap();
        assert_eq!(&job.agent_id, id);
        assert_eq!(job.status, JobStatus::Queued);
    }
}

#[tokio::test]
async fn test_run_on_all_reports_store_failures_per_agent() {
    let store = Arc::new(MemoryQueueStore::new());
    let registry = Arc::new(AgentRegistry::new());
    for id in ["a1", "a2", "a3"] {
        registry.register(test_agent(id)).await;
    }
    let dispatcher = CommandDispatcher::new(registry, JobQueue::new(store.clone(), "it"));

    store.close().await.unwrap();
    let results = dispatcher.run_on_all(&AgentCommand::new("reboot")).await;

    assert_eq!(results.len(), 3);
    for outcome in results.values() {
        assert!(matches!(outcome, FanOutOutcome::Error(message) if message.contains("closed")));
    }
}

/// Memory store that holds each submission briefly and records the peak
/// number of submissions in flight at once
#[derive(Default)]
struct PeakTrackingStore {
    inner: MemoryQueueStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl QueueStore for PeakTrackingStore {
    async fn push_with_field(
        &self,
        hash_key: &str,
        field: &str,
        value: &str,
        list_key: &str,
        element: &str,
    ) -> StoreResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = self
            .inner
            .push_with_field(hash_key, field, value, list_key, element)
            .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn pop_tail(&self, list_key: &str) -> StoreResult<Option<String>> {
        self.inner.pop_tail(list_key).await
    }

    async fn get_field(&self, hash_key: &str, field: &str) -> StoreResult<Option<String>> {
        self.inner.get_field(hash_key, field).await
    }

    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.inner.set_field(hash_key, field, value).await
    }

    async fn list_len(&self, list_key: &str) -> StoreResult<usize> {
        self.inner.list_len(list_key).await
    }

    async fn health_check(&self) -> StoreResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }
}

async fn peak_for(cap: Option<usize>) -> (usize, usize) {
    let registry = Arc::new(AgentRegistry::new());
    for i in 0..10 {
        registry.register(test_agent(&format!("a{i}"))).await;
    }
    let store = Arc::new(PeakTrackingStore::default());
    let dispatcher = CommandDispatcher::new(registry, JobQueue::new(store.clone(), "it"))
        .with_max_concurrency(cap);

    let results = dispatcher.run_on_all(&AgentCommand::new("uptime")).await;
    assert_eq!(results.len(), 10);
    assert!(results.values().all(|outcome| !outcome.is_error()));
    assert_eq!(dispatcher.queue().pending().await.unwrap(), 10);

    (store.peak.load(Ordering::SeqCst), results.len())
}

#[tokio::test]
async fn test_run_on_all_respects_concurrency_limit() {
    let (peak, _) = peak_for(Some(3)).await;
    assert!(peak <= 3, "peak in-flight submissions was {peak}");
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_run_on_all_without_limit_overlaps_submissions() {
    let (peak, submitted) = peak_for(None).await;
    assert!(peak > 3, "peak in-flight submissions was {peak}");
    assert!(peak <= submitted);
}
