//! Concurrency tests
//!
//! - Many pollers ticking at once against one mocked agent endpoint
//! - Concurrent submissions racing on the same queue
//! - Start / stop storms on the same agent id

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use fleet_dispatch::Error;
use fleet_dispatch::agents::AgentCommand;
use fleet_dispatch::monitoring::CPU;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_concurrent_pollers_keep_series_separate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(create_stats_json(85.0, 50.0, 50.0)))
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..8).map(|i| format!("node-{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let coordinator = Arc::new(coordinator_with(&server, &id_refs, Vec::new()).await);

    for id in &ids {
        coordinator.set_alert_threshold(id, CPU, 80.0).await;
        coordinator.start_monitoring(id, HOUR).await.unwrap();
    }

    let mut tasks = Vec::new();
    for id in ids.clone() {
        let coordinator = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..3 {
                coordinator.poll_now(&id).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for id in &ids {
        assert_eq!(coordinator.get_metrics(id).await.unwrap().len(), 15);
        let alerts = coordinator.get_alerts(id).await.unwrap();
        assert_eq!(alerts.len(), 3);
        assert!(alerts.iter().all(|alert| &alert.agent_id == id));
    }
    assert_eq!(coordinator.get_active_alerts().await.len(), 24);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submissions_get_unique_jobs() {
    let server = MockServer::start().await;
    let coordinator = Arc::new(coordinator_with(&server, &["a1", "a2"], Vec::new()).await);

    let mut tasks = Vec::new();
    for i in 0..40 {
        let coordinator = coordinator.clone();
        let agent = if i % 2 == 0 { "a1" } else { "a2" };
        tasks.push(tokio::spawn(async move {
            coordinator
                .run_on_agent(agent, &AgentCommand::new("echo").arg(i.to_string()))
                .await
                .unwrap()
                .job_id
        }));
    }

    let mut job_ids = HashSet::new();
    for task in tasks {
        assert!(job_ids.insert(task.await.unwrap()));
    }

    assert_eq!(coordinator.queue().pending().await.unwrap(), 40);

    let mut dequeued = HashSet::new();
    while let Some(job) = coordinator.queue().dequeue().await.unwrap() {
        dequeued.insert(job.id);
    }
    assert_eq!(dequeued, job_ids);
}

#[tokio::test]
async fn test_racing_starts_admit_exactly_one_poller() {
    let server = MockServer::start().await;
    let coordinator = Arc::new(coordinator_with(&server, &["a1"], Vec::new()).await);

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let coordinator = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.start_monitoring("a1", HOUR).await
        }));
    }

    let mut started = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => started += 1,
            Err(e) => assert_matches!(e, Error::Conflict(_)),
        }
    }
    assert_eq!(started, 1);

    coordinator.stop_monitoring("a1").await.unwrap();
}
