//! Alert delivery through notifiers

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use fleet_dispatch::alerts::webhook::WebhookNotifier;
use fleet_dispatch::alerts::{Alert, AlertManager, Notifier};
use fleet_dispatch::monitoring::CPU;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_breach_reaches_webhook() {
    let agent_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(create_stats_json(92.0, 10.0, 10.0)))
        .mount(&agent_server)
        .await;

    let hook_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({
            "agent": "a1",
            "message": "cpu exceeded threshold (92.00 > 80.00)"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&hook_server)
        .await;

    let (recorder, mut received) = RecordingNotifier::new();
    let recorder: Arc<dyn Notifier> = recorder;
    let webhook: Arc<dyn Notifier> =
        Arc::new(WebhookNotifier::new(format!("{}/alerts", hook_server.uri())));
    let coordinator = coordinator_with(&agent_server, &["a1"], vec![webhook, recorder]).await;

    coordinator.set_alert_threshold("a1", CPU, 80.0).await;
    coordinator.start_monitoring("a1", HOUR).await.unwrap();
    coordinator.poll_now("a1").await.unwrap();

    // the recorder runs alongside the webhook delivery
    let alert = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.metric, CPU);

    // let the webhook task finish before the mock verifies on drop
    tokio::time::timeout(Duration::from_secs(5), async {
        while hook_server.received_requests().await.unwrap_or_default().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_failing_and_stuck_notifiers_do_not_block_others() {
    let broken = Arc::new(BrokenNotifier::default());
    let (recorder, mut received) = RecordingNotifier::new();
    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(StuckNotifier), broken.clone(), recorder];
    let manager = AlertManager::new(notifiers);

    let alert = Alert::breach("a1", "disk", 99.0, 90.0, chrono::Utc::now());

    // returns without waiting for the stuck notifier
    let handles = tokio::time::timeout(Duration::from_secs(1), manager.add_alert(alert.clone()))
        .await
        .unwrap();
    assert_eq!(handles.len(), 3);

    let delivered = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.id, alert.id);

    let mut handles = handles.into_iter();
    let stuck = handles.next().unwrap();
    assert!(!stuck.is_finished());
    stuck.abort();

    handles.next().unwrap().await.unwrap();
    assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);

    // stored regardless of delivery outcome
    assert_eq!(manager.get_active_alerts().await, vec![alert]);
}

#[tokio::test]
async fn test_failed_delivery_is_not_retried() {
    let broken = Arc::new(BrokenNotifier::default());
    let notifiers: Vec<Arc<dyn Notifier>> = vec![broken.clone()];
    let manager = AlertManager::new(notifiers);

    let handles = manager
        .add_alert(Alert::breach("a1", "cpu", 95.0, 80.0, chrono::Utc::now()))
        .await;
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
}
