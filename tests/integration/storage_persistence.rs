//! Job queue persistence on the SQLite store

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use fleet_dispatch::Error;
use fleet_dispatch::queue::sqlite::SqliteQueueStore;
use fleet_dispatch::queue::{Job, JobQueue, JobStatus};
use fleet_dispatch::{Coordinator, config::Config};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn job(id: &str) -> Job {
    Job::new(id, "a1", "uptime", Vec::new(), Duration::from_secs(30))
}

#[tokio::test]
async fn test_jobs_survive_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("queue.db");

    {
        let store = SqliteQueueStore::new(&db_path).await.unwrap();
        let queue = JobQueue::new(Arc::new(store), "persist");
        queue.enqueue(job("j1")).await.unwrap();
        queue.enqueue(job("j2")).await.unwrap();
        queue.enqueue(job("j3")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        queue.complete_job(&first.id, "up 12 days").await.unwrap();
        queue.close().await.unwrap();
    }

    let store = SqliteQueueStore::new(&db_path).await.unwrap();
    let queue = JobQueue::new(Arc::new(store), "persist");

    let completed = queue.get_job("j1").await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(completed.result, "up 12 days");

    assert_eq!(queue.pending().await.unwrap(), 2);
    assert_eq!(queue.dequeue().await.unwrap().unwrap().id, "j2");
    assert_eq!(queue.dequeue().await.unwrap().unwrap().id, "j3");
    assert!(queue.dequeue().await.unwrap().is_none());

    assert_matches!(queue.enqueue(job("j1")).await, Err(Error::Conflict(_)));
    assert_eq!(queue.get_job("j1").await.unwrap().status, JobStatus::Completed);
    assert_eq!(queue.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_prefixes_isolate_queues() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteQueueStore::new(temp_dir.path().join("shared.db")).await.unwrap());

    let staging = JobQueue::new(store.clone(), "staging");
    let production = JobQueue::new(store, "production");

    staging.enqueue(job("s1")).await.unwrap();
    production.enqueue(job("p1")).await.unwrap();
    production.enqueue(job("p2")).await.unwrap();

    assert_eq!(staging.pending().await.unwrap(), 1);
    assert_eq!(production.pending().await.unwrap(), 2);
    assert_eq!(production.dequeue().await.unwrap().unwrap().id, "p1");
    assert!(staging.get_job("p1").await.is_err());
}

#[tokio::test]
async fn test_coordinator_from_sqlite_config() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("coordinator.db");
    let config: Config = serde_json::from_value(serde_json::json!({
        "queue": { "backend": "sqlite", "path": db_path, "prefix": "it" },
        "agents": [{ "id": "a1", "hostname": "127.0.0.1" }],
        "monitoring": { "autostart": false }
    }))
    .unwrap();

    let coordinator = Coordinator::from_config(&config).await.unwrap();
    let submission = coordinator
        .run_on_agent("a1", &fleet_dispatch::agents::AgentCommand::new("uptime"))
        .await
        .unwrap();

    let health = coordinator.queue().health_check().await.unwrap();
    assert!(health.healthy);

    let job = coordinator.get_job(&submission.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    coordinator.shutdown().await.unwrap();
}
