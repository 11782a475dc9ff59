//! Job lifecycle through the coordinator: submit, dequeue, complete / fail

use assert_matches::assert_matches;
use fleet_dispatch::Error;
use fleet_dispatch::agents::AgentCommand;
use fleet_dispatch::queue::JobStatus;
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::MockServer;

use crate::helpers::*;

#[tokio::test]
async fn test_submitted_job_runs_to_completion() {
    let server = MockServer::start().await;
    let coordinator = coordinator_with(&server, &["a1"], Vec::new()).await;

    let command = AgentCommand::new("apt")
        .arg("upgrade")
        .arg("-y")
        .timeout(Duration::from_secs(600));
    let submission = coordinator.run_on_agent("a1", &command).await.unwrap();
    assert_eq!(submission.status, JobStatus::Queued);

    let mut observed = vec![coordinator.get_job(&submission.job_id).await.unwrap().status];

    let job = coordinator.queue().dequeue().await.unwrap().unwrap();
    assert_eq!(job.id, submission.job_id);
    assert_eq!(job.args, vec!["upgrade".to_string(), "-y".to_string()]);
    assert_eq!(job.timeout, Duration::from_secs(600));
    observed.push(coordinator.get_job(&job.id).await.unwrap().status);

    coordinator
        .queue()
        .complete_job(&job.id, "0 upgraded, 0 newly installed")
        .await
        .unwrap();
    let finished = coordinator.get_job(&job.id).await.unwrap();
    observed.push(finished.status);

    assert_eq!(
        observed,
        vec![JobStatus::Queued, JobStatus::Running, JobStatus::Completed]
    );
    assert_eq!(finished.result, "0 upgraded, 0 newly installed");
}

#[tokio::test]
async fn test_failed_job_keeps_error_message() {
    let server = MockServer::start().await;
    let coordinator = coordinator_with(&server, &["a1"], Vec::new()).await;

    let submission = coordinator
        .run_on_agent("a1", &AgentCommand::new("systemctl").arg("restart").arg("nginx"))
        .await
        .unwrap();
    coordinator.queue().dequeue().await.unwrap();

    coordinator
        .queue()
        .fail_job(&submission.job_id, "unit nginx.service not found")
        .await
        .unwrap();

    let job = coordinator.get_job(&submission.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.result, "unit nginx.service not found");

    // terminal
    assert_matches!(
        coordinator.queue().complete_job(&job.id, "late").await,
        Err(Error::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn test_jobs_dequeue_in_submission_order() {
    let server = MockServer::start().await;
    let coordinator = coordinator_with(&server, &["a1", "a2"], Vec::new()).await;

    let mut submitted = Vec::new();
    for (agent, command) in [("a1", "uptime"), ("a2", "df"), ("a1", "free")] {
        let submission = coordinator
            .run_on_agent(agent, &AgentCommand::new(command))
            .await
            .unwrap();
        submitted.push(submission.job_id);
    }

    let mut dequeued = Vec::new();
    while let Some(job) = coordinator.queue().dequeue().await.unwrap() {
        dequeued.push(job.id);
    }

    assert_eq!(dequeued, submitted);
    assert!(coordinator.queue().dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_agent_and_job() {
    let server = MockServer::start().await;
    let coordinator = coordinator_with(&server, &[], Vec::new()).await;

    assert_matches!(
        coordinator.run_on_agent("ghost", &AgentCommand::new("uptime")).await,
        Err(Error::NotFound { kind: "agent", .. })
    );
    assert_matches!(
        coordinator.get_job("ghost-123").await,
        Err(Error::NotFound { kind: "job", .. })
    );
}
