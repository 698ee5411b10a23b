//! # Job Orchestrator Tests
//!
//! This test suite drives the batch job lifecycle against a scripted mock
//! service under a paused tokio clock, so backoff schedules and timeouts are
//! asserted exactly and the suite runs in milliseconds of real time.

use anyhow::Result;
use chrono::Utc;
use citerec::errors::BatchError;
use citerec::job::state::load_state;
use citerec::job::{BatchJob, JobConfig, JobError, JobOrchestrator, JobState};
use citerec::providers::batch::RemoteJobStatus;
use citerec::types::{ExtractionOutput, ExtractionRequest, MatchResult, MatchStatus};
use citerec_test_utils::{setup_tracing, MockBatchService};
use std::path::PathBuf;
use std::time::Duration;

// --- Helpers ---

fn matched(row_id: &str, path: &str) -> MatchResult {
    MatchResult {
        row_id: row_id.to_string(),
        status: MatchStatus::Matched,
        matched_path: Some(PathBuf::from(path)),
        confidence: 0.9,
        contenders: Vec::new(),
    }
}

fn unmatched(row_id: &str) -> MatchResult {
    MatchResult {
        row_id: row_id.to_string(),
        status: MatchStatus::Unmatched,
        matched_path: None,
        confidence: 0.1,
        contenders: Vec::new(),
    }
}

fn succeeded_output(request_id: &str, text: &str) -> ExtractionOutput {
    ExtractionOutput {
        request_id: request_id.to_string(),
        succeeded: true,
        extracted_text: Some(text.to_string()),
        error_detail: None,
    }
}

/// A config with short, round intervals for exact schedule assertions.
fn fast_config() -> JobConfig {
    JobConfig {
        poll_initial_interval: Duration::from_secs(5),
        poll_max_interval: Duration::from_secs(20),
        poll_timeout: Duration::from_secs(100),
        state_path: None,
    }
}

// --- Tests for `BatchJob::build` ---

/// Verifies that only matched citations generate requests, in input order,
/// and that request ids are stable across rebuilds.
#[test]
fn test_build_requests_only_for_matched_rows() {
    let matches = vec![
        matched("2", "/library/smith.pdf"),
        unmatched("3"),
        matched("5", "/library/chen.pdf"),
    ];

    let job = BatchJob::build(&matches, "Analyze this paper.");
    let rebuilt = BatchJob::build(&matches, "Analyze this paper.");

    assert_eq!(job.state, JobState::Built);
    assert_eq!(job.job_id, None);
    let rows: Vec<&str> = job.requests.iter().map(|r| r.row_id.as_str()).collect();
    assert_eq!(rows, vec!["2", "5"]);
    assert_eq!(job.requests[0].request_id, rebuilt.requests[0].request_id);
}

// --- Tests for `JobState` ---

/// Verifies the legal transition edges, including the empty-job shortcut, and
/// that terminal states accept no further transitions.
#[test]
fn test_job_state_transitions() {
    use JobState::*;

    assert!(Built.can_transition(Submitted));
    assert!(Built.can_transition(Completed));
    assert!(Submitted.can_transition(Polling));
    assert!(Polling.can_transition(Completed));
    assert!(Polling.can_transition(Failed));
    assert!(Polling.can_transition(TimedOut));

    assert!(!Built.can_transition(Polling));
    assert!(!Completed.can_transition(Polling));
    assert!(!Failed.can_transition(Submitted));
    assert!(!TimedOut.can_transition(Completed));

    assert!(Completed.is_terminal());
    assert!(Failed.is_terminal());
    assert!(TimedOut.is_terminal());
    assert!(!Polling.is_terminal());
}

// --- Tests for `JobOrchestrator::run` ---

/// Verifies that a job with no requests completes immediately and never
/// touches the remote service.
#[tokio::test(start_paused = true)]
async fn test_empty_job_completes_without_submission() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![unmatched("3"), unmatched("4")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Completed);
    assert!(outcome.outputs.is_empty());
    assert_eq!(job.state, JobState::Completed);
    assert!(service.submitted_requests().is_empty());
    assert!(service.poll_instants().is_empty());
    Ok(())
}

/// Verifies the full happy path: submit, poll through intermediate states,
/// fetch, and correlate, with a missing output synthesized as a failure so
/// every request is accounted for.
#[tokio::test(start_paused = true)]
async fn test_run_polls_to_completion_and_correlates() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![
        matched("2", "/library/smith.pdf"),
        matched("3", "/library/jones.pdf"),
        matched("4", "/library/chen.pdf"),
    ];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    let ids: Vec<String> = job.requests.iter().map(|r| r.request_id.clone()).collect();

    service.push_poll(RemoteJobStatus::Pending);
    service.push_poll(RemoteJobStatus::Running);
    service.push_poll(RemoteJobStatus::Succeeded);
    // The service answers for two of the three requests; the third is lost.
    service.push_fetch(vec![
        succeeded_output(&ids[0], r#"{"methodology": "Survey"}"#),
        ExtractionOutput::failed(&ids[1], "attachment exceeded the size limit"),
    ]);

    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(job.job_id.as_deref(), Some("batches/mock-job-1"));
    assert_eq!(service.submitted_requests().len(), 1);
    assert_eq!(outcome.outputs.len(), 3);

    assert!(outcome.outputs[&ids[0]].succeeded);
    assert!(!outcome.outputs[&ids[1]].succeeded);
    assert_eq!(
        outcome.outputs[&ids[2]].error_detail.as_deref(),
        Some("service returned no output for this request")
    );

    // Re-keying by row id covers every submitted row.
    let by_row = outcome.into_row_outputs(&job.requests);
    let rows: Vec<&str> = by_row.keys().map(String::as_str).collect();
    assert_eq!(rows, vec!["2", "3", "4"]);
    Ok(())
}

/// Verifies that a remote job failure is an ordinary outcome: the run returns
/// `Ok`, the job lands in `Failed`, and every request carries the job-level
/// failure detail.
#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_an_outcome_not_an_error() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    service.push_poll(RemoteJobStatus::Failed {
        message: "batch quota exhausted".to_string(),
    });
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(job.state, JobState::Failed);
    let output = &outcome.outputs[&job.requests[0].request_id];
    assert!(!output.succeeded);
    assert_eq!(
        output.error_detail.as_deref(),
        Some("batch job failed: batch quota exhausted")
    );
    Ok(())
}

/// Verifies the backoff schedule and the local ceiling: polls run at
/// doubling intervals capped at the maximum, and once the ceiling passes the
/// job times out with every request synthesized as failed.
#[tokio::test(start_paused = true)]
async fn test_polling_times_out_with_capped_backoff() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    // No scripted polls: the job reports `Running` forever.
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::TimedOut);
    assert_eq!(job.state, JobState::TimedOut);
    assert_eq!(
        outcome.outputs[&job.requests[0].request_id]
            .error_detail
            .as_deref(),
        Some("polling ceiling exceeded before the batch job finished")
    );

    // With a 100s ceiling, 5s initial interval, and 20s cap, polls land at
    // t = 0, 5, 15, 35, 55, 75, 95.
    let instants = service.poll_instants();
    assert_eq!(instants.len(), 7);
    let deltas: Vec<Duration> = instants.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        deltas,
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(20),
            Duration::from_secs(20),
            Duration::from_secs(20),
        ]
    );
    Ok(())
}

/// Verifies that transient poll errors are retried on the same schedule
/// rather than failing the job.
#[tokio::test(start_paused = true)]
async fn test_transient_poll_errors_are_retried() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    let request_id = job.requests[0].request_id.clone();

    service.push_poll_error("upstream returned 502");
    service.push_poll_error("upstream returned 503");
    service.push_poll(RemoteJobStatus::Succeeded);
    service.push_fetch(vec![succeeded_output(&request_id, "ok")]);

    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(service.poll_instants().len(), 3);
    assert!(outcome.outputs[&request_id].succeeded);
    Ok(())
}

/// Verifies that submission failure is the one fatal path: the run errors
/// and the job never leaves `Built`.
#[tokio::test(start_paused = true)]
async fn test_submit_failure_is_fatal() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    service.fail_submit("project quota exceeded");
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let result = orchestrator.run(&mut job).await;

    // --- Assert ---
    assert!(matches!(
        result.unwrap_err(),
        JobError::Submit(BatchError::Api(_))
    ));
    assert_eq!(job.state, JobState::Built);
    Ok(())
}

/// Verifies that a transient fetch error after remote success is retried and
/// the job still completes.
#[tokio::test(start_paused = true)]
async fn test_fetch_retries_after_transient_error() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    let request_id = job.requests[0].request_id.clone();

    service.push_poll(RemoteJobStatus::Succeeded);
    service.push_fetch_error("storage briefly unavailable");
    service.push_fetch(vec![succeeded_output(&request_id, "ok")]);

    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Completed);
    assert!(outcome.outputs[&request_id].succeeded);
    Ok(())
}

/// Verifies that a job whose outputs never become fetchable times out once
/// the ceiling passes instead of retrying forever.
#[tokio::test(start_paused = true)]
async fn test_unfetchable_outputs_time_out() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    service.push_poll(RemoteJobStatus::Succeeded);
    for _ in 0..8 {
        service.push_fetch_error("result store unavailable");
    }
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.run(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::TimedOut);
    assert_eq!(job.state, JobState::TimedOut);
    assert_eq!(
        outcome.outputs[&job.requests[0].request_id]
            .error_detail
            .as_deref(),
        Some("job succeeded but outputs could not be fetched in time")
    );
    Ok(())
}

// --- Tests for persistence and `JobOrchestrator::resume` ---

/// Verifies that a run with a state path snapshots the remote id and final
/// state to disk.
#[tokio::test(start_paused = true)]
async fn test_run_snapshots_state_for_resume() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("state.json");
    let service = MockBatchService::new();
    let matches = vec![matched("2", "/library/smith.pdf")];
    let mut job = BatchJob::build(&matches, "Analyze this paper.");
    let request_id = job.requests[0].request_id.clone();

    service.push_poll(RemoteJobStatus::Succeeded);
    service.push_fetch(vec![succeeded_output(&request_id, "ok")]);

    let config = JobConfig {
        state_path: Some(state_path.clone()),
        ..fast_config()
    };
    let orchestrator = JobOrchestrator::new(&service, config);

    // --- Act ---
    orchestrator.run(&mut job).await?;

    // --- Assert ---
    let persisted = load_state(&state_path)?.expect("state file should exist");
    assert_eq!(persisted.state, JobState::Completed);
    assert_eq!(persisted.job_id.as_deref(), Some("batches/mock-job-1"));
    assert_eq!(persisted.requests.len(), 1);
    Ok(())
}

/// Verifies that resuming a job that was already submitted polls by the
/// recorded id and never submits again.
#[tokio::test(start_paused = true)]
async fn test_resume_submitted_job_skips_submission() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let request = ExtractionRequest::new("2", PathBuf::from("/library/smith.pdf"), "Analyze");
    let request_id = request.request_id.clone();
    let mut job = BatchJob {
        job_id: Some("batches/previous-7".to_string()),
        state: JobState::Polling,
        requests: vec![request],
        created_at: Utc::now(),
    };

    service.push_poll(RemoteJobStatus::Succeeded);
    service.push_fetch(vec![succeeded_output(&request_id, "ok")]);

    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.resume(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Completed);
    assert!(service.submitted_requests().is_empty());
    assert!(outcome.outputs[&request_id].succeeded);
    Ok(())
}

/// Verifies that a submitted job without a recorded remote id cannot be
/// resumed.
#[tokio::test(start_paused = true)]
async fn test_resume_without_job_id_is_rejected() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let mut job = BatchJob {
        job_id: None,
        state: JobState::Polling,
        requests: vec![ExtractionRequest::new(
            "2",
            PathBuf::from("/library/smith.pdf"),
            "Analyze",
        )],
        created_at: Utc::now(),
    };
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let result = orchestrator.resume(&mut job).await;

    // --- Assert ---
    assert!(matches!(result.unwrap_err(), JobError::MissingJobId));
    Ok(())
}

/// Verifies that resuming a job that previously failed reports the stored
/// terminal state without touching the service.
#[tokio::test(start_paused = true)]
async fn test_resume_failed_job_reports_outcome() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let request = ExtractionRequest::new("2", PathBuf::from("/library/smith.pdf"), "Analyze");
    let request_id = request.request_id.clone();
    let mut job = BatchJob {
        job_id: Some("batches/previous-7".to_string()),
        state: JobState::Failed,
        requests: vec![request],
        created_at: Utc::now(),
    };
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.resume(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(
        outcome.outputs[&request_id].error_detail.as_deref(),
        Some("batch job previously ended in failure")
    );
    assert!(service.poll_instants().is_empty());
    Ok(())
}

/// Verifies that resuming a completed empty job (the shortcut path) yields an
/// empty outcome without any service traffic.
#[tokio::test(start_paused = true)]
async fn test_resume_completed_empty_job() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let service = MockBatchService::new();
    let mut job = BatchJob {
        job_id: None,
        state: JobState::Completed,
        requests: Vec::new(),
        created_at: Utc::now(),
    };
    let orchestrator = JobOrchestrator::new(&service, fast_config());

    // --- Act ---
    let outcome = orchestrator.resume(&mut job).await?;

    // --- Assert ---
    assert_eq!(outcome.state, JobState::Completed);
    assert!(outcome.outputs.is_empty());
    assert!(service.submitted_requests().is_empty());
    assert!(service.poll_instants().is_empty());
    Ok(())
}
