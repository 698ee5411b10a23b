//! # Job Orchestration
//!
//! The lifecycle manager for one bulk extraction job. A job moves through
//! `Built -> Submitted -> Polling` and ends in exactly one of `Completed`,
//! `Failed`, or `TimedOut`; a job with nothing to submit completes directly
//! from `Built`. Submission failure is the only orchestration error that is
//! fatal to the caller. A failed or timed-out job is an ordinary outcome: it
//! is returned `Ok` with every request synthesized as an individual failure,
//! so the final report still covers every row.

pub mod state;

use crate::errors::BatchError;
use crate::providers::batch::{BatchService, RemoteJobStatus};
use crate::types::{ExtractionOutput, ExtractionRequest, MatchResult, MatchStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state::StateError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Errors that abort a run. Everything else (failed extractions, a failed or
/// expired remote job, transient poll errors) is reported per row instead.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job submission failed: {0}")]
    Submit(#[source] BatchError),
    #[error("Job state persistence failed: {0}")]
    State(#[from] StateError),
    #[error("Job has no remote id to resume from")]
    MissingJobId,
    #[error("No state file found to resume from")]
    NoStateToResume,
}

/// Lifecycle states of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Built,
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    /// Whether `self -> next` is a legal transition. `Built -> Completed` is
    /// the empty-request shortcut.
    pub fn can_transition(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Built, Submitted)
                | (Built, Completed)
                | (Submitted, Polling)
                | (Polling, Completed)
                | (Polling, Failed)
                | (Polling, TimedOut)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// One bulk extraction job. Mutated only through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: Option<String>,
    pub state: JobState,
    pub requests: Vec<ExtractionRequest>,
    pub created_at: DateTime<Utc>,
}

impl BatchJob {
    /// Builds a job from match results: one request per `Matched` citation,
    /// in input order. Ambiguous and unmatched citations never generate a
    /// request.
    pub fn build(matches: &[MatchResult], prompt: &str) -> Self {
        let requests = matches
            .iter()
            .filter(|m| m.status == MatchStatus::Matched)
            .filter_map(|m| {
                m.matched_path
                    .as_ref()
                    .map(|path| ExtractionRequest::new(&m.row_id, path.clone(), prompt))
            })
            .collect();
        Self {
            job_id: None,
            state: JobState::Built,
            requests,
            created_at: Utc::now(),
        }
    }
}

/// Polling and persistence knobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Delay before the second poll; doubles on each subsequent poll.
    pub poll_initial_interval: Duration,
    /// Ceiling for the backoff between polls.
    pub poll_max_interval: Duration,
    /// Hard wall-clock ceiling for the whole job, independent of whatever
    /// deadline the remote service applies on its side.
    pub poll_timeout: Duration,
    /// Where to snapshot the run for `resume`. `None` disables persistence.
    pub state_path: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_initial_interval: Duration::from_secs(5),
            poll_max_interval: Duration::from_secs(120),
            poll_timeout: Duration::from_secs(3600),
            state_path: None,
        }
    }
}

/// The terminal result of a job: its final state plus exactly one output per
/// submitted request, keyed by `request_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub state: JobState,
    pub outputs: BTreeMap<String, ExtractionOutput>,
}

impl JobOutcome {
    fn empty(state: JobState) -> Self {
        Self {
            state,
            outputs: BTreeMap::new(),
        }
    }

    /// An outcome where every request failed with the same detail, used for
    /// job-level failure and timeout.
    fn all_failed(requests: &[ExtractionRequest], state: JobState, detail: &str) -> Self {
        let outputs = requests
            .iter()
            .map(|r| {
                (
                    r.request_id.clone(),
                    ExtractionOutput::failed(&r.request_id, detail),
                )
            })
            .collect();
        Self { state, outputs }
    }

    /// Correlates fetched outputs to submitted requests by request id. Every
    /// request ends up with exactly one output: requests the service said
    /// nothing about get a synthesized failure, and outputs for unknown ids
    /// are dropped with a warning.
    fn correlate(
        requests: &[ExtractionRequest],
        fetched: Vec<ExtractionOutput>,
        state: JobState,
    ) -> Self {
        let mut by_id: BTreeMap<String, ExtractionOutput> = fetched
            .into_iter()
            .map(|output| (output.request_id.clone(), output))
            .collect();

        let mut outputs = BTreeMap::new();
        for request in requests {
            let output = by_id.remove(&request.request_id).unwrap_or_else(|| {
                warn!(
                    "[correlate] no output for request '{}' (row {})",
                    request.request_id, request.row_id
                );
                ExtractionOutput::failed(
                    &request.request_id,
                    "service returned no output for this request",
                )
            });
            outputs.insert(request.request_id.clone(), output);
        }
        for orphan_id in by_id.into_keys() {
            warn!("[correlate] dropping output for unknown request '{orphan_id}'");
        }
        Self { state, outputs }
    }

    /// Re-keys the outputs by originating row id.
    pub fn into_row_outputs(
        mut self,
        requests: &[ExtractionRequest],
    ) -> BTreeMap<String, ExtractionOutput> {
        let mut by_row = BTreeMap::new();
        for request in requests {
            if let Some(output) = self.outputs.remove(&request.request_id) {
                by_row.insert(request.row_id.clone(), output);
            }
        }
        by_row
    }
}

/// Drives one job to a terminal state against a [`BatchService`].
pub struct JobOrchestrator<'a> {
    service: &'a dyn BatchService,
    config: JobConfig,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(service: &'a dyn BatchService, config: JobConfig) -> Self {
        Self { service, config }
    }

    /// Runs a freshly built job: persist, submit, poll to a terminal state.
    ///
    /// The job is snapshotted before submission and the remote id is recorded
    /// as soon as it is known, so an interrupted run resumes by id instead of
    /// submitting twice.
    pub async fn run(&self, job: &mut BatchJob) -> Result<JobOutcome, JobError> {
        if job.requests.is_empty() {
            info!("[run] nothing to submit; completing immediately");
            self.advance(job, JobState::Completed)?;
            return Ok(JobOutcome::empty(job.state));
        }

        self.persist(job)?;

        let job_id = self
            .service
            .submit(&job.requests)
            .await
            .map_err(JobError::Submit)?;
        info!(
            "[run] submitted batch job '{}' with {} requests",
            job_id,
            job.requests.len()
        );
        job.job_id = Some(job_id);
        self.advance(job, JobState::Submitted)?;
        self.advance(job, JobState::Polling)?;
        self.poll_until_terminal(job).await
    }

    /// Resumes a previously persisted job from whatever state it was left in.
    ///
    /// A job that never reached submission is simply run; a submitted job is
    /// polled by its recorded id; a job that already reached a terminal state
    /// has its outputs re-fetched (or re-synthesized) without touching the
    /// remote service's job list.
    pub async fn resume(&self, job: &mut BatchJob) -> Result<JobOutcome, JobError> {
        match job.state {
            JobState::Built => self.run(job).await,
            JobState::Submitted | JobState::Polling => {
                if job.job_id.is_none() {
                    return Err(JobError::MissingJobId);
                }
                if job.state == JobState::Submitted {
                    self.advance(job, JobState::Polling)?;
                }
                self.poll_until_terminal(job).await
            }
            JobState::Completed => match job.job_id.clone() {
                // The empty-request shortcut never had a remote job.
                None => Ok(JobOutcome::empty(JobState::Completed)),
                Some(job_id) => {
                    let deadline = Instant::now() + self.config.poll_timeout;
                    match self.fetch_with_retry(&job_id, deadline).await {
                        Some(outputs) => {
                            Ok(JobOutcome::correlate(&job.requests, outputs, job.state))
                        }
                        None => Ok(JobOutcome::all_failed(
                            &job.requests,
                            job.state,
                            "completed job outputs could not be re-fetched",
                        )),
                    }
                }
            },
            JobState::Failed => Ok(JobOutcome::all_failed(
                &job.requests,
                job.state,
                "batch job previously ended in failure",
            )),
            JobState::TimedOut => Ok(JobOutcome::all_failed(
                &job.requests,
                job.state,
                "batch job previously timed out",
            )),
        }
    }

    /// Polls a submitted job until it reaches a terminal state or the local
    /// ceiling expires. Poll failures are transient: logged and retried on
    /// the same backoff schedule.
    async fn poll_until_terminal(&self, job: &mut BatchJob) -> Result<JobOutcome, JobError> {
        let job_id = job.job_id.clone().ok_or(JobError::MissingJobId)?;
        let deadline = Instant::now() + self.config.poll_timeout;
        let mut interval = self.config.poll_initial_interval;

        loop {
            if Instant::now() >= deadline {
                warn!(
                    "[poll] job '{}' still not terminal after {:?}; giving up",
                    job_id, self.config.poll_timeout
                );
                self.advance(job, JobState::TimedOut)?;
                return Ok(JobOutcome::all_failed(
                    &job.requests,
                    job.state,
                    "polling ceiling exceeded before the batch job finished",
                ));
            }

            match self.service.poll(&job_id).await {
                Ok(RemoteJobStatus::Succeeded) => {
                    info!("[poll] job '{}' succeeded; fetching outputs", job_id);
                    return match self.fetch_with_retry(&job_id, deadline).await {
                        Some(outputs) => {
                            self.advance(job, JobState::Completed)?;
                            Ok(JobOutcome::correlate(&job.requests, outputs, job.state))
                        }
                        None => {
                            self.advance(job, JobState::TimedOut)?;
                            Ok(JobOutcome::all_failed(
                                &job.requests,
                                job.state,
                                "job succeeded but outputs could not be fetched in time",
                            ))
                        }
                    };
                }
                Ok(RemoteJobStatus::Failed { message }) => {
                    warn!("[poll] job '{}' failed remotely: {}", job_id, message);
                    self.advance(job, JobState::Failed)?;
                    return Ok(JobOutcome::all_failed(
                        &job.requests,
                        job.state,
                        &format!("batch job failed: {message}"),
                    ));
                }
                Ok(status) => {
                    debug!("[poll] job '{}' is {:?}", job_id, status);
                }
                Err(e) => {
                    warn!("[poll] transient failure for job '{}': {}", job_id, e);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(interval.min(remaining)).await;
            interval = (interval * 2).min(self.config.poll_max_interval);
        }
    }

    /// Fetches outputs, retrying transient errors on the backoff schedule
    /// until the deadline. `None` means the deadline expired first.
    async fn fetch_with_retry(
        &self,
        job_id: &str,
        deadline: Instant,
    ) -> Option<Vec<ExtractionOutput>> {
        let mut interval = self.config.poll_initial_interval;
        loop {
            match self.service.fetch_outputs(job_id).await {
                Ok(outputs) => return Some(outputs),
                Err(e) => {
                    warn!("[fetch] transient failure for job '{}': {}", job_id, e);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(interval.min(remaining)).await;
            interval = (interval * 2).min(self.config.poll_max_interval);
        }
    }

    /// Applies a transition and snapshots the new state.
    fn advance(&self, job: &mut BatchJob, next: JobState) -> Result<(), JobError> {
        debug_assert!(
            job.state.can_transition(next),
            "illegal job transition {:?} -> {:?}",
            job.state,
            next
        );
        debug!("[job] {:?} -> {:?}", job.state, next);
        job.state = next;
        self.persist(job)
    }

    fn persist(&self, job: &BatchJob) -> Result<(), JobError> {
        if let Some(path) = &self.config.state_path {
            state::record_job(path, job)?;
        }
        Ok(())
    }
}
