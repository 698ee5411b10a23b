//! # Citation Reconciliation
//!
//! This crate reconciles a list of bibliographic citations against a local
//! collection of PDF files, then drives a bulk AI extraction job over the
//! matched documents and reassembles the results keyed to the original
//! citation order.
//!
//! The pipeline runs in five stages, each completing before the next:
//!
//! 1.  **Parse** each citation into a normalized token set and a candidate
//!     publication year ([`citation`]).
//! 2.  **Index** the local document collection the same way ([`index`]).
//! 3.  **Match** every citation against the index under a year guardrail,
//!     yielding a matched, ambiguous, or unmatched result per row
//!     ([`matcher`]).
//! 4.  **Extract** via one asynchronous bulk job over the matched documents,
//!     polled to a terminal state with partial failures isolated per row
//!     ([`job`]).
//! 5.  **Assemble** one report row per input citation, in input order
//!     ([`report`]).

pub mod citation;
pub mod documents;
pub mod errors;
pub mod index;
pub mod job;
pub mod matcher;
pub mod prompts;
pub mod providers;
pub mod report;
pub mod types;

pub use errors::BatchError;
pub use job::{BatchJob, JobConfig, JobError, JobOrchestrator, JobOutcome, JobState};
pub use matcher::MatcherConfig;
pub use providers::batch::{BatchService, GeminiBatchProvider, RemoteJobStatus};
pub use types::{
    Citation, DocumentFile, ExtractionOutput, ExtractionRequest, IndexedFile, MatchResult,
    MatchStatus, ReportRow, RowStatus, RunOptions, SourceRow,
};

use crate::citation::parse_citation;
use crate::index::FileIndex;
use crate::job::state::{self, PersistedJob};
use crate::matcher::match_citations;
use crate::report::assemble_report;
use std::path::Path;
use tracing::info;

/// Runs the full pipeline against a batch service and returns the report.
///
/// When a state path is configured, the complete run context (rows, match
/// results, requests) is snapshotted before the job is submitted, so an
/// interrupted run can be finished later with [`resume_reconciliation`].
pub async fn run_reconciliation(
    rows: &[SourceRow],
    documents: &[DocumentFile],
    service: &dyn BatchService,
    options: &RunOptions,
) -> Result<Vec<ReportRow>, JobError> {
    let citations: Vec<Citation> = rows.iter().map(parse_citation).collect();
    let index = FileIndex::build(documents);
    info!(
        "[run_reconciliation] matching {} citations against {} documents",
        citations.len(),
        index.len()
    );
    let matches = match_citations(&citations, &index, &options.matcher);

    let mut job = BatchJob::build(&matches, &options.prompt);
    if let Some(path) = &options.job.state_path {
        let persisted = PersistedJob {
            job_id: None,
            state: job.state,
            created_at: job.created_at,
            source_rows: rows.to_vec(),
            matches: matches.clone(),
            requests: job.requests.clone(),
        };
        state::save_state(path, &persisted)?;
    }

    let orchestrator = JobOrchestrator::new(service, options.job.clone());
    let outcome = orchestrator.run(&mut job).await?;
    info!(
        "[run_reconciliation] job finished in state {:?} with {} outputs",
        outcome.state,
        outcome.outputs.len()
    );

    let row_outputs = outcome.into_row_outputs(&job.requests);
    Ok(assemble_report(rows, &matches, &row_outputs))
}

/// Finishes an interrupted run from its state file and returns the report.
pub async fn resume_reconciliation(
    state_path: &Path,
    service: &dyn BatchService,
    config: JobConfig,
) -> Result<Vec<ReportRow>, JobError> {
    let persisted = state::load_state(state_path)?.ok_or(JobError::NoStateToResume)?;
    let mut job = persisted.to_job();
    info!(
        "[resume_reconciliation] resuming job {:?} from state {:?}",
        job.job_id, job.state
    );

    let config = JobConfig {
        state_path: Some(state_path.to_path_buf()),
        ..config
    };
    let orchestrator = JobOrchestrator::new(service, config);
    let outcome = orchestrator.resume(&mut job).await?;

    let row_outputs = outcome.into_row_outputs(&job.requests);
    Ok(assemble_report(
        &persisted.source_rows,
        &persisted.matches,
        &row_outputs,
    ))
}
