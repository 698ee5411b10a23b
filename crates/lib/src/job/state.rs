//! # Resumability State
//!
//! Handles reading and writing the on-disk snapshot of a run. The snapshot is
//! written before submission and updated on every job state transition, so an
//! interrupted run can be picked up by job id instead of resubmitting. Beyond
//! the job identity it carries the source rows and match results, which lets
//! a resumed run emit the complete report without re-reading the citation
//! source.

use crate::job::{BatchJob, JobState};
use crate::types::{ExtractionRequest, MatchResult, SourceRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use thiserror::Error;
use tracing::info;

/// Errors from the state file itself.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("State file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The structure of the state file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PersistedJob {
    pub job_id: Option<String>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub source_rows: Vec<SourceRow>,
    pub matches: Vec<MatchResult>,
    pub requests: Vec<ExtractionRequest>,
}

impl PersistedJob {
    /// A snapshot of the job alone, with no pipeline context attached.
    pub fn from_job(job: &BatchJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            state: job.state,
            created_at: job.created_at,
            source_rows: Vec::new(),
            matches: Vec::new(),
            requests: job.requests.clone(),
        }
    }

    /// Rebuilds the in-memory job from a loaded snapshot.
    pub fn to_job(&self) -> BatchJob {
        BatchJob {
            job_id: self.job_id.clone(),
            state: self.state,
            requests: self.requests.clone(),
            created_at: self.created_at,
        }
    }
}

/// Reads a persisted run. Returns `Ok(None)` when the file does not exist.
pub fn load_state(path: &Path) -> Result<Option<PersistedJob>, StateError> {
    if !path.exists() {
        info!("State file '{}' not found.", path.display());
        return Ok(None);
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let persisted: PersistedJob = serde_json::from_reader(reader)?;
    info!(
        "Loaded state from '{}' (job {:?}, state {:?}).",
        path.display(),
        persisted.job_id,
        persisted.state
    );
    Ok(Some(persisted))
}

/// Writes a persisted run, replacing any previous snapshot.
pub fn save_state(path: &Path, persisted: &PersistedJob) -> Result<(), StateError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, persisted)?;
    info!(
        "Saved state to '{}' (job {:?}, state {:?}).",
        path.display(),
        persisted.job_id,
        persisted.state
    );
    Ok(())
}

/// Updates the job fields of the snapshot, preserving any pipeline context
/// already on disk. An unreadable existing file is replaced, not propagated.
pub fn record_job(path: &Path, job: &BatchJob) -> Result<(), StateError> {
    let mut persisted = load_state(path)
        .ok()
        .flatten()
        .unwrap_or_else(|| PersistedJob::from_job(job));
    persisted.job_id = job.job_id.clone();
    persisted.state = job.state;
    persisted.created_at = job.created_at;
    persisted.requests = job.requests.clone();
    save_state(path, &persisted)
}
