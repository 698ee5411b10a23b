pub mod gemini;

use crate::errors::BatchError;
use crate::types::{ExtractionOutput, ExtractionRequest};
use async_trait::async_trait;
use dyn_clone::DynClone;
pub use gemini::GeminiBatchProvider;
use std::fmt::Debug;

/// The reported state of a remote bulk job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobStatus {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
}

impl RemoteJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// A trait for services that run asynchronous bulk extraction jobs.
///
/// The orchestrator depends only on this contract: submit a set of requests
/// as one job, poll its state, and fetch per-request outputs once the job
/// reports success. Outputs correlate to requests by `request_id` only; the
/// service guarantees neither order nor completeness of the returned set.
#[async_trait]
pub trait BatchService: Send + Sync + Debug + DynClone {
    /// Submits all requests as a single job and returns the remote job id.
    async fn submit(&self, requests: &[ExtractionRequest]) -> Result<String, BatchError>;

    /// Checks the remote state of a previously submitted job.
    async fn poll(&self, job_id: &str) -> Result<RemoteJobStatus, BatchError>;

    /// Downloads the per-request outputs of a job that reported success.
    async fn fetch_outputs(&self, job_id: &str) -> Result<Vec<ExtractionOutput>, BatchError>;
}

dyn_clone::clone_trait_object!(BatchService);
