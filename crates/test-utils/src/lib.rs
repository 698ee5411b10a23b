//! # Shared Test Utilities
//!
//! Mock batch service, temp document fixtures, and tracing setup used by the
//! integration tests across the workspace.

use anyhow::Result;
use async_trait::async_trait;
use citerec::errors::BatchError;
use citerec::providers::batch::{BatchService, RemoteJobStatus};
use citerec::types::{ExtractionOutput, ExtractionRequest};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;
use tokio::time::Instant;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads `.env` once per test binary.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
        tracing_subscriber::fmt::init();
    });
}

// --- Mock Batch Service ---

/// A scripted [`BatchService`] for orchestrator tests.
///
/// Poll and fetch behavior is scripted call by call; once a script runs out,
/// `poll` keeps reporting `Running` and `fetch_outputs` returns an empty set.
/// Every submission is recorded, and every poll records the instant it was
/// made so backoff schedules can be asserted under a paused clock.
#[derive(Clone, Debug, Default)]
pub struct MockBatchService {
    submit_error: Arc<Mutex<Option<String>>>,
    poll_script: Arc<Mutex<Vec<Result<RemoteJobStatus, String>>>>,
    fetch_script: Arc<Mutex<Vec<Result<Vec<ExtractionOutput>, String>>>>,
    submitted: Arc<Mutex<Vec<Vec<ExtractionRequest>>>>,
    poll_instants: Arc<Mutex<Vec<Instant>>>,
}

impl MockBatchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `submit` call fail with an API error.
    pub fn fail_submit(&self, message: &str) {
        *self.submit_error.lock().unwrap() = Some(message.to_string());
    }

    /// Appends one scripted `poll` response.
    pub fn push_poll(&self, status: RemoteJobStatus) {
        self.poll_script.lock().unwrap().push(Ok(status));
    }

    /// Appends one scripted `poll` failure.
    pub fn push_poll_error(&self, message: &str) {
        self.poll_script
            .lock()
            .unwrap()
            .push(Err(message.to_string()));
    }

    /// Appends one scripted `fetch_outputs` response.
    pub fn push_fetch(&self, outputs: Vec<ExtractionOutput>) {
        self.fetch_script.lock().unwrap().push(Ok(outputs));
    }

    /// Appends one scripted `fetch_outputs` failure.
    pub fn push_fetch_error(&self, message: &str) {
        self.fetch_script
            .lock()
            .unwrap()
            .push(Err(message.to_string()));
    }

    /// The request sets passed to `submit`, in call order.
    pub fn submitted_requests(&self) -> Vec<Vec<ExtractionRequest>> {
        self.submitted.lock().unwrap().clone()
    }

    /// The instants at which `poll` was called, in call order.
    pub fn poll_instants(&self) -> Vec<Instant> {
        self.poll_instants.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchService for MockBatchService {
    async fn submit(&self, requests: &[ExtractionRequest]) -> Result<String, BatchError> {
        self.submitted.lock().unwrap().push(requests.to_vec());
        if let Some(message) = self.submit_error.lock().unwrap().clone() {
            return Err(BatchError::Api(message));
        }
        Ok("batches/mock-job-1".to_string())
    }

    async fn poll(&self, _job_id: &str) -> Result<RemoteJobStatus, BatchError> {
        self.poll_instants.lock().unwrap().push(Instant::now());
        let next = {
            let mut script = self.poll_script.lock().unwrap();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(BatchError::Api(message)),
            None => Ok(RemoteJobStatus::Running),
        }
    }

    async fn fetch_outputs(&self, _job_id: &str) -> Result<Vec<ExtractionOutput>, BatchError> {
        let next = {
            let mut script = self.fetch_script.lock().unwrap();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };
        match next {
            Some(Ok(outputs)) => Ok(outputs),
            Some(Err(message)) => Err(BatchError::Api(message)),
            None => Ok(Vec::new()),
        }
    }
}

// --- Temp Document Fixtures ---

/// A temporary folder holding one placeholder PDF per given filename.
///
/// The files carry a PDF header but no real content; the pipeline treats
/// attachments as opaque bytes, so nothing more is needed.
pub struct TempLibrary {
    dir: TempDir,
}

impl TempLibrary {
    pub fn new(filenames: &[&str]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        for name in filenames {
            std::fs::write(dir.path().join(name), b"%PDF-1.4\n%placeholder\n")?;
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
