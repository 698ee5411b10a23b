use crate::job::JobConfig;
use crate::matcher::MatcherConfig;
use crate::prompts::DEFAULT_ANALYSIS_PROMPT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use uuid::Uuid;

// --- Source contracts ---

/// A single citation row from the external citation source.
///
/// `row_id` is an opaque, stable identifier (for spreadsheet sources it is the
/// 1-based sheet row number). No contiguity or numeric meaning is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub row_id: String,
    pub raw_text: String,
}

/// A document discovered by the document source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub filename: String,
    pub path: PathBuf,
}

// --- Parsed forms ---

/// A citation after parsing: the raw text plus its normalized token set and
/// any extractable publication year. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub row_id: String,
    pub raw_text: String,
    pub year: Option<i32>,
    pub tokens: BTreeSet<String>,
}

/// A document file after indexing, carrying the same derived fields as a
/// parsed citation so the two sides compare symmetrically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub path: PathBuf,
    pub tokens: BTreeSet<String>,
    pub year: Option<i32>,
}

// --- Matching ---

/// The outcome tier of matching one citation against the file index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Ambiguous,
    Unmatched,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Ambiguous => "ambiguous",
            Self::Unmatched => "unmatched",
        }
    }
}

/// The result of matching a single citation.
///
/// `confidence` is the top candidate's similarity score in `[0, 1]`, reported
/// for every status as a signal. `contenders` lists the top two candidate
/// paths when the result is ambiguous, and is empty otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub row_id: String,
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_path: Option<PathBuf>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contenders: Vec<PathBuf>,
}

// --- Bulk extraction ---

/// One unit of work submitted to the batch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub request_id: String,
    pub row_id: String,
    pub attached_path: PathBuf,
    pub prompt: String,
}

impl ExtractionRequest {
    /// Builds a request for one matched citation. The request id is derived
    /// deterministically from the row id so resubmission of the same row
    /// yields the same id.
    pub fn new(row_id: &str, attached_path: PathBuf, prompt: &str) -> Self {
        let request_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, row_id.as_bytes()).to_string();
        Self {
            request_id,
            row_id: row_id.to_string(),
            attached_path,
            prompt: prompt.to_string(),
        }
    }
}

/// One result returned (or synthesized) for a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub request_id: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ExtractionOutput {
    /// A synthesized failure for a request the service returned nothing for.
    pub fn failed(request_id: &str, detail: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            succeeded: false,
            extracted_text: None,
            error_detail: Some(detail.to_string()),
        }
    }
}

// --- Final report ---

/// The per-row outcome tier, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Unmatched,
    Ambiguous,
    ExtractionFailed,
    Extracted,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Ambiguous => "ambiguous",
            Self::ExtractionFailed => "extraction_failed",
            Self::Extracted => "extracted",
        }
    }
}

/// One row of the final report. Exactly one per input citation, emitted in
/// original row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub row_id: String,
    pub raw_text: String,
    pub status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_path: Option<PathBuf>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// --- Run configuration ---

/// Options for a full reconciliation run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub matcher: MatcherConfig,
    pub job: JobConfig,
    pub prompt: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            job: JobConfig::default(),
            prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
        }
    }
}
