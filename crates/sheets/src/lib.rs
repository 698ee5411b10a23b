//! # `citerec-sheets`: Citation Source Plugin
//!
//! This crate reads citation rows for the `citerec` pipeline from a Google
//! Sheet (via its CSV export endpoint) or from a local CSV file. Rows are
//! addressed in sheet coordinates: the header occupies row 1, so the first
//! data row is row 2, and that number becomes the row's stable `row_id`.

use citerec::types::SourceRow;
use regex::Regex;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

// --- Error Definitions ---

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Invalid Google Sheet URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to fetch sheet: {0}")]
    Fetch(String),
    #[error("Failed to parse sheet CSV: {0}")]
    Parse(#[from] csv::Error),
    #[error("Failed to read CSV file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing required column: '{0}'")]
    MissingColumn(String),
    #[error("Invalid row selection: {0}")]
    InvalidSelection(String),
    #[error("No usable citation rows were found")]
    NoData,
}

impl From<reqwest::Error> for SheetError {
    fn from(err: reqwest::Error) -> Self {
        SheetError::Fetch(err.to_string())
    }
}

// --- Row Selection ---

/// Which data rows to read, counted in sheet coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RowSelection {
    #[default]
    All,
    /// An inclusive range of sheet row numbers, e.g. rows 5 through 10.
    Range { start: u32, end: u32 },
    /// An explicit list of sheet row numbers.
    Rows(Vec<u32>),
}

impl RowSelection {
    /// Parses a `START-END` range argument such as `5-10`.
    pub fn parse_range(arg: &str) -> Result<Self, SheetError> {
        let (start, end) = arg
            .split_once('-')
            .ok_or_else(|| SheetError::InvalidSelection(format!("'{arg}' is not START-END")))?;
        let start: u32 = start
            .trim()
            .parse()
            .map_err(|_| SheetError::InvalidSelection(format!("'{start}' is not a row number")))?;
        let end: u32 = end
            .trim()
            .parse()
            .map_err(|_| SheetError::InvalidSelection(format!("'{end}' is not a row number")))?;
        if start > end {
            return Err(SheetError::InvalidSelection(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self::Range { start, end })
    }

    /// Parses a comma-separated list argument such as `5,8,12`.
    pub fn parse_rows(arg: &str) -> Result<Self, SheetError> {
        let mut rows = Vec::new();
        for part in arg.split(',') {
            let row: u32 = part.trim().parse().map_err(|_| {
                SheetError::InvalidSelection(format!("'{}' is not a row number", part.trim()))
            })?;
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(SheetError::InvalidSelection("empty row list".to_string()));
        }
        Ok(Self::Rows(rows))
    }

    fn includes(&self, sheet_row: u32) -> bool {
        match self {
            Self::All => true,
            Self::Range { start, end } => (*start..=*end).contains(&sheet_row),
            Self::Rows(rows) => rows.contains(&sheet_row),
        }
    }
}

// --- Public Helper Functions ---

/// Transforms a Google Sheet URL into a CSV export URL.
pub fn construct_export_url(url_str: &str, gid: Option<&str>) -> Result<String, SheetError> {
    let parsed_url =
        reqwest::Url::parse(url_str).map_err(|e| SheetError::InvalidUrl(format!("{e}")))?;

    let re = Regex::new(r"/spreadsheets/d/([a-zA-Z0-9-_]+)")
        .map_err(|e| SheetError::InvalidUrl(format!("Regex compilation failed: {e}")))?;
    let caps = re.captures(parsed_url.path()).ok_or_else(|| {
        SheetError::InvalidUrl("Could not find sheet ID in URL path.".to_string())
    })?;

    let spreadsheets_id = caps
        .get(1)
        .map(|m| m.as_str())
        .ok_or_else(|| SheetError::InvalidUrl("Sheet ID capture group is missing.".to_string()))?;

    let base_url = match parsed_url.host_str() {
        Some("127.0.0.1") | Some("localhost") => {
            format!("{}://{}", parsed_url.scheme(), parsed_url.authority())
        }
        _ => "https://docs.google.com".to_string(),
    };
    let mut export_url = format!("{base_url}/spreadsheets/d/{spreadsheets_id}/export?format=csv");

    if let Some(gid_val) = gid {
        if !gid_val.is_empty() {
            export_url.push_str(&format!("&gid={gid_val}"));
        }
    }

    Ok(export_url)
}

/// Downloads the content of a Google Sheet as a CSV string.
pub async fn download_csv(export_url: &str) -> Result<String, SheetError> {
    info!("Fetching Google Sheet CSV from: {export_url}");
    let response = reqwest::get(export_url).await?;
    if !response.status().is_success() {
        return Err(SheetError::Fetch(format!(
            "Request failed with status: {}",
            response.status()
        )));
    }
    response.text().await.map_err(SheetError::from)
}

// --- Citation Row Parsing ---

/// Extracts citation rows from CSV data.
///
/// The citation column is found by case-insensitive header lookup. Rows whose
/// citation cell is blank are skipped with a warning; sheet row numbering is
/// preserved across skips, so `row_id` always names the row a user sees in
/// the spreadsheet.
pub fn parse_citation_rows(
    csv_data: &str,
    column: &str,
    selection: &RowSelection,
) -> Result<Vec<SourceRow>, SheetError> {
    let mut reader = csv::Reader::from_reader(csv_data.as_bytes());
    let headers = reader.headers()?.clone();
    let column_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| SheetError::MissingColumn(column.to_string()))?;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        // The header occupies sheet row 1, so the first record is row 2.
        let sheet_row = (i + 2) as u32;
        if !selection.includes(sheet_row) {
            continue;
        }
        let raw_text = record.get(column_idx).unwrap_or("").trim();
        if raw_text.is_empty() {
            warn!("Skipping sheet row {sheet_row}: empty citation cell.");
            continue;
        }
        rows.push(SourceRow {
            row_id: sheet_row.to_string(),
            raw_text: raw_text.to_string(),
        });
    }

    if rows.is_empty() {
        return Err(SheetError::NoData);
    }
    info!("Parsed {} citation rows from sheet data.", rows.len());
    Ok(rows)
}

/// Downloads a Google Sheet and extracts its citation rows.
pub async fn fetch_citation_rows(
    sheet_url: &str,
    gid: Option<&str>,
    column: &str,
    selection: &RowSelection,
) -> Result<Vec<SourceRow>, SheetError> {
    let export_url = construct_export_url(sheet_url, gid)?;
    let csv_data = download_csv(&export_url).await?;
    parse_citation_rows(&csv_data, column, selection)
}

/// Reads citation rows from a local CSV file with the same layout rules as a
/// downloaded sheet.
pub fn read_csv_file(
    path: &Path,
    column: &str,
    selection: &RowSelection,
) -> Result<Vec<SourceRow>, SheetError> {
    let csv_data = std::fs::read_to_string(path)?;
    parse_citation_rows(&csv_data, column, selection)
}
