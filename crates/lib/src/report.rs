//! # Result Assembly
//!
//! Merges match results and extraction outputs back into one report ordered
//! by the original rows. Assembly is a pure merge: it performs no matching,
//! no recomputation, and no external calls, so the report for a given set of
//! inputs is always the same.

use crate::types::{
    ExtractionOutput, MatchResult, MatchStatus, ReportRow, RowStatus, SourceRow,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Builds the final report: exactly one row per input citation, in input
/// order, regardless of the order the job produced outputs in.
///
/// Status reflects the worst stage a row reached: citations that never
/// matched stay `Unmatched`/`Ambiguous`, matched citations become
/// `Extracted` or `ExtractionFailed` depending on their output.
pub fn assemble_report(
    rows: &[SourceRow],
    matches: &[MatchResult],
    row_outputs: &BTreeMap<String, ExtractionOutput>,
) -> Vec<ReportRow> {
    let match_by_row: BTreeMap<&str, &MatchResult> = matches
        .iter()
        .map(|m| (m.row_id.as_str(), m))
        .collect();

    rows.iter()
        .map(|row| {
            let Some(result) = match_by_row.get(row.row_id.as_str()) else {
                return ReportRow {
                    row_id: row.row_id.clone(),
                    raw_text: row.raw_text.clone(),
                    status: RowStatus::Unmatched,
                    matched_path: None,
                    confidence: 0.0,
                    extracted_text: None,
                    detail: Some("citation was never matched".to_string()),
                };
            };
            assemble_row(row, result, row_outputs.get(&row.row_id))
        })
        .collect()
}

fn assemble_row(
    row: &SourceRow,
    result: &MatchResult,
    output: Option<&ExtractionOutput>,
) -> ReportRow {
    let (status, extracted_text, detail) = match result.status {
        MatchStatus::Unmatched => (RowStatus::Unmatched, None, None),
        MatchStatus::Ambiguous => {
            let contenders = result
                .contenders
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" and ");
            (
                RowStatus::Ambiguous,
                None,
                Some(format!("ambiguous between {contenders}")),
            )
        }
        MatchStatus::Matched => match output {
            Some(output) if output.succeeded => {
                (RowStatus::Extracted, output.extracted_text.clone(), None)
            }
            Some(output) => (
                RowStatus::ExtractionFailed,
                None,
                output.error_detail.clone(),
            ),
            None => (
                RowStatus::ExtractionFailed,
                None,
                Some("no extraction output recorded for this row".to_string()),
            ),
        },
    };

    ReportRow {
        row_id: row.row_id.clone(),
        raw_text: row.raw_text.clone(),
        status,
        matched_path: result.matched_path.clone(),
        confidence: result.confidence,
        extracted_text,
        detail,
    }
}

/// Writes the report as CSV. Paths and confidences are rendered as text so
/// the file round-trips through spreadsheet tools without type surprises.
pub fn write_csv_report(path: &Path, report: &[ReportRow]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "row",
        "citation",
        "status",
        "matched_file",
        "confidence",
        "extracted_text",
        "detail",
    ])?;
    for row in report {
        let matched_file = row
            .matched_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let confidence = format!("{:.3}", row.confidence);
        writer.write_record([
            row.row_id.as_str(),
            row.raw_text.as_str(),
            row.status.as_str(),
            matched_file.as_str(),
            confidence.as_str(),
            row.extracted_text.as_deref().unwrap_or(""),
            row.detail.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
