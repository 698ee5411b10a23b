//! # Citation Parsing Tests
//!
//! This test suite validates the deterministic tokenizer and year extractor in
//! `citerec::citation`. These functions feed the fuzzy matcher, so their output
//! must be stable across runs and resilient to messy, real-world citation text.

use citerec::citation::{extract_year, normalize_tokens, parse_citation};
use citerec::types::SourceRow;

// --- Tests for `extract_year` ---

/// Verifies that a parenthesized publication year is extracted from a
/// conventional reference string.
#[test]
fn test_extract_year_from_standard_citation() {
    let text = "Smith, J. (2019). Neural Networks in Practice. Journal of AI.";
    assert_eq!(extract_year(text), Some(2019));
}

/// Verifies that a year embedded between underscores, as in a typical PDF
/// filename, is still found.
#[test]
fn test_extract_year_from_filename_stem() {
    assert_eq!(extract_year("Smith_2019_Neural_Networks"), Some(2019));
}

/// Verifies that four-digit numbers outside the plausible publication window
/// are not mistaken for years.
#[test]
fn test_extract_year_ignores_implausible_numbers() {
    // Page ranges produce four-digit tokens that are not years.
    assert_eq!(extract_year("Proceedings, pages 3405-3410."), None);
    // Values below the window are rejected even when they parse cleanly.
    assert_eq!(extract_year("Catalog item 0042"), None);
    // Longer digit runs are never split into year candidates.
    assert_eq!(extract_year("Document 20190423"), None);
}

/// Verifies that the earliest plausible candidate wins when several appear.
#[test]
fn test_extract_year_takes_first_candidate() {
    let text = "Reprinted 1999, originally published 2005.";
    assert_eq!(extract_year(text), Some(1999));
}

/// Verifies that historical years at the low end of the window are accepted.
#[test]
fn test_extract_year_accepts_old_publications() {
    assert_eq!(extract_year("On the Motion of Bodies (1805)"), Some(1805));
}

/// Verifies that text without any four-digit number yields no year.
#[test]
fn test_extract_year_absent() {
    assert_eq!(extract_year("An undated working paper"), None);
}

// --- Tests for `normalize_tokens` ---

/// Verifies that punctuation is folded away, casing is normalized, and
/// stopwords are dropped from the token set.
#[test]
fn test_normalize_tokens_folds_punctuation_and_stopwords() {
    let tokens = normalize_tokens("The Neural-Networks, of 2019!");
    let expected: Vec<&str> = vec!["2019", "networks", "neural"];
    let actual: Vec<&str> = tokens.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual, expected);
}

/// Verifies that single-character fragments such as author initials are
/// discarded while real words survive.
#[test]
fn test_normalize_tokens_drops_initials() {
    let tokens = normalize_tokens("J. K. Smith");
    assert_eq!(tokens.len(), 1);
    assert!(tokens.contains("smith"));
}

/// Verifies that numeric tokens are kept so that years can contribute to
/// similarity scores.
#[test]
fn test_normalize_tokens_keeps_digits() {
    let tokens = normalize_tokens("Deep Learning 2020");
    assert!(tokens.contains("2020"));
    assert!(tokens.contains("deep"));
    assert!(tokens.contains("learning"));
}

/// Verifies that duplicate words collapse into a single token.
#[test]
fn test_normalize_tokens_deduplicates() {
    let tokens = normalize_tokens("data data DATA");
    assert_eq!(tokens.len(), 1);
}

// --- Tests for `parse_citation` ---

/// Verifies that a well-formed row produces both a year and a token set tied
/// back to the originating row id.
#[test]
fn test_parse_citation_full_row() {
    let row = SourceRow {
        row_id: "7".to_string(),
        raw_text: "Jones (2020) Deep Learning Methods".to_string(),
    };

    let citation = parse_citation(&row);

    assert_eq!(citation.row_id, "7");
    assert_eq!(citation.year, Some(2020));
    assert!(citation.tokens.contains("jones"));
    assert!(citation.tokens.contains("deep"));
}

/// Verifies that malformed text degrades to an empty token set instead of an
/// error, so downstream stages can report the row as unmatched.
#[test]
fn test_parse_citation_malformed_text() {
    let row = SourceRow {
        row_id: "9".to_string(),
        raw_text: "???".to_string(),
    };

    let citation = parse_citation(&row);

    assert!(citation.tokens.is_empty());
    assert_eq!(citation.year, None);
    assert_eq!(citation.raw_text, "???");
}
