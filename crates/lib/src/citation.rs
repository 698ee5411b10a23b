//! # Citation Parsing
//!
//! Turns a raw citation string into the normalized form the matcher works
//! with: a token set and a candidate publication year. Parsing never fails;
//! malformed input produces an empty token set and no year, which surfaces
//! downstream as an unmatched row.

use crate::types::{Citation, SourceRow};
use chrono::{Datelike, Utc};
use regex::Regex;
use std::collections::BTreeSet;

/// Function words that carry no matching signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "or", "the", "to", "with",
];

/// Extracts the first plausible publication year from a string.
///
/// A candidate is a maximal digit run of exactly four digits, so the year is
/// found whether it is set off by spaces, parentheses, or underscores. A
/// candidate is accepted only if it falls between 1800 and next year, which
/// keeps page numbers, report ids, and longer numbers from passing as years.
pub fn extract_year(text: &str) -> Option<i32> {
    let re = Regex::new(r"\d+").ok()?;
    let max_year = Utc::now().year() + 1;
    for candidate in re.find_iter(text) {
        if candidate.as_str().len() != 4 {
            continue;
        }
        if let Ok(year) = candidate.as_str().parse::<i32>() {
            if (1800..=max_year).contains(&year) {
                return Some(year);
            }
        }
    }
    None
}

/// Normalizes a string into a token set: lowercased, punctuation folded to
/// whitespace, single-character tokens and function words dropped. Digits are
/// kept, so a year present in the text also contributes to token overlap.
pub fn normalize_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| token.len() >= 2 && !STOPWORDS.contains(token))
        .map(String::from)
        .collect()
}

/// Parses one source row into a `Citation`.
pub fn parse_citation(row: &SourceRow) -> Citation {
    Citation {
        row_id: row.row_id.clone(),
        raw_text: row.raw_text.clone(),
        year: extract_year(&row.raw_text),
        tokens: normalize_tokens(&row.raw_text),
    }
}
