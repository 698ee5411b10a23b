//! # Fuzzy Matcher
//!
//! Scores each parsed citation against the file index and selects a best
//! match. The pipeline per citation is:
//!
//! 1.  **Year guardrail**: if both the citation and a file carry a year and
//!     the two differ by more than the tolerance, that file is eliminated
//!     before any scoring. A missing year on either side never eliminates.
//! 2.  **Scoring**: every surviving file is scored with [`similarity`].
//! 3.  **Selection**: candidates are ranked deterministically; the top score
//!     is checked against the threshold, then against the runner-up for
//!     ambiguity.
//!
//! Matching has no failure mode: every citation yields a `MatchResult`, and
//! `Unmatched`/`Ambiguous` are ordinary values rather than errors.

use crate::index::FileIndex;
use crate::types::{Citation, IndexedFile, MatchResult, MatchStatus};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// Tuning knobs for the matcher, exposed as CLI flags by the binary.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Maximum allowed difference between a citation year and a file year
    /// before the file is eliminated. Off-by-one is common between citation
    /// styles and publication dates, hence the default of 1.
    pub year_tolerance: i32,
    /// Top scores below this report `Unmatched`.
    pub score_threshold: f64,
    /// If the top two scores are within this margin the result is
    /// `Ambiguous` and both contenders are reported.
    pub ambiguity_margin: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            year_tolerance: 1,
            score_threshold: 0.5,
            ambiguity_margin: 0.05,
        }
    }
}

/// Symmetric similarity between two token sets, bounded to `[0, 1]`.
///
/// The score is the better of two views of the same pair: the Dice
/// coefficient over the sets themselves (robust to word order and to extra
/// words on either side) and the character-bigram Sorensen-Dice similarity of
/// the space-joined tokens (catches abbreviated or truncated words the set
/// view misses). Both views are symmetric and deterministic, so the combined
/// score is too.
pub fn similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let overlap = a.intersection(b).count() as f64;
    let set_dice = 2.0 * overlap / (a.len() + b.len()) as f64;

    let joined_a = a.iter().cloned().collect::<Vec<_>>().join(" ");
    let joined_b = b.iter().cloned().collect::<Vec<_>>().join(" ");
    let bigram_dice = strsim::sorensen_dice(&joined_a, &joined_b);

    set_dice.max(bigram_dice)
}

/// Matches one citation against the index.
pub fn match_citation(
    citation: &Citation,
    index: &FileIndex,
    config: &MatcherConfig,
) -> MatchResult {
    let mut candidates: Vec<(&IndexedFile, f64)> = index
        .files()
        .iter()
        .filter(|file| !year_conflict(citation.year, file.year, config.year_tolerance))
        .map(|file| (file, similarity(&citation.tokens, &file.tokens)))
        .collect();

    // Rank by score, breaking ties first by exact year agreement and then by
    // path, so equal-scoring runs always report the same winner and the same
    // contender pair.
    candidates.sort_by(|(file_a, score_a), (file_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let exact_a = citation.year.is_some() && file_a.year == citation.year;
                let exact_b = citation.year.is_some() && file_b.year == citation.year;
                exact_b.cmp(&exact_a)
            })
            .then_with(|| file_a.path.cmp(&file_b.path))
    });

    let result = select(citation, &candidates, config);
    debug!(
        "[match_citation] row {}: {:?} (confidence {:.3})",
        result.row_id, result.status, result.confidence
    );
    result
}

/// Matches a batch of citations, preserving input order.
pub fn match_citations(
    citations: &[Citation],
    index: &FileIndex,
    config: &MatcherConfig,
) -> Vec<MatchResult> {
    citations
        .iter()
        .map(|citation| match_citation(citation, index, config))
        .collect()
}

/// The guardrail eliminates only when both sides carry a year and the years
/// disagree beyond the tolerance.
fn year_conflict(citation_year: Option<i32>, file_year: Option<i32>, tolerance: i32) -> bool {
    match (citation_year, file_year) {
        (Some(cy), Some(fy)) => (cy - fy).abs() > tolerance,
        _ => false,
    }
}

fn select(
    citation: &Citation,
    ranked: &[(&IndexedFile, f64)],
    config: &MatcherConfig,
) -> MatchResult {
    let Some((top_file, top_score)) = ranked.first() else {
        return MatchResult {
            row_id: citation.row_id.clone(),
            status: MatchStatus::Unmatched,
            matched_path: None,
            confidence: 0.0,
            contenders: Vec::new(),
        };
    };

    if *top_score < config.score_threshold {
        return MatchResult {
            row_id: citation.row_id.clone(),
            status: MatchStatus::Unmatched,
            matched_path: None,
            confidence: *top_score,
            contenders: Vec::new(),
        };
    }

    if let Some((second_file, second_score)) = ranked.get(1) {
        if top_score - second_score <= config.ambiguity_margin {
            return MatchResult {
                row_id: citation.row_id.clone(),
                status: MatchStatus::Ambiguous,
                matched_path: None,
                confidence: *top_score,
                contenders: vec![top_file.path.clone(), second_file.path.clone()],
            };
        }
    }

    MatchResult {
        row_id: citation.row_id.clone(),
        status: MatchStatus::Matched,
        matched_path: Some(top_file.path.clone()),
        confidence: *top_score,
        contenders: Vec::new(),
    }
}
