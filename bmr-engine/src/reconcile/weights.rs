//! Centralized confidence weighting tables
//!
//! Every numeric constant the reconcilers and the preview engine score with
//! lives here, so the curve is reproducible instead of scattered through the
//! call sites. Changing a value here changes behavior everywhere at once.

// ----------------------------------------------------------------------------
// Shared field-confidence curve
//
// confidence = W_RELIABILITY * mean_reliability(winning sources)
//            + W_AGREEMENT   * support_fraction(winning inputs / all inputs)
//            + W_VALIDITY    * valid_fraction(valid inputs / usable inputs)
//            + min(CORROBORATION_BONUS * (agreeing_sources - 1),
//                  MAX_CORROBORATION_BONUS)
// clamped to [CONFIDENCE_FLOOR, CONFIDENCE_CEILING].
// ----------------------------------------------------------------------------

pub const W_RELIABILITY: f64 = 0.50;
pub const W_AGREEMENT: f64 = 0.20;
pub const W_VALIDITY: f64 = 0.30;

/// Bonus per agreeing source beyond the first
pub const CORROBORATION_BONUS: f64 = 0.05;
pub const MAX_CORROBORATION_BONUS: f64 = 0.10;

/// Floor: zero usable input still scores 0.10 ("tried, found nothing")
pub const CONFIDENCE_FLOOR: f64 = 0.10;
/// Ceiling: no reconciled value is ever certain
pub const CONFIDENCE_CEILING: f64 = 0.99;

// ----------------------------------------------------------------------------
// Grouping rules
// ----------------------------------------------------------------------------

/// Page counts within this many pages are the same group
pub const PAGE_COUNT_TOLERANCE_PAGES: u32 = 10;
/// ...or within this fraction of the larger count
pub const PAGE_COUNT_TOLERANCE_FRACTION: f64 = 0.05;

/// Plausible page-count range extracted from free text
pub const MIN_PAGE_COUNT: u32 = 1;
pub const MAX_PAGE_COUNT: u32 = 49_999;

/// Jaro-Winkler thresholds for merging near-equivalent strings
pub const SUBJECT_MERGE_SIMILARITY: f64 = 0.92;
pub const PUBLISHER_MERGE_SIMILARITY: f64 = 0.88;
pub const SERIES_MERGE_SIMILARITY: f64 = 0.90;

/// Descriptions below this normalized-Levenshtein similarity are a conflict
pub const DESCRIPTION_CONFLICT_SIMILARITY: f64 = 0.50;
/// Ratings further apart than this (on a 0-5 scale) are a conflict
pub const RATING_CONFLICT_SPREAD: f64 = 1.0;

// ----------------------------------------------------------------------------
// Overall-confidence aggregation (reconciliation coordinator)
// ----------------------------------------------------------------------------

/// Bonus per contributing source on top of the mean field confidence
pub const OVERALL_SOURCE_BONUS_PER: f64 = 0.02;
pub const OVERALL_SOURCE_BONUS_CAP: f64 = 0.10;

// ----------------------------------------------------------------------------
// Duplicate detection (preview engine)
//
// Field similarities are combined with these weights, renormalized over the
// fields actually present on both sides.
// ----------------------------------------------------------------------------

pub const DUP_WEIGHT_TITLE: f64 = 0.40;
pub const DUP_WEIGHT_AUTHORS: f64 = 0.35;
pub const DUP_WEIGHT_ISBN: f64 = 0.15;
pub const DUP_WEIGHT_YEAR: f64 = 0.10;

/// Similarity bands for match classification
pub const DUP_BAND_EXACT: f64 = 0.90;
pub const DUP_BAND_LIKELY: f64 = 0.75;
pub const DUP_BAND_POSSIBLE: f64 = 0.60;
/// Below this floor a candidate match is discarded entirely
pub const DUP_FLOOR: f64 = 0.45;

/// Per-field similarity above which the field counts as "matching"
pub const DUP_FIELD_MATCH: f64 = 0.80;

// ----------------------------------------------------------------------------
// Edition selection (preview engine)
// ----------------------------------------------------------------------------

pub const EDITION_WEIGHT_RECENCY: f64 = 0.35;
pub const EDITION_WEIGHT_COMPLETENESS: f64 = 0.40;
pub const EDITION_WEIGHT_BINDING: f64 = 0.25;

/// Binding desirability (hardcover preferred by default)
pub const BINDING_SCORE_HARDCOVER: f64 = 1.0;
pub const BINDING_SCORE_PAPERBACK: f64 = 0.8;
pub const BINDING_SCORE_MASS_MARKET: f64 = 0.6;
pub const BINDING_SCORE_EBOOK: f64 = 0.5;
pub const BINDING_SCORE_AUDIOBOOK: f64 = 0.4;
pub const BINDING_SCORE_UNKNOWN: f64 = 0.3;
