//! Domain reconcilers
//!
//! Six reconcilers fold N source-tagged values for one bibliographic
//! dimension into one `ReconciledField`. All share the same five-step shape:
//!
//! 1. Normalize raw inputs to canonical form
//! 2. Validate (invalid values are kept, not discarded, unless blank)
//! 3. Group equivalent or near-equivalent values across sources
//! 4. Score each group by aggregate source reliability and pick or
//!    synthesize the representative
//! 5. Record every losing group as a `Conflict` and compute the field
//!    confidence from validity, reliability, and agreement
//!
//! A direct call with an empty input list is an error; a non-empty list with
//! nothing usable yields the confidence floor (0.1), distinguishing "tried,
//! found nothing" from "never tried".

pub mod content;
pub mod coordinator;
pub mod identifiers;
pub mod physical;
pub mod publication;
pub mod series;
pub mod subjects;
pub mod weights;

pub use coordinator::{ReconcileStats, ReconciledMetadata, ReconciliationCoordinator};

use crate::types::MetadataSource;
use thiserror::Error;

/// Reconciliation input rejection
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Direct zero-input call to a reconciler
    #[error("No {0} provided for reconciliation")]
    EmptyInput(&'static str),

    /// Structurally unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A raw value tagged with the source that supplied it
#[derive(Debug, Clone)]
pub struct SourceValue<T> {
    pub value: T,
    pub source: MetadataSource,
}

impl<T> SourceValue<T> {
    pub fn new(value: T, source: MetadataSource) -> Self {
        Self { value, source }
    }
}

/// Field confidence from the shared scoring curve (see `weights`)
///
/// - `valid_fraction` — usable inputs that passed validation
/// - `mean_reliability` — mean reliability of the winning sources
/// - `support_fraction` — inputs agreeing with the winner(s) over all inputs
/// - `agreeing_sources` — source count behind the winning value
pub(crate) fn field_confidence(
    valid_fraction: f64,
    mean_reliability: f64,
    support_fraction: f64,
    agreeing_sources: usize,
) -> f64 {
    let corroboration = (weights::CORROBORATION_BONUS
        * agreeing_sources.saturating_sub(1) as f64)
        .min(weights::MAX_CORROBORATION_BONUS);
    let raw = weights::W_RELIABILITY * mean_reliability
        + weights::W_AGREEMENT * support_fraction
        + weights::W_VALIDITY * valid_fraction
        + corroboration;
    raw.clamp(weights::CONFIDENCE_FLOOR, weights::CONFIDENCE_CEILING)
}

/// Collect distinct sources by name, first occurrence wins
pub(crate) fn collect_sources<'a, I>(sources: I) -> Vec<MetadataSource>
where
    I: IntoIterator<Item = &'a MetadataSource>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for source in sources {
        if seen.insert(source.name.clone()) {
            out.push(source.clone());
        }
    }
    out
}

/// Aggregate reliability weight of a group of sources
pub(crate) fn group_weight(sources: &[MetadataSource]) -> f64 {
    sources.iter().map(|s| s.reliability).sum()
}

/// Mean reliability of a group of sources (0.0 when empty)
pub(crate) fn mean_reliability(sources: &[MetadataSource]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }
    group_weight(sources) / sources.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped_to_floor_and_ceiling() {
        assert_eq!(field_confidence(0.0, 0.0, 0.0, 0), weights::CONFIDENCE_FLOOR);
        assert_eq!(field_confidence(1.0, 1.0, 1.0, 10), weights::CONFIDENCE_CEILING);
    }

    #[test]
    fn test_confidence_monotonic_in_agreement() {
        let one = field_confidence(1.0, 0.9, 1.0, 1);
        let two = field_confidence(1.0, 0.9, 1.0, 2);
        assert!(two >= one, "A second agreeing source must not lower confidence");
    }

    #[test]
    fn test_collect_sources_dedups_by_name() {
        let sources = vec![
            MetadataSource::new("a", 0.8),
            MetadataSource::new("b", 0.7),
            MetadataSource::new("a", 0.5),
        ];
        let collected = collect_sources(sources.iter());
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].reliability, 0.8, "First occurrence wins");
    }
}
