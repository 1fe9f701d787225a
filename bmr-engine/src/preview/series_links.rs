//! Series relationship inference
//!
//! Links a proposed work to a series already represented in the library,
//! finds its previous/next neighbors by position, and flags missing volumes
//! between the first known position and the last.

use crate::preview::LibraryEntry;
use crate::reconcile::series::{normalize_series_name, Series};
use crate::reconcile::weights;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

/// Where the proposed work sits in a known series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesRelationships {
    pub series_name: String,
    pub position: Option<f64>,
    /// Closest library entry earlier in the series
    pub previous: Option<LibraryEntry>,
    /// Closest library entry later in the series
    pub next: Option<LibraryEntry>,
    /// Whole-number positions absent from both the library and the proposal
    pub missing_positions: Vec<u32>,
}

/// Infer series relationships from the reconciled series claim
///
/// Returns `None` when the library holds nothing from a matching series.
pub fn infer_relationships(
    series: &Series,
    library: &[LibraryEntry],
) -> Option<SeriesRelationships> {
    let wanted = normalize_series_name(&series.name);
    if wanted.is_empty() {
        return None;
    }

    let members: Vec<&LibraryEntry> = library
        .iter()
        .filter(|entry| {
            entry.series_name.as_deref().is_some_and(|name| {
                let normalized = normalize_series_name(name);
                normalized == wanted
                    || jaro_winkler(&normalized, &wanted) >= weights::SERIES_MERGE_SIMILARITY
            })
        })
        .collect();
    if members.is_empty() {
        return None;
    }

    let mut positioned: Vec<(&LibraryEntry, f64)> = members
        .iter()
        .filter_map(|entry| entry.series_position.map(|p| (*entry, p)))
        .collect();
    positioned.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let (previous, next) = match series.position {
        Some(position) => {
            let previous = positioned
                .iter()
                .filter(|(_, p)| *p < position)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(entry, _)| (*entry).clone());
            let next = positioned
                .iter()
                .filter(|(_, p)| *p > position)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(entry, _)| (*entry).clone());
            (previous, next)
        }
        None => (None, None),
    };

    // Missing whole-number volumes across the known span
    let mut known: Vec<u32> = positioned
        .iter()
        .map(|(_, p)| *p)
        .chain(series.position)
        .filter(|p| p.fract() == 0.0 && *p >= 1.0)
        .map(|p| p as u32)
        .collect();
    known.sort_unstable();
    known.dedup();
    let missing_positions = match (known.first(), known.last()) {
        (Some(first), Some(last)) => (*first..=*last)
            .filter(|p| !known.contains(p))
            .collect(),
        _ => Vec::new(),
    };

    Some(SeriesRelationships {
        series_name: series.name.clone(),
        position: series.position,
        previous,
        next,
        missing_positions,
    })
}
