//! Series reconciliation
//!
//! Parses series statements like "Dune Chronicles #2", "Book 2 of the Dune
//! Chronicles", or "Dune Chronicles, Vol. 2" into name plus position, merges
//! near-equivalent names across sources, and resolves position disagreements
//! by aggregate reliability.

use crate::reconcile::{
    collect_sources, field_confidence, group_weight, mean_reliability, weights, ReconcileError,
    SourceValue,
};
use crate::types::{Conflict, ConflictValue, MetadataSource, ReconciledField};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::debug;

/// One raw series statement from one source
pub type SeriesInput = SourceValue<String>;

/// A series membership claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    /// Position within the series; fractional for interstitial novellas
    pub position: Option<f64>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a series statement into name and optional position
///
/// Recognized shapes: "Name #2", "Name, Book 2", "Name Vol. 2",
/// "Book 2 of [the] Name", and a bare trailing number "Name, 2".
pub fn parse_series(raw: &str) -> Option<Series> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // ASCII-only fold so `lower` keeps the exact byte layout of `trimmed`;
    // marker offsets found below are sliced back into `trimmed`, and a full
    // Unicode lowercase can change byte length (e.g. 'İ').
    let lower: String = trimmed.chars().map(|c| c.to_ascii_lowercase()).collect();

    // "Book 2 of the Name" / "Volume 2 of Name"
    for marker in ["book ", "volume ", "vol. ", "vol ", "no. ", "#"] {
        if let Some(rest) = lower.strip_prefix(marker) {
            if let Some(of_pos) = rest.find(" of ") {
                if let Ok(position) = rest[..of_pos].trim().parse::<f64>() {
                    let name_start = marker.len() + of_pos + 4;
                    let name = trimmed[name_start..]
                        .trim()
                        .trim_start_matches("the ")
                        .trim_start_matches("The ")
                        .trim();
                    if !name.is_empty() {
                        return Some(Series {
                            name: name.to_string(),
                            position: Some(position),
                        });
                    }
                }
            }
        }
    }

    // "Name #2"
    if let Some(hash) = trimmed.rfind('#') {
        if let Ok(position) = trimmed[hash + 1..].trim().parse::<f64>() {
            let name = trimmed[..hash].trim_end_matches([',', ' ']).trim();
            if !name.is_empty() {
                return Some(Series {
                    name: name.to_string(),
                    position: Some(position),
                });
            }
        }
    }

    // "Name, Book 2" / "Name Vol. 2" / "Name, 2"
    for marker in [", book ", " book ", ", vol. ", " vol. ", ", vol ", " vol ", ", "] {
        if let Some(pos) = lower.rfind(marker) {
            let tail = trimmed[pos + marker.len()..].trim();
            if let Ok(position) = tail.parse::<f64>() {
                let name = trimmed[..pos].trim_end_matches([',', ' ']).trim();
                if !name.is_empty() {
                    return Some(Series {
                        name: name.to_string(),
                        position: Some(position),
                    });
                }
            }
        }
    }

    Some(Series {
        name: trimmed.to_string(),
        position: None,
    })
}

/// Canonical comparison form: lowercase, punctuation folded, leading "the"
/// and trailing "series" dropped
pub fn normalize_series_name(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = folded.split_whitespace().collect();
    if words.first() == Some(&"the") {
        words.remove(0);
    }
    if words.last() == Some(&"series") && words.len() > 1 {
        words.pop();
    }
    words.join(" ")
}

// ============================================================================
// Reconciliation
// ============================================================================

struct SeriesGroup {
    display: String,
    normalized: String,
    positions: Vec<(f64, MetadataSource)>,
    sources: Vec<MetadataSource>,
}

/// Reconcile series statements from multiple sources
///
/// # Errors
/// `ReconcileError::EmptyInput` when called with no inputs at all.
pub fn reconcile_series(
    inputs: &[SeriesInput],
) -> Result<ReconciledField<Option<Series>>, ReconcileError> {
    if inputs.is_empty() {
        return Err(ReconcileError::EmptyInput("series statements"));
    }

    let all_sources = collect_sources(inputs.iter().map(|i| &i.source));
    let mut conflicts: Vec<Conflict> = Vec::new();

    let mut groups: Vec<SeriesGroup> = Vec::new();
    let mut usable = 0usize;
    for input in inputs {
        let Some(parsed) = parse_series(&input.value) else {
            continue;
        };
        usable += 1;
        let normalized = normalize_series_name(&parsed.name);
        if normalized.is_empty() {
            continue;
        }

        let index = groups.iter().position(|g| {
            g.normalized == normalized
                || jaro_winkler(&g.normalized, &normalized) >= weights::SERIES_MERGE_SIMILARITY
        });
        let index = match index {
            Some(index) => index,
            None => {
                groups.push(SeriesGroup {
                    display: parsed.name.clone(),
                    normalized,
                    positions: Vec::new(),
                    sources: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];
        if let Some(position) = parsed.position {
            group.positions.push((position, input.source.clone()));
        }
        if !group.sources.iter().any(|s| s.name == input.source.name) {
            group.sources.push(input.source.clone());
        }
    }

    if groups.is_empty() {
        return Ok(ReconciledField {
            value: None,
            confidence: weights::CONFIDENCE_FLOOR,
            sources: all_sources,
            conflicts,
            reasoning: "no usable series statements".to_string(),
        });
    }

    groups.sort_by(|a, b| {
        group_weight(&b.sources)
            .partial_cmp(&group_weight(&a.sources))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.normalized.cmp(&b.normalized))
    });

    if groups.len() > 1 {
        debug!(
            winner = %groups[0].display,
            groups = groups.len(),
            "Series name disagreement"
        );
        conflicts.push(Conflict {
            field: "series.name".to_string(),
            values: groups
                .iter()
                .flat_map(|g| {
                    g.sources.iter().map(|s| ConflictValue {
                        value: g.display.clone(),
                        source: s.name.clone(),
                    })
                })
                .collect(),
            resolution: format!(
                "kept '{}' (combined reliability {:.2}) over {}",
                groups[0].display,
                group_weight(&groups[0].sources),
                groups[1..]
                    .iter()
                    .map(|g| format!("'{}'", g.display))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }

    let winner = &groups[0];

    // Position: reliability-weighted vote among distinct claimed positions
    let mut position_votes: Vec<(f64, f64)> = Vec::new(); // (position, weight)
    for (position, source) in &winner.positions {
        match position_votes
            .iter_mut()
            .find(|(p, _)| (*p - position).abs() < f64::EPSILON)
        {
            Some((_, weight)) => *weight += source.reliability,
            None => position_votes.push((*position, source.reliability)),
        }
    }
    position_votes.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
    });
    let position = position_votes.first().map(|(p, _)| *p);
    if position_votes.len() > 1 {
        conflicts.push(Conflict {
            field: "series.position".to_string(),
            values: winner
                .positions
                .iter()
                .map(|(p, s)| ConflictValue {
                    value: format!("{p}"),
                    source: s.name.clone(),
                })
                .collect(),
            resolution: format!(
                "kept position {} (combined reliability {:.2})",
                position_votes[0].0, position_votes[0].1
            ),
        });
    }

    let agreement = winner.sources.len();
    let confidence = field_confidence(
        1.0,
        mean_reliability(&winner.sources),
        agreement as f64 / usable.max(1) as f64,
        agreement,
    );

    let reasoning = format!(
        "series '{}' position {:?}; {} group(s), {} conflict(s)",
        winner.display,
        position,
        groups.len(),
        conflicts.len()
    );

    Ok(ReconciledField {
        value: Some(Series {
            name: winner.display.clone(),
            position,
        }),
        confidence,
        sources: all_sources,
        conflicts,
        reasoning,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn input(raw: &str, source: &str, reliability: f64) -> SeriesInput {
        SeriesInput::new(raw.to_string(), MetadataSource::new(source, reliability))
    }

    #[test]
    fn test_parse_hash_position() {
        let series = parse_series("Dune Chronicles #2").unwrap();
        assert_eq!(series.name, "Dune Chronicles");
        assert_eq!(series.position, Some(2.0));
    }

    #[test]
    fn test_parse_book_n_of() {
        let series = parse_series("Book 2 of the Dune Chronicles").unwrap();
        assert_eq!(series.name, "Dune Chronicles");
        assert_eq!(series.position, Some(2.0));
    }

    #[test]
    fn test_parse_vol_suffix() {
        let series = parse_series("Dune Chronicles, Vol. 2").unwrap();
        assert_eq!(series.name, "Dune Chronicles");
        assert_eq!(series.position, Some(2.0));
    }

    #[test]
    fn test_parse_trailing_number() {
        let series = parse_series("Discworld, 13").unwrap();
        assert_eq!(series.name, "Discworld");
        assert_eq!(series.position, Some(13.0));
    }

    #[test]
    fn test_parse_fractional_position() {
        let series = parse_series("The Expanse #3.5").unwrap();
        assert_eq!(series.position, Some(3.5));
    }

    #[test]
    fn test_parse_non_ascii_name() {
        // 'İ' lowercases to two chars under full Unicode folding, which
        // would shift marker offsets; the name must slice back cleanly.
        let series = parse_series("İİİİ, 2").unwrap();
        assert_eq!(series.name, "İİİİ");
        assert_eq!(series.position, Some(2.0));

        let series = parse_series("Böök 2 of the Sörmland Saga").unwrap();
        assert_eq!(series.position, None, "non-marker text stays a bare name");
    }

    #[test]
    fn test_parse_bare_name() {
        let series = parse_series("Discworld").unwrap();
        assert_eq!(series.name, "Discworld");
        assert_eq!(series.position, None);
    }

    #[test]
    fn test_normalize_drops_article_and_suffix() {
        assert_eq!(
            normalize_series_name("The Dune Chronicles Series"),
            "dune chronicles"
        );
        assert_eq!(normalize_series_name("Dune Chronicles"), "dune chronicles");
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = reconcile_series(&[]).unwrap_err();
        assert!(err.to_string().contains("No series"));
    }

    #[test]
    fn test_name_variants_merge() {
        let inputs = vec![
            input("Dune Chronicles #2", "a", 0.8),
            input("The Dune Chronicles Series #2", "b", 0.7),
        ];
        let field = reconcile_series(&inputs).unwrap();

        let series = field.value.unwrap();
        assert_eq!(series.name, "Dune Chronicles");
        assert_eq!(series.position, Some(2.0));
        assert!(field.conflicts.is_empty());
    }

    #[test]
    fn test_position_disagreement_resolved_by_weight() {
        let inputs = vec![
            input("Dune Chronicles #2", "strong", 0.9),
            input("Dune Chronicles #3", "weak", 0.4),
        ];
        let field = reconcile_series(&inputs).unwrap();

        assert_eq!(field.value.unwrap().position, Some(2.0));
        assert!(field.conflicts.iter().any(|c| c.field == "series.position"));
    }

    #[test]
    fn test_different_series_names_conflict() {
        let inputs = vec![
            input("Dune Chronicles #1", "a", 0.9),
            input("Foundation #1", "b", 0.4),
        ];
        let field = reconcile_series(&inputs).unwrap();

        assert_eq!(field.value.unwrap().name, "Dune Chronicles");
        assert!(field.conflicts.iter().any(|c| c.field == "series.name"));
    }

    #[test]
    fn test_all_blank_yields_none() {
        let field = reconcile_series(&[input("  ", "a", 0.9)]).unwrap();
        assert!(field.value.is_none());
        assert_eq!(field.confidence, weights::CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_determinism() {
        let inputs = vec![
            input("Dune Chronicles #2", "a", 0.8),
            input("Foundation #1", "b", 0.8),
        ];
        let first = reconcile_series(&inputs).unwrap();
        let second = reconcile_series(&inputs).unwrap();
        assert_eq!(first.value, second.value);
        assert_eq!(first.confidence, second.confidence);
    }
}
