//! Content reconciliation: descriptions, tables of contents, reviews,
//! ratings, cover images
//!
//! Content fields are not merged word-by-word. The description comes from
//! the most reliable source (longer text breaks ties), the table of contents
//! from whichever source has the longest one, reviews are unioned, ratings
//! are reliability-weight averaged, and the cover follows reliability.
//! Descriptions that disagree substantially are flagged, not blended.

use crate::reconcile::{
    collect_sources, field_confidence, mean_reliability, weights, ReconcileError, SourceValue,
};
use crate::types::{Conflict, ConflictValue, MetadataSource, ReconciledField};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::debug;

/// Raw content fields from one source
#[derive(Debug, Clone, Default)]
pub struct ContentFields {
    pub description: Option<String>,
    pub table_of_contents: Vec<String>,
    pub reviews: Vec<String>,
    /// Average rating on a 0-5 scale
    pub rating: Option<f64>,
    pub cover_url: Option<String>,
}

pub type ContentInput = SourceValue<ContentFields>;

/// Reconciled content fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciledContent {
    pub description: Option<String>,
    pub table_of_contents: Vec<String>,
    pub reviews: Vec<String>,
    pub rating: Option<f64>,
    pub cover_url: Option<String>,
}

/// Reconcile content fields from multiple sources
///
/// # Errors
/// `ReconcileError::EmptyInput` when called with no inputs at all.
pub fn reconcile_content(
    inputs: &[ContentInput],
) -> Result<ReconciledField<ReconciledContent>, ReconcileError> {
    if inputs.is_empty() {
        return Err(ReconcileError::EmptyInput("content fields"));
    }

    let all_sources = collect_sources(inputs.iter().map(|i| &i.source));
    let mut conflicts: Vec<Conflict> = Vec::new();

    // ---- Description: highest reliability, longer text breaks ties
    let mut descriptions: Vec<(&str, &MetadataSource)> = inputs
        .iter()
        .filter_map(|i| {
            i.value
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| (d, &i.source))
        })
        .collect();
    descriptions.sort_by(|a, b| {
        b.1.reliability
            .partial_cmp(&a.1.reliability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.len().cmp(&a.0.len()))
            .then_with(|| a.1.name.cmp(&b.1.name))
    });
    let description = descriptions.first().map(|(d, _)| d.to_string());

    // Substantially different descriptions are flagged for review
    if let Some((winner, winner_source)) = descriptions.first() {
        for (other, other_source) in &descriptions[1..] {
            let similarity = normalized_levenshtein(winner, other);
            if similarity < weights::DESCRIPTION_CONFLICT_SIMILARITY {
                debug!(
                    kept = winner_source.name,
                    flagged = other_source.name,
                    similarity,
                    "Descriptions disagree substantially"
                );
                conflicts.push(Conflict {
                    field: "content.description".to_string(),
                    values: vec![
                        ConflictValue {
                            value: truncate(winner, 120),
                            source: winner_source.name.clone(),
                        },
                        ConflictValue {
                            value: truncate(other, 120),
                            source: other_source.name.clone(),
                        },
                    ],
                    resolution: format!(
                        "kept description from {} (reliability {:.2}); {} differs (similarity {:.2})",
                        winner_source.name, winner_source.reliability, other_source.name, similarity
                    ),
                });
            }
        }
    }

    // ---- Table of contents: longest wins (most complete listing)
    let table_of_contents = inputs
        .iter()
        .map(|i| &i.value.table_of_contents)
        .filter(|toc| !toc.is_empty())
        .max_by_key(|toc| toc.len())
        .cloned()
        .unwrap_or_default();

    // ---- Reviews: union, order preserved, exact duplicates dropped
    let mut reviews: Vec<String> = Vec::new();
    for input in inputs {
        for review in &input.value.reviews {
            let trimmed = review.trim();
            if !trimmed.is_empty() && !reviews.iter().any(|r| r == trimmed) {
                reviews.push(trimmed.to_string());
            }
        }
    }

    // ---- Rating: reliability-weighted average; wide spread is a conflict
    let rating_claims: Vec<(f64, &MetadataSource)> = inputs
        .iter()
        .filter_map(|i| {
            i.value
                .rating
                .filter(|r| (0.0..=5.0).contains(r))
                .map(|r| (r, &i.source))
        })
        .collect();
    let rating = if rating_claims.is_empty() {
        None
    } else {
        let weight: f64 = rating_claims.iter().map(|(_, s)| s.reliability).sum();
        let value = if weight > 0.0 {
            rating_claims
                .iter()
                .map(|(r, s)| r * s.reliability)
                .sum::<f64>()
                / weight
        } else {
            rating_claims.iter().map(|(r, _)| r).sum::<f64>() / rating_claims.len() as f64
        };
        let min = rating_claims
            .iter()
            .map(|(r, _)| *r)
            .fold(f64::INFINITY, f64::min);
        let max = rating_claims
            .iter()
            .map(|(r, _)| *r)
            .fold(f64::NEG_INFINITY, f64::max);
        if max - min > weights::RATING_CONFLICT_SPREAD {
            conflicts.push(Conflict {
                field: "content.rating".to_string(),
                values: rating_claims
                    .iter()
                    .map(|(r, s)| ConflictValue {
                        value: format!("{r:.1}"),
                        source: s.name.clone(),
                    })
                    .collect(),
                resolution: format!(
                    "weighted average {value:.2}; sources span {min:.1} to {max:.1}"
                ),
            });
        }
        Some(value)
    };

    // ---- Cover: highest reliability with a URL present
    let cover_url = inputs
        .iter()
        .filter_map(|i| {
            i.value
                .cover_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| (u, &i.source))
        })
        .max_by(|a, b| {
            a.1.reliability
                .partial_cmp(&b.1.reliability)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.name.cmp(&a.1.name))
        })
        .map(|(u, _)| u.to_string());

    let usable = inputs
        .iter()
        .filter(|i| {
            i.value.description.is_some()
                || !i.value.table_of_contents.is_empty()
                || !i.value.reviews.is_empty()
                || i.value.rating.is_some()
                || i.value.cover_url.is_some()
        })
        .count();

    if usable == 0 {
        return Ok(ReconciledField {
            value: ReconciledContent {
                description: None,
                table_of_contents: Vec::new(),
                reviews: Vec::new(),
                rating: None,
                cover_url: None,
            },
            confidence: weights::CONFIDENCE_FLOOR,
            sources: all_sources,
            conflicts,
            reasoning: "no usable content fields in any input".to_string(),
        });
    }

    let contributing: Vec<MetadataSource> = all_sources
        .iter()
        .filter(|s| {
            inputs.iter().any(|i| {
                i.source.name == s.name
                    && (i.value.description.is_some()
                        || !i.value.table_of_contents.is_empty()
                        || !i.value.reviews.is_empty()
                        || i.value.rating.is_some()
                        || i.value.cover_url.is_some())
            })
        })
        .cloned()
        .collect();

    let confidence = field_confidence(
        1.0,
        mean_reliability(&contributing),
        usable as f64 / inputs.len() as f64,
        contributing.len(),
    );

    let reasoning = format!(
        "description from {} source(s), {} review(s), {} conflict(s)",
        descriptions.len(),
        reviews.len(),
        conflicts.len()
    );

    Ok(ReconciledField {
        value: ReconciledContent {
            description,
            table_of_contents,
            reviews,
            rating,
            cover_url,
        },
        confidence,
        sources: all_sources,
        conflicts,
        reasoning,
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn input(fields: ContentFields, source: &str, reliability: f64) -> ContentInput {
        ContentInput::new(fields, MetadataSource::new(source, reliability))
    }

    fn described(text: &str, source: &str, reliability: f64) -> ContentInput {
        input(
            ContentFields {
                description: Some(text.to_string()),
                ..Default::default()
            },
            source,
            reliability,
        )
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = reconcile_content(&[]).unwrap_err();
        assert!(err.to_string().contains("No content"));
    }

    #[test]
    fn test_description_follows_reliability() {
        let inputs = vec![
            described("Short blurb.", "strong", 0.9),
            described("A very long and detailed synopsis of the novel.", "weak", 0.5),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert_eq!(field.value.description.as_deref(), Some("Short blurb."));
    }

    #[test]
    fn test_description_tie_prefers_longer() {
        let inputs = vec![
            described("Short.", "a", 0.8),
            described("A much longer description of the same book.", "b", 0.8),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert_eq!(
            field.value.description.as_deref(),
            Some("A much longer description of the same book.")
        );
    }

    #[test]
    fn test_divergent_descriptions_flagged() {
        let inputs = vec![
            described("A sweeping space opera about a desert planet.", "a", 0.9),
            described("Cookbook with ninety quick weeknight recipes.", "b", 0.8),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert!(
            field
                .conflicts
                .iter()
                .any(|c| c.field == "content.description"),
            "dissimilar descriptions must be flagged"
        );
    }

    #[test]
    fn test_similar_descriptions_not_flagged() {
        let inputs = vec![
            described("A sweeping space opera about a desert planet.", "a", 0.9),
            described("A sweeping space opera about a desert planet!", "b", 0.8),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert!(field.conflicts.is_empty());
    }

    #[test]
    fn test_longest_toc_wins() {
        let inputs = vec![
            input(
                ContentFields {
                    table_of_contents: vec!["Ch 1".to_string()],
                    ..Default::default()
                },
                "a",
                0.9,
            ),
            input(
                ContentFields {
                    table_of_contents: vec!["Ch 1".to_string(), "Ch 2".to_string()],
                    ..Default::default()
                },
                "b",
                0.5,
            ),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert_eq!(field.value.table_of_contents.len(), 2);
    }

    #[test]
    fn test_reviews_unioned_without_duplicates() {
        let inputs = vec![
            input(
                ContentFields {
                    reviews: vec!["Great.".to_string(), "Classic.".to_string()],
                    ..Default::default()
                },
                "a",
                0.8,
            ),
            input(
                ContentFields {
                    reviews: vec!["Classic.".to_string(), "Slow start.".to_string()],
                    ..Default::default()
                },
                "b",
                0.7,
            ),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert_eq!(
            field.value.reviews,
            vec!["Great.", "Classic.", "Slow start."]
        );
    }

    #[test]
    fn test_rating_weighted_average() {
        let inputs = vec![
            input(
                ContentFields {
                    rating: Some(4.0),
                    ..Default::default()
                },
                "a",
                0.9,
            ),
            input(
                ContentFields {
                    rating: Some(3.0),
                    ..Default::default()
                },
                "b",
                0.3,
            ),
        ];
        let field = reconcile_content(&inputs).unwrap();
        let rating = field.value.rating.unwrap();
        assert!((rating - 3.75).abs() < 0.01, "got {rating}");
        assert!(field.conflicts.is_empty(), "spread of 1.0 is within bounds");
    }

    #[test]
    fn test_wide_rating_spread_conflicts() {
        let inputs = vec![
            input(
                ContentFields {
                    rating: Some(4.8),
                    ..Default::default()
                },
                "a",
                0.8,
            ),
            input(
                ContentFields {
                    rating: Some(2.0),
                    ..Default::default()
                },
                "b",
                0.8,
            ),
        ];
        let field = reconcile_content(&inputs).unwrap();
        assert!(field.conflicts.iter().any(|c| c.field == "content.rating"));
    }

    #[test]
    fn test_all_empty_floor_confidence() {
        let inputs = vec![input(ContentFields::default(), "a", 0.9)];
        let field = reconcile_content(&inputs).unwrap();
        assert_eq!(field.confidence, weights::CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_determinism() {
        let inputs = vec![
            described("A sweeping space opera.", "a", 0.9),
            described("Cookbook with recipes.", "b", 0.8),
            input(
                ContentFields {
                    rating: Some(4.2),
                    cover_url: Some("https://covers.example/1.jpg".to_string()),
                    ..Default::default()
                },
                "c",
                0.7,
            ),
        ];
        let first = reconcile_content(&inputs).unwrap();
        let second = reconcile_content(&inputs).unwrap();
        assert_eq!(first.value, second.value);
        assert_eq!(first.confidence, second.confidence);
    }
}
