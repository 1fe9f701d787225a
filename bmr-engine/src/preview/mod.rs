//! Preview / duplicate engine
//!
//! Turns reconciled (or raw) metadata into a user-facing `LibraryPreview`:
//! the proposed entry with source attribution, per-field quality grades,
//! duplicate matches against the existing library, edition selection, series
//! relationships, and ranked recommendations. Reconciled values always take
//! precedence; raw records only fill fields reconciliation did not cover.

pub mod duplicates;
pub mod editions;
pub mod quality;
pub mod series_links;

pub use duplicates::{DuplicateAction, DuplicateMatch, MatchType};
pub use editions::{EditionAlternative, EditionSelection, EditionSummary};
pub use quality::{FieldQuality, QualityLevel, QualityThresholds};
pub use series_links::SeriesRelationships;

use crate::reconcile::identifiers::IdentifierKind;
use crate::reconcile::physical::BindingFormat;
use crate::reconcile::publication::parse_date;
use crate::reconcile::ReconciledMetadata;
use crate::types::{Conflict, ConflictValue, MetadataRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

// ============================================================================
// Shapes
// ============================================================================

/// One entry already in the user's library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub isbn: Vec<String>,
    pub year: Option<i32>,
    pub series_name: Option<String>,
    pub series_position: Option<f64>,
}

/// The entry the preview proposes to add
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposedEntry {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub isbn: Vec<String>,
    pub year: Option<i32>,
    pub publisher: Option<String>,
    pub series_name: Option<String>,
    pub series_position: Option<f64>,
    pub page_count: Option<u32>,
    pub format: BindingFormat,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub cover_url: Option<String>,
}

/// One source's normalized contribution weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWeight {
    pub name: String,
    /// Normalized weight; all weights sum to 1
    pub weight: f64,
}

/// Which sources fed the proposed entry, weighted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribution {
    /// Highest-reliability contributing source
    pub primary: String,
    pub weights: Vec<SourceWeight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    AddToLibrary,
    SkipDuplicate,
    MergeWithExisting,
    ReviewConflicts,
    VerifyField,
    CompleteSeries,
}

/// One ranked suggestion synthesized from the preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub message: String,
    pub actions: Vec<String>,
}

/// Options controlling preview construction
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub quality_thresholds: QualityThresholds,
    /// Re-derive field disagreements from raw records for display
    pub include_conflict_report: bool,
}

/// The complete user-facing preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryPreview {
    pub entry: ProposedEntry,
    pub confidence: f64,
    pub sources: SourceAttribution,
    pub duplicates: Vec<DuplicateMatch>,
    pub edition_selection: Option<EditionSelection>,
    pub series_relationships: Option<SeriesRelationships>,
    pub recommendations: Vec<Recommendation>,
    /// Quality grade per populated field, keyed by field name
    pub quality: BTreeMap<String, FieldQuality>,
    /// Present only when requested in `PreviewOptions`
    pub conflict_report: Option<Vec<Conflict>>,
}

// ============================================================================
// Engine
// ============================================================================

/// Builds previews; constructed once and reused across queries
#[derive(Debug, Default)]
pub struct PreviewEngine {
    options: PreviewOptions,
}

impl PreviewEngine {
    pub fn new(options: PreviewOptions) -> Self {
        Self { options }
    }

    /// Build a preview from raw records and optional reconciled metadata
    ///
    /// Reconciled values win; raw records fill the rest from the
    /// most-reliable source that has each field.
    pub fn build_preview(
        &self,
        records: &[MetadataRecord],
        reconciled: Option<&ReconciledMetadata>,
        library: &[LibraryEntry],
    ) -> LibraryPreview {
        // Most-reliable-first view of the raw records for fallback fields
        let mut ranked: Vec<&MetadataRecord> = records.iter().collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
        });

        let entry = self.assemble_entry(&ranked, reconciled);
        let sources = attribute_sources(&ranked);
        let quality = self.grade(&entry, &ranked, reconciled);

        let duplicates = duplicates::find_duplicates(&entry, library);
        let edition_selection = editions::select_edition(records);
        let series_relationships = reconciled
            .and_then(|r| r.series.value.as_ref())
            .and_then(|series| series_links::infer_relationships(series, library));

        let confidence = reconciled
            .map(|r| r.overall_confidence)
            .unwrap_or_else(|| {
                if ranked.is_empty() {
                    0.0
                } else {
                    ranked.iter().map(|r| r.confidence).sum::<f64>() / ranked.len() as f64
                }
            });

        let recommendations = self.recommend(
            &entry,
            &duplicates,
            &quality,
            series_relationships.as_ref(),
            reconciled,
        );

        let conflict_report = self
            .options
            .include_conflict_report
            .then(|| derive_conflict_report(records));

        info!(
            title = entry.title.as_deref().unwrap_or("<untitled>"),
            duplicates = duplicates.len(),
            recommendations = recommendations.len(),
            confidence,
            "Preview built"
        );

        LibraryPreview {
            entry,
            confidence,
            sources,
            duplicates,
            edition_selection,
            series_relationships,
            recommendations,
            quality,
            conflict_report,
        }
    }

    fn assemble_entry(
        &self,
        ranked: &[&MetadataRecord],
        reconciled: Option<&ReconciledMetadata>,
    ) -> ProposedEntry {
        let mut entry = ProposedEntry::default();

        // Title and authors have no dedicated reconciler; the best raw
        // source supplies them.
        entry.title = first_field(ranked, |r| r.title.clone());
        entry.authors = first_field(ranked, |r| r.authors.clone()).unwrap_or_default();

        if let Some(r) = reconciled {
            entry.isbn = r
                .identifiers
                .value
                .iter()
                .filter(|i| i.kind == IdentifierKind::Isbn && i.valid)
                .map(|i| i.normalized.clone())
                .collect();
            entry.subjects = r.subjects.value.iter().map(|s| s.name.clone()).collect();
            entry.page_count = r.physical.value.page_count;
            entry.format = r.physical.value.format;
            entry.year = r.publication.value.date.map(|d| d.year);
            entry.publisher = r.publication.value.publisher.clone();
            entry.description = r.content.value.description.clone();
            entry.cover_url = r.content.value.cover_url.clone();
            if let Some(series) = &r.series.value {
                entry.series_name = Some(series.name.clone());
                entry.series_position = series.position;
            }
        }

        // Raw fallback for anything still empty
        if entry.isbn.is_empty() {
            entry.isbn = first_field(ranked, |r| r.isbn.clone()).unwrap_or_default();
        }
        if entry.subjects.is_empty() {
            entry.subjects = first_field(ranked, |r| r.subjects.clone()).unwrap_or_default();
        }
        if entry.page_count.is_none() {
            entry.page_count = first_field(ranked, |r| r.page_count);
        }
        if entry.year.is_none() {
            entry.year = ranked
                .iter()
                .find_map(|r| r.publication_date.as_deref().and_then(parse_date))
                .map(|d| d.year);
        }
        if entry.publisher.is_none() {
            entry.publisher = first_field(ranked, |r| r.publisher.clone());
        }
        if entry.description.is_none() {
            entry.description = first_field(ranked, |r| r.description.clone());
        }
        if entry.cover_url.is_none() {
            entry.cover_url = first_field(ranked, |r| r.cover_image.clone());
        }
        if entry.series_name.is_none() {
            if let Some(raw) = first_field(ranked, |r| r.series.clone()) {
                if let Some(series) = crate::reconcile::series::parse_series(&raw) {
                    entry.series_name = Some(series.name);
                    entry.series_position = series.position;
                }
            }
        }

        debug!(
            title = entry.title.as_deref().unwrap_or("<untitled>"),
            isbns = entry.isbn.len(),
            "Assembled proposed entry"
        );
        entry
    }

    fn grade(
        &self,
        entry: &ProposedEntry,
        ranked: &[&MetadataRecord],
        reconciled: Option<&ReconciledMetadata>,
    ) -> BTreeMap<String, FieldQuality> {
        let thresholds = &self.options.quality_thresholds;
        let mut quality = BTreeMap::new();

        if let Some(r) = reconciled {
            let dimensions: [(&str, f64, usize, usize); 6] = [
                (
                    "identifiers",
                    r.identifiers.confidence,
                    r.identifiers.sources.len(),
                    r.identifiers.conflicts.len(),
                ),
                (
                    "subjects",
                    r.subjects.confidence,
                    r.subjects.sources.len(),
                    r.subjects.conflicts.len(),
                ),
                (
                    "physical",
                    r.physical.confidence,
                    r.physical.sources.len(),
                    r.physical.conflicts.len(),
                ),
                (
                    "publication",
                    r.publication.confidence,
                    r.publication.sources.len(),
                    r.publication.conflicts.len(),
                ),
                (
                    "content",
                    r.content.confidence,
                    r.content.sources.len(),
                    r.content.conflicts.len(),
                ),
                (
                    "series",
                    r.series.confidence,
                    r.series.sources.len(),
                    r.series.conflicts.len(),
                ),
            ];
            for (name, confidence, source_count, conflict_count) in dimensions {
                if confidence > 0.0 {
                    quality.insert(
                        name.to_string(),
                        quality::grade_field(confidence, source_count, conflict_count, thresholds),
                    );
                }
            }
        }

        // Fallback-only fields are graded from the supplying record
        if entry.title.is_some() && !quality.contains_key("title") {
            let supporting = ranked.iter().filter(|r| r.title.is_some()).count();
            let best = ranked
                .iter()
                .filter_map(|r| r.title.as_ref().map(|_| r.confidence))
                .next()
                .unwrap_or(0.0);
            quality.insert(
                "title".to_string(),
                quality::grade_field(best, supporting, 0, thresholds),
            );
        }
        if !entry.authors.is_empty() && !quality.contains_key("authors") {
            let supporting = ranked.iter().filter(|r| r.authors.is_some()).count();
            let best = ranked
                .iter()
                .filter_map(|r| r.authors.as_ref().map(|_| r.confidence))
                .next()
                .unwrap_or(0.0);
            quality.insert(
                "authors".to_string(),
                quality::grade_field(best, supporting, 0, thresholds),
            );
        }

        quality
    }

    fn recommend(
        &self,
        entry: &ProposedEntry,
        duplicates: &[DuplicateMatch],
        quality: &BTreeMap<String, FieldQuality>,
        series: Option<&SeriesRelationships>,
        reconciled: Option<&ReconciledMetadata>,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        match duplicates.first() {
            Some(best) if best.match_type == MatchType::Exact => {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::SkipDuplicate,
                    priority: Priority::High,
                    message: format!(
                        "already in the library as '{}' ({})",
                        best.existing.title, best.explanation
                    ),
                    actions: vec!["skip".to_string(), "view existing entry".to_string()],
                });
            }
            Some(best) if best.match_type == MatchType::DifferentEdition => {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::MergeWithExisting,
                    priority: Priority::High,
                    message: best.explanation.clone(),
                    actions: vec!["merge editions".to_string(), "add separately".to_string()],
                });
            }
            Some(best) => {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::ReviewConflicts,
                    priority: Priority::Medium,
                    message: format!("possible duplicate: {}", best.explanation),
                    actions: vec!["compare entries".to_string()],
                });
            }
            None => {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::AddToLibrary,
                    priority: Priority::Medium,
                    message: format!(
                        "'{}' appears new to the library",
                        entry.title.as_deref().unwrap_or("this work")
                    ),
                    actions: vec!["add".to_string()],
                });
            }
        }

        let conflict_total = reconciled
            .map(|r| r.stats.conflicts_detected)
            .unwrap_or(0);
        if conflict_total > 0 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ReviewConflicts,
                priority: Priority::Medium,
                message: format!("{conflict_total} source disagreement(s) recorded"),
                actions: vec!["review conflicts".to_string()],
            });
        }

        for (field, grade) in quality {
            if grade.level == QualityLevel::Poor {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::VerifyField,
                    priority: Priority::Low,
                    message: format!("{field} quality is poor (score {:.2})", grade.score),
                    actions: grade.suggestions.clone(),
                });
            }
        }

        if let Some(series) = series {
            if !series.missing_positions.is_empty() {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::CompleteSeries,
                    priority: Priority::Low,
                    message: format!(
                        "'{}' is missing volume(s) {}",
                        series.series_name,
                        series
                            .missing_positions
                            .iter()
                            .map(|p| p.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    actions: vec!["search for missing volumes".to_string()],
                });
            }
        }

        recommendations.sort_by_key(|r| r.priority);
        recommendations
    }
}

fn first_field<T>(ranked: &[&MetadataRecord], get: impl Fn(&MetadataRecord) -> Option<T>) -> Option<T> {
    ranked.iter().find_map(|r| get(r))
}

fn attribute_sources(ranked: &[&MetadataRecord]) -> SourceAttribution {
    let mut names: Vec<(String, f64)> = Vec::new();
    for record in ranked {
        match names.iter_mut().find(|(name, _)| *name == record.source) {
            Some((_, weight)) => *weight = weight.max(record.confidence),
            None => names.push((record.source.clone(), record.confidence)),
        }
    }
    let total: f64 = names.iter().map(|(_, w)| w).sum();
    let primary = names
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name.clone())
        .unwrap_or_default();
    let weights = names
        .into_iter()
        .map(|(name, weight)| SourceWeight {
            name,
            weight: if total > 0.0 { weight / total } else { 0.0 },
        })
        .collect();
    SourceAttribution { primary, weights }
}

/// Presentation-time re-derivation of raw field disagreements
///
/// Independent of reconciliation: shows what the sources said verbatim even
/// where a reconciler already picked a winner.
fn derive_conflict_report(records: &[MetadataRecord]) -> Vec<Conflict> {
    let mut report = Vec::new();
    let fields: [(&str, fn(&MetadataRecord) -> Option<String>); 4] = [
        ("title", |r| r.title.clone()),
        ("publisher", |r| r.publisher.clone()),
        ("publication_date", |r| r.publication_date.clone()),
        ("series", |r| r.series.clone()),
    ];
    for (field, get) in fields {
        let mut values: Vec<ConflictValue> = Vec::new();
        for record in records {
            if let Some(value) = get(record) {
                values.push(ConflictValue {
                    value,
                    source: record.source.clone(),
                });
            }
        }
        let distinct: std::collections::HashSet<&str> =
            values.iter().map(|v| v.value.as_str()).collect();
        if distinct.len() > 1 {
            report.push(Conflict {
                field: field.to_string(),
                values,
                resolution: String::new(),
            });
        }
    }
    report
}

// ============================================================================
// Tests
// ============================================================================
