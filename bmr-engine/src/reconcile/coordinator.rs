//! Reconciliation coordinator
//!
//! Converts a batch of provider records into the six domain reconcilers'
//! input shapes, runs the reconcilers concurrently, and assembles the
//! unified `ReconciledMetadata` with aggregate statistics and an overall
//! confidence score.
//!
//! A dimension with no input at all gets a zero-confidence placeholder
//! instead of an error: absence of a series statement is normal, not a
//! failure.

use crate::reconcile::content::{self, ContentFields, ContentInput, ReconciledContent};
use crate::reconcile::identifiers::{self, Identifier, IdentifierInput};
use crate::reconcile::physical::{self, PhysicalDescription, PhysicalFields, PhysicalInput};
use crate::reconcile::publication::{self, Publication, PublicationFields, PublicationInput};
use crate::reconcile::series::{self, Series, SeriesInput};
use crate::reconcile::subjects::{self, Subject, SubjectInput};
use crate::reconcile::{weights, ReconcileError, SourceValue};
use crate::types::{MetadataRecord, ReconciledField};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Aggregate statistics for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Distinct providers contributing records
    pub total_sources: usize,
    /// Dimensions that received any input
    pub fields_reconciled: usize,
    pub conflicts_detected: usize,
    /// Conflicts with a recorded resolution
    pub conflicts_resolved: usize,
    pub processing_time_ms: u64,
}

/// Unified view of one book assembled from all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledMetadata {
    pub identifiers: ReconciledField<Vec<Identifier>>,
    pub subjects: ReconciledField<Vec<Subject>>,
    pub physical: ReconciledField<PhysicalDescription>,
    pub publication: ReconciledField<Publication>,
    pub content: ReconciledField<ReconciledContent>,
    pub series: ReconciledField<Option<Series>>,
    /// Mean of the populated dimensions' confidences plus a small
    /// multi-source bonus
    pub overall_confidence: f64,
    pub stats: ReconcileStats,
}

impl ReconciledMetadata {
    /// Every conflict across all six dimensions
    pub fn all_conflicts(&self) -> Vec<&crate::types::Conflict> {
        self.identifiers
            .conflicts
            .iter()
            .chain(self.subjects.conflicts.iter())
            .chain(self.physical.conflicts.iter())
            .chain(self.publication.conflicts.iter())
            .chain(self.content.conflicts.iter())
            .chain(self.series.conflicts.iter())
            .collect()
    }
}

/// Runs all six domain reconcilers over a record batch
#[derive(Debug, Default)]
pub struct ReconciliationCoordinator;

impl ReconciliationCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Reconcile a batch of provider records into a unified view
    ///
    /// # Errors
    /// `ReconcileError::EmptyInput` when the batch itself is empty.
    pub async fn reconcile(
        &self,
        records: &[MetadataRecord],
    ) -> Result<ReconciledMetadata, ReconcileError> {
        if records.is_empty() {
            return Err(ReconcileError::EmptyInput("metadata records"));
        }
        let started = Instant::now();

        let identifier_inputs = identifier_inputs(records);
        let subject_inputs = subject_inputs(records);
        let physical_inputs = physical_inputs(records);
        let publication_inputs = publication_inputs(records);
        let content_inputs = content_inputs(records);
        let series_inputs = series_inputs(records);

        debug!(
            records = records.len(),
            identifiers = identifier_inputs.len(),
            subjects = subject_inputs.len(),
            physical = physical_inputs.len(),
            publication = publication_inputs.len(),
            content = content_inputs.len(),
            series = series_inputs.len(),
            "Starting reconciliation pass"
        );

        // The reconcilers are pure CPU work but independent; join keeps the
        // shape ready for reconcilers that grow I/O (authority lookups).
        let (identifiers, subjects, physical, publication, content, series) = tokio::join!(
            async { identifiers::reconcile_identifiers(&identifier_inputs) },
            async { subjects::reconcile_subjects(&subject_inputs) },
            async { physical::reconcile_physical(&physical_inputs) },
            async { publication::reconcile_publication(&publication_inputs) },
            async { content::reconcile_content(&content_inputs) },
            async { series::reconcile_series(&series_inputs) },
        );

        // At the batch level an empty dimension is normal; the direct-call
        // error becomes a placeholder here.
        let identifiers = or_placeholder(identifiers, "no identifier inputs in batch");
        let subjects = or_placeholder(subjects, "no subject inputs in batch");
        let physical = or_placeholder(physical, "no physical inputs in batch");
        let publication = or_placeholder(publication, "no publication inputs in batch");
        let content = or_placeholder(content, "no content inputs in batch");
        let series = or_placeholder(series, "no series inputs in batch");

        let total_sources = records
            .iter()
            .map(|r| r.source.as_str())
            .collect::<HashSet<_>>()
            .len();

        let field_confidences = [
            identifiers.confidence,
            subjects.confidence,
            physical.confidence,
            publication.confidence,
            content.confidence,
            series.confidence,
        ];
        let populated: Vec<f64> = field_confidences
            .iter()
            .copied()
            .filter(|c| *c > 0.0)
            .collect();
        let base = if populated.is_empty() {
            0.0
        } else {
            populated.iter().sum::<f64>() / populated.len() as f64
        };
        let bonus = (weights::OVERALL_SOURCE_BONUS_PER * total_sources as f64)
            .min(weights::OVERALL_SOURCE_BONUS_CAP);
        let overall_confidence = (base + bonus).min(1.0);

        let conflicts_detected = identifiers.conflicts.len()
            + subjects.conflicts.len()
            + physical.conflicts.len()
            + publication.conflicts.len()
            + content.conflicts.len()
            + series.conflicts.len();
        let conflicts_resolved = [
            &identifiers.conflicts,
            &subjects.conflicts,
            &physical.conflicts,
            &publication.conflicts,
            &content.conflicts,
            &series.conflicts,
        ]
        .iter()
        .flat_map(|c| c.iter())
        .filter(|c| !c.resolution.is_empty())
        .count();

        let stats = ReconcileStats {
            total_sources,
            fields_reconciled: populated.len(),
            conflicts_detected,
            conflicts_resolved,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        if conflicts_detected > 0 {
            warn!(
                conflicts = conflicts_detected,
                sources = total_sources,
                "Reconciliation finished with unresolved disagreements recorded"
            );
        } else {
            info!(
                sources = total_sources,
                fields = stats.fields_reconciled,
                overall_confidence,
                "Reconciliation finished cleanly"
            );
        }

        Ok(ReconciledMetadata {
            identifiers,
            subjects,
            physical,
            publication,
            content,
            series,
            overall_confidence,
            stats,
        })
    }
}

fn or_placeholder<T: Default>(
    result: Result<ReconciledField<T>, ReconcileError>,
    reasoning: &str,
) -> ReconciledField<T> {
    match result {
        Ok(field) => field,
        Err(ReconcileError::EmptyInput(_)) => ReconciledField::placeholder(reasoning),
        Err(ReconcileError::InvalidInput(message)) => {
            warn!(message, "Reconciler rejected batch input");
            ReconciledField::placeholder(reasoning)
        }
    }
}

// ============================================================================
// Record-to-input conversion
// ============================================================================

fn provider_data_str<'a>(record: &'a MetadataRecord, key: &str) -> Option<&'a str> {
    record.provider_data.as_ref()?.get(key)?.as_str()
}

fn identifier_inputs(records: &[MetadataRecord]) -> Vec<IdentifierInput> {
    let mut inputs = Vec::new();
    for record in records {
        let source = record.as_source();
        if let Some(isbns) = &record.isbn {
            for isbn in isbns {
                inputs.push(SourceValue::new(isbn.clone(), source.clone()));
            }
        }
        // Non-ISBN identifiers ride in provider_data; a non-object value is
        // skipped, not fatal.
        for key in ["doi", "oclc", "lccn", "goodreads_id", "amazon_asin", "google_id"] {
            if let Some(value) = provider_data_str(record, key) {
                let prefix = match key {
                    "goodreads_id" => "goodreads",
                    "amazon_asin" => "asin",
                    "google_id" => "google",
                    other => other,
                };
                inputs.push(SourceValue::new(
                    format!("{prefix}:{value}"),
                    source.clone(),
                ));
            }
        }
    }
    inputs
}

fn subject_inputs(records: &[MetadataRecord]) -> Vec<SubjectInput> {
    let mut inputs = Vec::new();
    for record in records {
        let source = record.as_source();
        if let Some(subjects) = &record.subjects {
            for subject in subjects {
                inputs.push(SourceValue::new(subject.clone(), source.clone()));
            }
        }
    }
    inputs
}

fn physical_inputs(records: &[MetadataRecord]) -> Vec<PhysicalInput> {
    records
        .iter()
        .filter_map(|record| {
            let fields = PhysicalFields {
                page_count: record.page_count,
                extent_text: provider_data_str(record, "extent").map(str::to_string),
                dimensions_text: record.physical_dimensions.clone(),
                binding_text: provider_data_str(record, "binding").map(str::to_string),
                weight_text: provider_data_str(record, "weight").map(str::to_string),
            };
            let has_any = fields.page_count.is_some()
                || fields.extent_text.is_some()
                || fields.dimensions_text.is_some()
                || fields.binding_text.is_some()
                || fields.weight_text.is_some();
            has_any.then(|| SourceValue::new(fields, record.as_source()))
        })
        .collect()
}

fn publication_inputs(records: &[MetadataRecord]) -> Vec<PublicationInput> {
    records
        .iter()
        .filter_map(|record| {
            let fields = PublicationFields {
                date_text: record.publication_date.clone(),
                publisher: record.publisher.clone(),
                place: provider_data_str(record, "publication_place").map(str::to_string),
            };
            let has_any =
                fields.date_text.is_some() || fields.publisher.is_some() || fields.place.is_some();
            has_any.then(|| SourceValue::new(fields, record.as_source()))
        })
        .collect()
}

fn content_inputs(records: &[MetadataRecord]) -> Vec<ContentInput> {
    records
        .iter()
        .filter_map(|record| {
            let data = record.provider_data.as_ref();
            let table_of_contents: Vec<String> = data
                .and_then(|d| d.get("table_of_contents"))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let reviews: Vec<String> = data
                .and_then(|d| d.get("reviews"))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let rating = data.and_then(|d| d.get("rating")).and_then(|v| v.as_f64());

            let fields = ContentFields {
                description: record.description.clone(),
                table_of_contents,
                reviews,
                rating,
                cover_url: record.cover_image.clone(),
            };
            let has_any = fields.description.is_some()
                || !fields.table_of_contents.is_empty()
                || !fields.reviews.is_empty()
                || fields.rating.is_some()
                || fields.cover_url.is_some();
            has_any.then(|| SourceValue::new(fields, record.as_source()))
        })
        .collect()
}

fn series_inputs(records: &[MetadataRecord]) -> Vec<SeriesInput> {
    records
        .iter()
        .filter_map(|record| {
            record
                .series
                .clone()
                .map(|s| SourceValue::new(s, record.as_source()))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(source: &str, confidence: f64) -> MetadataRecord {
        MetadataRecord::new(format!("rec-{source}"), source, confidence)
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let coordinator = ReconciliationCoordinator::new();
        let err = coordinator.reconcile(&[]).await.unwrap_err();
        assert!(err.to_string().contains("No metadata records"));
    }

    #[tokio::test]
    async fn test_single_record_minimal_fields() {
        let mut r = record("openlibrary", 0.8);
        r.isbn = Some(vec!["9780141182636".to_string()]);
        r.subjects = Some(vec!["Fiction".to_string()]);

        let coordinator = ReconciliationCoordinator::new();
        let result = coordinator.reconcile(&[r]).await.unwrap();

        assert_eq!(result.identifiers.value.len(), 1);
        assert_eq!(result.subjects.value.len(), 1);
        // Dimensions with no input are placeholders, not errors
        assert_eq!(result.series.confidence, 0.0);
        assert!(result.series.value.is_none());
        assert_eq!(result.physical.confidence, 0.0);
        assert_eq!(result.stats.total_sources, 1);
        assert_eq!(result.stats.fields_reconciled, 2);
    }

    #[tokio::test]
    async fn test_full_batch_reconciles_all_dimensions() {
        let mut a = record("openlibrary", 0.85);
        a.isbn = Some(vec!["978-0-14-118263-6".to_string()]);
        a.subjects = Some(vec!["Science Fiction".to_string()]);
        a.page_count = Some(320);
        a.publication_date = Some("1969".to_string());
        a.publisher = Some("Penguin Books".to_string());
        a.description = Some("A classic of the genre.".to_string());
        a.series = Some("Dune Chronicles #1".to_string());
        a.cover_image = Some("https://covers.example/a.jpg".to_string());

        let mut b = record("googlebooks", 0.75);
        b.isbn = Some(vec!["0141182636".to_string()]);
        b.subjects = Some(vec!["Sci-Fi".to_string()]);
        b.page_count = Some(324);
        b.publication_date = Some("1969-06-01".to_string());
        b.publisher = Some("Penguin Books Ltd".to_string());
        b.provider_data = Some(json!({
            "binding": "Paperback",
            "rating": 4.3,
            "oclc": "ocm12345678",
        }));

        let coordinator = ReconciliationCoordinator::new();
        let result = coordinator.reconcile(&[a, b]).await.unwrap();

        // Two ISBN spellings merged, OCLC carried from provider_data
        assert_eq!(result.identifiers.value.len(), 2);
        assert!(result.identifiers.value.iter().all(|i| i.valid));

        assert_eq!(result.subjects.value.len(), 1, "variants collapse");
        assert!(result.physical.value.page_count.is_some());
        let date = result.publication.value.date.unwrap();
        assert_eq!(date.year, 1969);
        assert_eq!(date.day, Some(1), "most precise same-year claim wins");
        assert!(result.content.value.rating.is_some());
        assert_eq!(result.series.value.as_ref().unwrap().name, "Dune Chronicles");

        assert_eq!(result.stats.total_sources, 2);
        assert_eq!(result.stats.fields_reconciled, 6);
        assert!(result.overall_confidence > 0.5);
    }

    #[tokio::test]
    async fn test_malformed_provider_data_skipped() {
        let mut r = record("flaky", 0.6);
        r.isbn = Some(vec!["9780141182636".to_string()]);
        // provider_data that is not an object must not break conversion
        r.provider_data = Some(json!("not an object"));

        let coordinator = ReconciliationCoordinator::new();
        let result = coordinator.reconcile(&[r]).await.unwrap();
        assert_eq!(result.identifiers.value.len(), 1);
    }

    #[tokio::test]
    async fn test_overall_confidence_rises_with_sources() {
        let mut one = record("a", 0.8);
        one.isbn = Some(vec!["9780141182636".to_string()]);

        let mut two_a = record("a", 0.8);
        two_a.isbn = Some(vec!["9780141182636".to_string()]);
        let mut two_b = record("b", 0.8);
        two_b.isbn = Some(vec!["9780141182636".to_string()]);

        let coordinator = ReconciliationCoordinator::new();
        let single = coordinator.reconcile(&[one]).await.unwrap();
        let double = coordinator.reconcile(&[two_a, two_b]).await.unwrap();

        assert!(
            double.overall_confidence > single.overall_confidence,
            "{} vs {}",
            double.overall_confidence,
            single.overall_confidence
        );
    }

    #[tokio::test]
    async fn test_conflicts_counted_in_stats() {
        let mut a = record("strong", 0.9);
        a.publication_date = Some("1969".to_string());
        let mut b = record("weak", 0.4);
        b.publication_date = Some("1971".to_string());

        let coordinator = ReconciliationCoordinator::new();
        let result = coordinator.reconcile(&[a, b]).await.unwrap();

        assert!(result.stats.conflicts_detected >= 1);
        assert_eq!(
            result.stats.conflicts_detected,
            result.all_conflicts().len()
        );
    }
}
