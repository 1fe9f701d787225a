//! Edition selection
//!
//! When providers return several editions of the same work, scores each
//! candidate by recency, field completeness, and binding desirability, picks
//! the best, and exposes the rest as alternatives with their stated
//! advantages.

use crate::reconcile::physical::{detect_binding, BindingFormat};
use crate::reconcile::publication::parse_date;
use crate::reconcile::weights;
use crate::types::MetadataRecord;
use serde::{Deserialize, Serialize};

/// One edition candidate distilled from a provider record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditionSummary {
    /// (record id, source) of the originating record
    pub record_id: String,
    pub source: String,
    pub title: Option<String>,
    pub isbn: Vec<String>,
    pub year: Option<i32>,
    pub format: BindingFormat,
    pub page_count: Option<u32>,
    /// Fraction of optional record fields populated
    pub completeness: f64,
    pub score: f64,
}

/// A non-selected edition and why someone might still want it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditionAlternative {
    pub edition: EditionSummary,
    pub advantages: Vec<String>,
}

/// The chosen edition plus ranked alternatives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditionSelection {
    pub selected: EditionSummary,
    pub alternatives: Vec<EditionAlternative>,
    pub reasoning: String,
}

fn record_completeness(record: &MetadataRecord) -> f64 {
    let populated = [
        record.title.is_some(),
        record.authors.is_some(),
        record.isbn.is_some(),
        record.publication_date.is_some(),
        record.subjects.is_some(),
        record.description.is_some(),
        record.language.is_some(),
        record.publisher.is_some(),
        record.series.is_some(),
        record.page_count.is_some(),
        record.physical_dimensions.is_some(),
        record.cover_image.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    populated as f64 / 12.0
}

fn binding_score(format: BindingFormat) -> f64 {
    match format {
        BindingFormat::Hardcover => weights::BINDING_SCORE_HARDCOVER,
        BindingFormat::Paperback => weights::BINDING_SCORE_PAPERBACK,
        BindingFormat::MassMarket => weights::BINDING_SCORE_MASS_MARKET,
        BindingFormat::Ebook => weights::BINDING_SCORE_EBOOK,
        BindingFormat::Audiobook => weights::BINDING_SCORE_AUDIOBOOK,
        BindingFormat::Unknown => weights::BINDING_SCORE_UNKNOWN,
    }
}

fn summarize(record: &MetadataRecord) -> EditionSummary {
    let year = record
        .publication_date
        .as_deref()
        .and_then(parse_date)
        .map(|d| d.year);
    let format = record
        .provider_data
        .as_ref()
        .and_then(|d| d.get("binding"))
        .and_then(|v| v.as_str())
        .map(detect_binding)
        .unwrap_or(BindingFormat::Unknown);
    EditionSummary {
        record_id: record.id.clone(),
        source: record.source.clone(),
        title: record.title.clone(),
        isbn: record.isbn.clone().unwrap_or_default(),
        year,
        format,
        page_count: record.page_count,
        completeness: record_completeness(record),
        score: 0.0,
    }
}

/// Score and rank edition candidates; `None` for an empty batch
pub fn select_edition(records: &[MetadataRecord]) -> Option<EditionSelection> {
    if records.is_empty() {
        return None;
    }

    let mut summaries: Vec<EditionSummary> = records.iter().map(summarize).collect();

    // Recency normalized across the candidate set
    let years: Vec<i32> = summaries.iter().filter_map(|s| s.year).collect();
    let (min_year, max_year) = match (years.iter().min(), years.iter().max()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => (0, 0),
    };
    let span = (max_year - min_year).max(1) as f64;

    for summary in &mut summaries {
        let recency = match summary.year {
            Some(year) if max_year > min_year => (year - min_year) as f64 / span,
            Some(_) => 1.0,
            None => 0.0,
        };
        summary.score = weights::EDITION_WEIGHT_RECENCY * recency
            + weights::EDITION_WEIGHT_COMPLETENESS * summary.completeness
            + weights::EDITION_WEIGHT_BINDING * binding_score(summary.format);
    }

    summaries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });

    let selected = summaries.remove(0);
    let alternatives: Vec<EditionAlternative> = summaries
        .into_iter()
        .map(|edition| {
            let mut advantages = Vec::new();
            if let (Some(alt_year), Some(sel_year)) = (edition.year, selected.year) {
                if alt_year > sel_year {
                    advantages.push(format!("more recent ({alt_year})"));
                }
            }
            if edition.completeness > selected.completeness {
                advantages.push("more complete metadata".to_string());
            }
            if binding_score(edition.format) > binding_score(selected.format) {
                advantages.push(format!("preferred binding ({})", edition.format.label()));
            }
            if advantages.is_empty() {
                advantages.push("alternative source".to_string());
            }
            EditionAlternative { edition, advantages }
        })
        .collect();

    let reasoning = format!(
        "selected {} edition from {} (score {:.2}, completeness {:.0}%), {} alternative(s)",
        selected.format.label(),
        selected.source,
        selected.score,
        selected.completeness * 100.0,
        alternatives.len()
    );

    Some(EditionSelection {
        selected,
        alternatives,
        reasoning,
    })
}
