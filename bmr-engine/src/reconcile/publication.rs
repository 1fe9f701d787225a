//! Publication reconciliation: dates, publishers, places
//!
//! Dates arrive in catalog shapes ("2008", "2008-05-13", "May 2008",
//! "c1969", "[1998]") and carry explicit precision; same-year claims merge
//! to the most precise one. Publisher names merge across imprint spelling
//! variants with Jaro-Winkler, the highest aggregate reliability winning.

use crate::reconcile::{
    collect_sources, field_confidence, group_weight, mean_reliability, weights, ReconcileError,
    SourceValue,
};
use crate::types::{Conflict, ConflictValue, MetadataSource, ReconciledField};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::debug;

/// Raw publication fields from one source
#[derive(Debug, Clone, Default)]
pub struct PublicationFields {
    pub date_text: Option<String>,
    pub publisher: Option<String>,
    pub place: Option<String>,
}

pub type PublicationInput = SourceValue<PublicationFields>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// A publication date at its stated precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub precision: DatePrecision,
}

impl PublicationDate {
    pub fn year_only(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
            precision: DatePrecision::Year,
        }
    }

    pub fn display(&self) -> String {
        match (self.month, self.day) {
            (Some(m), Some(d)) => format!("{:04}-{:02}-{:02}", self.year, m, d),
            (Some(m), None) => format!("{:04}-{:02}", self.year, m),
            _ => format!("{:04}", self.year),
        }
    }
}

/// Reconciled publication facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub date: Option<PublicationDate>,
    pub publisher: Option<String>,
    pub place: Option<String>,
}

// ============================================================================
// Date parsing
// ============================================================================

const MONTH_NAMES: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

/// Parse a catalog date string at its stated precision
///
/// Accepted shapes: "2008", "2008-05", "2008-05-13", "May 2008",
/// "13 May 2008", plus bracketed/copyrighted years "c1969" and "[1998]".
pub fn parse_date(text: &str) -> Option<PublicationDate> {
    let cleaned: String = text
        .trim()
        .trim_start_matches(['c', 'C', '©'])
        .chars()
        .filter(|c| *c != '[' && *c != ']' && *c != '.' && *c != ',')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    // ISO-ish: YYYY[-MM[-DD]] or YYYY/MM/DD
    let iso: Vec<&str> = cleaned.split(['-', '/']).collect();
    if let Ok(year) = iso[0].parse::<i32>() {
        if iso[0].len() == 4 && plausible_year(year) {
            let month = iso.get(1).and_then(|m| m.parse::<u32>().ok());
            let day = iso.get(2).and_then(|d| d.parse::<u32>().ok());
            return match (month, day) {
                (Some(m), Some(d)) if (1..=12).contains(&m) && (1..=31).contains(&d) => {
                    Some(PublicationDate {
                        year,
                        month: Some(m),
                        day: Some(d),
                        precision: DatePrecision::Day,
                    })
                }
                (Some(m), _) if (1..=12).contains(&m) => Some(PublicationDate {
                    year,
                    month: Some(m),
                    day: None,
                    precision: DatePrecision::Month,
                }),
                _ => Some(PublicationDate::year_only(year)),
            };
        }
    }

    // Month-name shapes: "May 2008", "13 May 2008"
    let lower = cleaned.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    let month = tokens.iter().find_map(|tok| {
        MONTH_NAMES
            .iter()
            .find(|(name, _)| tok.starts_with(name))
            .map(|(_, n)| *n)
    });
    let year = tokens
        .iter()
        .filter_map(|tok| tok.parse::<i32>().ok())
        .find(|y| plausible_year(*y))?;
    let day = tokens
        .iter()
        .filter_map(|tok| tok.parse::<u32>().ok())
        .find(|d| (1..=31).contains(d) && *d as i32 != year);

    match (month, day) {
        (Some(m), Some(d)) => Some(PublicationDate {
            year,
            month: Some(m),
            day: Some(d),
            precision: DatePrecision::Day,
        }),
        (Some(m), None) => Some(PublicationDate {
            year,
            month: Some(m),
            day: None,
            precision: DatePrecision::Month,
        }),
        _ => Some(PublicationDate::year_only(year)),
    }
}

fn plausible_year(year: i32) -> bool {
    (1000..=2200).contains(&year)
}

/// Canonical publisher comparison form: lowercase, punctuation folded,
/// corporate suffixes dropped
pub fn normalize_publisher(raw: &str) -> String {
    const SUFFIXES: [&str; 8] = [
        "inc", "ltd", "llc", "co", "company", "publishers", "publishing", "press",
    ];
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = folded
        .split_whitespace()
        .filter(|w| !SUFFIXES.contains(w))
        .collect();
    if words.is_empty() {
        folded.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        words.join(" ")
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

struct DateGroup {
    /// Most precise claim seen for this year
    best: PublicationDate,
    sources: Vec<MetadataSource>,
    claims: usize,
}

struct NameGroup {
    display: String,
    normalized: String,
    sources: Vec<MetadataSource>,
}

fn fold_names(
    claims: impl Iterator<Item = (String, MetadataSource)>,
    threshold: f64,
) -> Vec<NameGroup> {
    let mut groups: Vec<NameGroup> = Vec::new();
    for (raw, source) in claims {
        let normalized = normalize_publisher(&raw);
        if normalized.is_empty() {
            continue;
        }
        let merged = groups.iter_mut().find(|g| {
            g.normalized == normalized || jaro_winkler(&g.normalized, &normalized) >= threshold
        });
        match merged {
            Some(group) => {
                if !group.sources.iter().any(|s| s.name == source.name) {
                    group.sources.push(source);
                }
            }
            None => groups.push(NameGroup {
                display: raw.trim().to_string(),
                normalized,
                sources: vec![source],
            }),
        }
    }
    groups.sort_by(|a, b| {
        group_weight(&b.sources)
            .partial_cmp(&group_weight(&a.sources))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.normalized.cmp(&b.normalized))
    });
    groups
}

fn name_conflict(field: &str, groups: &[NameGroup]) -> Option<Conflict> {
    if groups.len() < 2 {
        return None;
    }
    Some(Conflict {
        field: field.to_string(),
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
    })
}

/// Reconcile publication fields from multiple sources
///
/// # Errors
/// `ReconcileError::EmptyInput` when called with no inputs at all.
pub fn reconcile_publication(
    inputs: &[PublicationInput],
) -> Result<ReconciledField<Publication>, ReconcileError> {
    if inputs.is_empty() {
        return Err(ReconcileError::EmptyInput("publication fields"));
    }

    let all_sources = collect_sources(inputs.iter().map(|i| &i.source));
    let mut conflicts: Vec<Conflict> = Vec::new();

    // ---- Dates: group by year, keep the most precise claim per year
    let mut date_groups: Vec<DateGroup> = Vec::new();
    let mut date_claims = 0usize;
    for input in inputs {
        let Some(date) = input.value.date_text.as_deref().and_then(parse_date) else {
            continue;
        };
        date_claims += 1;
        match date_groups.iter_mut().find(|g| g.best.year == date.year) {
            Some(group) => {
                if date.precision > group.best.precision {
                    group.best = date;
                }
                group.claims += 1;
                if !group.sources.iter().any(|s| s.name == input.source.name) {
                    group.sources.push(input.source.clone());
                }
            }
            None => date_groups.push(DateGroup {
                best: date,
                sources: vec![input.source.clone()],
                claims: 1,
            }),
        }
    }
    date_groups.sort_by(|a, b| {
        group_weight(&b.sources)
            .partial_cmp(&group_weight(&a.sources))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.best.year.cmp(&b.best.year))
    });

    let date = date_groups.first().map(|g| g.best);
    if date_groups.len() > 1 {
        debug!(
            winner = date_groups[0].best.year,
            groups = date_groups.len(),
            "Publication year disagreement"
        );
        conflicts.push(Conflict {
            field: "publication.date".to_string(),
            values: date_groups
                .iter()
                .flat_map(|g| {
                    g.sources.iter().map(|s| ConflictValue {
                        value: g.best.display(),
                        source: s.name.clone(),
                    })
                })
                .collect(),
            resolution: format!(
                "kept {} (combined reliability {:.2}) over {}",
                date_groups[0].best.display(),
                group_weight(&date_groups[0].sources),
                date_groups[1..]
                    .iter()
                    .map(|g| g.best.display())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }

    // ---- Publisher: fuzzy imprint merge, best aggregate reliability wins
    let publisher_groups = fold_names(
        inputs.iter().filter_map(|i| {
            i.value
                .publisher
                .clone()
                .map(|p| (p, i.source.clone()))
        }),
        weights::PUBLISHER_MERGE_SIMILARITY,
    );
    let publisher = publisher_groups.first().map(|g| g.display.clone());
    conflicts.extend(name_conflict("publication.publisher", &publisher_groups));

    // ---- Place: exact-ish merge with the same machinery, tighter threshold
    let place_groups = fold_names(
        inputs
            .iter()
            .filter_map(|i| i.value.place.clone().map(|p| (p, i.source.clone()))),
        0.95,
    );
    let place = place_groups.first().map(|g| g.display.clone());
    conflicts.extend(name_conflict("publication.place", &place_groups));

    let usable = inputs
        .iter()
        .filter(|i| {
            i.value.date_text.is_some() || i.value.publisher.is_some() || i.value.place.is_some()
        })
        .count();

    if usable == 0 {
        return Ok(ReconciledField {
            value: Publication {
                date: None,
                publisher: None,
                place: None,
            },
            confidence: weights::CONFIDENCE_FLOOR,
            sources: all_sources,
            conflicts,
            reasoning: "no usable publication fields in any input".to_string(),
        });
    }

    let winning_sources = date_groups
        .first()
        .map(|g| g.sources.clone())
        .or_else(|| publisher_groups.first().map(|g| g.sources.clone()))
        .unwrap_or_else(|| all_sources.clone());
    let support = date_groups
        .first()
        .map(|g| g.claims as f64 / date_claims.max(1) as f64)
        .unwrap_or(1.0);

    let confidence = field_confidence(
        1.0,
        mean_reliability(&winning_sources),
        support,
        winning_sources.len(),
    );

    let reasoning = format!(
        "date {:?}, publisher {:?}, {} conflict(s) from {} usable input(s)",
        date.map(|d| d.display()),
        publisher,
        conflicts.len(),
        usable
    );

    Ok(ReconciledField {
        value: Publication {
            date,
            publisher,
            place,
        },
        confidence,
        sources: all_sources,
        conflicts,
        reasoning,
    })
}

// ============================================================================
// Tests
// ============================================================================
