//! Subject and classification reconciliation
//!
//! Detects classification scheme from string shape (Dewey, LCC, BISAC,
//! LCSH hierarchy), normalizes free-text headings through an alias table,
//! classifies each heading as subject / genre / keyword / tag, and merges
//! near-equivalent headings across sources with Jaro-Winkler similarity.

use crate::reconcile::{
    collect_sources, field_confidence, group_weight, weights, ReconcileError, SourceValue,
};
use crate::types::{Conflict, ConflictValue, MetadataSource, ReconciledField};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::debug;

/// One raw subject heading from one source
pub type SubjectInput = SourceValue<String>;

/// Classification scheme detected from string shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectScheme {
    /// Dewey Decimal, e.g. "823.912"
    Dewey,
    /// Library of Congress Classification, e.g. "PR6023.A93"
    Lcc,
    /// BISAC code, e.g. "FIC028000"
    Bisac,
    /// LC Subject Heading hierarchy, e.g. "Fiction -- Science Fiction"
    Lcsh,
    Unknown,
}

/// Role a heading plays in the reconciled set, in presentation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Subject,
    Genre,
    Keyword,
    Tag,
}

/// A normalized, classified subject heading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Display form (first-seen raw text, trimmed)
    pub name: String,
    /// Canonical comparison form
    pub normalized: String,
    pub scheme: SubjectScheme,
    /// Hierarchy levels for LCSH-style headings, broadest first
    pub hierarchy: Vec<String>,
    pub kind: SubjectKind,
}

// ============================================================================
// Scheme detection and normalization
// ============================================================================

/// Detect classification scheme from string shape
pub fn detect_scheme(raw: &str) -> SubjectScheme {
    let trimmed = raw.trim();
    if trimmed.contains(" -- ") {
        return SubjectScheme::Lcsh;
    }
    if is_dewey_shape(trimmed) {
        return SubjectScheme::Dewey;
    }
    if is_bisac_shape(trimmed) {
        return SubjectScheme::Bisac;
    }
    if is_lcc_shape(trimmed) {
        return SubjectScheme::Lcc;
    }
    SubjectScheme::Unknown
}

// Dewey: three digits, optional decimal part ("823", "823.912")
fn is_dewey_shape(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    if whole.len() != 3 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match parts.next() {
        None => true,
        Some(frac) => !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit()),
    }
}

// BISAC: exactly three uppercase letters then six digits ("FIC028000").
// Char-wise so a non-ASCII heading of the right byte length cannot land
// a slice inside a multi-byte character.
fn is_bisac_shape(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    chars.len() == 9
        && chars[..3].iter().all(|c| c.is_ascii_uppercase())
        && chars[3..].iter().all(|c| c.is_ascii_digit())
}

// LCC: 1-3 uppercase letters followed by digits ("PR6023", "PS3537.T4753")
fn is_lcc_shape(s: &str) -> bool {
    let letters: String = s.chars().take_while(|c| c.is_ascii_uppercase()).collect();
    if letters.is_empty() || letters.len() > 3 {
        return false;
    }
    let rest = &s[letters.len()..];
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
        && rest.chars().all(|c| c.is_ascii_digit() || c == '.' || c.is_ascii_uppercase())
}

/// Spelling variants folded to one canonical heading
const ALIASES: [(&str, &str); 6] = [
    ("sci fi", "science fiction"),
    ("sci fi fiction", "science fiction"),
    ("scifi", "science fiction"),
    ("sf", "science fiction"),
    ("ya", "young adult"),
    ("lit crit", "literary criticism"),
];

/// Canonical comparison form: lowercase, punctuation to spaces, collapsed
/// whitespace, alias table applied
pub fn normalize_heading(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    for (alias, canonical) in ALIASES {
        if collapsed == alias {
            return canonical.to_string();
        }
    }
    collapsed
}

/// Words that mark a heading as a genre rather than a topical subject
const GENRE_TERMS: [&str; 14] = [
    "fiction",
    "nonfiction",
    "fantasy",
    "mystery",
    "thriller",
    "romance",
    "horror",
    "biography",
    "memoir",
    "poetry",
    "drama",
    "western",
    "dystopia",
    "satire",
];

fn classify(normalized: &str, scheme: SubjectScheme, hierarchy: &[String]) -> SubjectKind {
    if scheme != SubjectScheme::Unknown || hierarchy.len() > 1 {
        return SubjectKind::Subject;
    }
    if GENRE_TERMS.iter().any(|term| {
        normalized == *term || normalized.split_whitespace().any(|word| word == *term)
    }) {
        return SubjectKind::Genre;
    }
    if normalized.contains(' ') {
        SubjectKind::Keyword
    } else {
        SubjectKind::Tag
    }
}

fn parse_subject(raw: &str) -> Subject {
    let trimmed = raw.trim();
    let scheme = detect_scheme(trimmed);
    let hierarchy: Vec<String> = if scheme == SubjectScheme::Lcsh {
        trimmed.split(" -- ").map(|part| part.trim().to_string()).collect()
    } else {
        Vec::new()
    };
    // Codes compare case-insensitively verbatim; headings go through
    // the alias-folding normalizer.
    let normalized = match scheme {
        SubjectScheme::Dewey | SubjectScheme::Lcc | SubjectScheme::Bisac => {
            trimmed.to_lowercase()
        }
        _ => normalize_heading(trimmed),
    };
    let kind = classify(&normalized, scheme, &hierarchy);
    Subject {
        name: trimmed.to_string(),
        normalized,
        scheme,
        hierarchy,
        kind,
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

struct SubjectGroup {
    subject: Subject,
    sources: Vec<MetadataSource>,
    inputs: usize,
}

/// Reconcile subject headings from multiple sources
///
/// Exact normalized matches merge directly; free-text headings within
/// Jaro-Winkler 0.92 of an existing group merge into it and are recorded as
/// a resolved spelling conflict.
///
/// # Errors
/// `ReconcileError::EmptyInput` when called with no inputs at all.
pub fn reconcile_subjects(
    inputs: &[SubjectInput],
) -> Result<ReconciledField<Vec<Subject>>, ReconcileError> {
    if inputs.is_empty() {
        return Err(ReconcileError::EmptyInput("subjects"));
    }

    let all_sources = collect_sources(inputs.iter().map(|i| &i.source));

    let mut groups: Vec<SubjectGroup> = Vec::new();
    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut usable = 0usize;

    for input in inputs {
        let raw = input.value.trim();
        if raw.is_empty() {
            continue;
        }
        usable += 1;
        let subject = parse_subject(raw);

        if let Some(group) = groups
            .iter_mut()
            .find(|g| g.subject.normalized == subject.normalized && g.subject.scheme == subject.scheme)
        {
            group.inputs += 1;
            if !group.sources.iter().any(|s| s.name == input.source.name) {
                group.sources.push(input.source.clone());
            }
            continue;
        }

        // Fuzzy merge for free-text headings only; codes never fuzz.
        let fuzzy_target = (subject.scheme == SubjectScheme::Unknown).then(|| {
            groups
                .iter()
                .enumerate()
                .filter(|(_, g)| g.subject.scheme == SubjectScheme::Unknown)
                .map(|(i, g)| (i, jaro_winkler(&g.subject.normalized, &subject.normalized)))
                .filter(|(_, sim)| *sim >= weights::SUBJECT_MERGE_SIMILARITY)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        if let Some(Some((index, similarity))) = fuzzy_target {
            let group = &mut groups[index];
            debug!(
                kept = %group.subject.name,
                merged = %subject.name,
                similarity,
                "Merged near-equivalent subject heading"
            );
            conflicts.push(Conflict {
                field: "subjects".to_string(),
                values: vec![
                    ConflictValue {
                        value: group.subject.name.clone(),
                        source: group
                            .sources
                            .first()
                            .map(|s| s.name.clone())
                            .unwrap_or_default(),
                    },
                    ConflictValue {
                        value: subject.name.clone(),
                        source: input.source.name.clone(),
                    },
                ],
                resolution: format!(
                    "merged '{}' into '{}' (similarity {:.2})",
                    subject.name, group.subject.name, similarity
                ),
            });
            group.inputs += 1;
            if !group.sources.iter().any(|s| s.name == input.source.name) {
                group.sources.push(input.source.clone());
            }
            continue;
        }

        groups.push(SubjectGroup {
            subject,
            sources: vec![input.source.clone()],
            inputs: 1,
        });
    }

    if groups.is_empty() {
        return Ok(ReconciledField {
            value: Vec::new(),
            confidence: weights::CONFIDENCE_FLOOR,
            sources: all_sources,
            conflicts: Vec::new(),
            reasoning: "no usable subject headings after dropping blank values".to_string(),
        });
    }

    // Subjects, then genres, then keywords, then tags; within a kind the
    // best-supported heading leads.
    groups.sort_by(|a, b| {
        a.subject
            .kind
            .cmp(&b.subject.kind)
            .then_with(|| {
                group_weight(&b.sources)
                    .partial_cmp(&group_weight(&a.sources))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.subject.normalized.cmp(&b.subject.normalized))
    });

    let max_agreement = groups.iter().map(|g| g.sources.len()).max().unwrap_or(0);
    let winning_sources: Vec<MetadataSource> = groups
        .iter()
        .flat_map(|g| g.sources.iter().cloned())
        .collect();

    // Every group survives into the value, so support is full; the score
    // differentiates on reliability and cross-source agreement.
    let confidence = field_confidence(
        1.0,
        crate::reconcile::mean_reliability(&winning_sources),
        1.0,
        max_agreement,
    );

    let reasoning = format!(
        "{} heading(s) from {} input(s); {} merge(s)",
        groups.len(),
        usable,
        conflicts.len()
    );

    Ok(ReconciledField {
        value: groups.into_iter().map(|g| g.subject).collect(),
        confidence,
        sources: all_sources,
        conflicts,
        reasoning,
    })
}

// ============================================================================
// Tests
// ============================================================================
