//! Identifier reconciliation
//!
//! Auto-detects identifier type from string shape (ISBN, DOI, OCLC, LCCN,
//! Amazon ASIN, Goodreads, Google volume id), normalizes per type
//! (ISBN-10 is upgraded to ISBN-13 with a recomputed check digit, DOI
//! scheme prefixes stripped), validates with type-specific rules, and folds
//! agreeing values into one identifier set. Presentation order is valid
//! first, then type priority, then aggregate reliability.

use crate::reconcile::{
    collect_sources, field_confidence, group_weight, mean_reliability, weights, ReconcileError,
    SourceValue,
};
use crate::types::{Conflict, ConflictValue, MetadataSource, ReconciledField};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One raw identifier string from one source
pub type IdentifierInput = SourceValue<String>;

/// Identifier type, declared in presentation-priority order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Isbn,
    Doi,
    Oclc,
    Lccn,
    Amazon,
    Goodreads,
    Google,
    Other,
}

impl IdentifierKind {
    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::Isbn => "isbn",
            IdentifierKind::Doi => "doi",
            IdentifierKind::Oclc => "oclc",
            IdentifierKind::Lccn => "lccn",
            IdentifierKind::Amazon => "amazon",
            IdentifierKind::Goodreads => "goodreads",
            IdentifierKind::Google => "google",
            IdentifierKind::Other => "other",
        }
    }
}

/// A typed, normalized identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    /// The raw string as supplied
    pub raw: String,
    /// Canonical form (ISBN-13 digits, bare DOI, ...)
    pub normalized: String,
    /// Whether the value passed type-specific validation
    pub valid: bool,
}

// ============================================================================
// Type detection
// ============================================================================

/// Detect identifier type from string shape
pub fn detect_kind(raw: &str) -> IdentifierKind {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();

    const PREFIXES: [(&str, IdentifierKind); 8] = [
        ("isbn:", IdentifierKind::Isbn),
        ("doi:", IdentifierKind::Doi),
        ("oclc:", IdentifierKind::Oclc),
        ("lccn:", IdentifierKind::Lccn),
        ("goodreads:", IdentifierKind::Goodreads),
        ("amazon:", IdentifierKind::Amazon),
        ("asin:", IdentifierKind::Amazon),
        ("google:", IdentifierKind::Google),
    ];
    for (prefix, kind) in PREFIXES {
        if lower.starts_with(prefix) {
            return kind;
        }
    }

    if lower.starts_with("https://doi.org/")
        || lower.starts_with("http://doi.org/")
        || (lower.starts_with("10.") && trimmed.contains('/'))
    {
        return IdentifierKind::Doi;
    }
    if lower.starts_with("ocm") || lower.starts_with("ocn") || lower.starts_with("(ocolc)") {
        return IdentifierKind::Oclc;
    }

    let compact = compact_identifier(trimmed);
    if is_isbn_shape(&compact) {
        return IdentifierKind::Isbn;
    }
    if is_lccn_shape(trimmed) {
        return IdentifierKind::Lccn;
    }
    if is_asin_shape(&compact) {
        return IdentifierKind::Amazon;
    }
    if compact.len() == 12 && compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        return IdentifierKind::Google;
    }
    if !compact.is_empty() && compact.len() <= 9 && compact.chars().all(|c| c.is_ascii_digit()) {
        return IdentifierKind::Goodreads;
    }
    IdentifierKind::Other
}

fn compact_identifier(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-' && *c != ' ').collect()
}

fn is_isbn_shape(compact: &str) -> bool {
    // Char-wise: provider strings may carry non-ASCII, and byte length
    // alone does not make byte slicing safe.
    let chars: Vec<char> = compact.chars().collect();
    match chars.len() {
        13 => chars.iter().all(|c| c.is_ascii_digit()),
        10 => {
            chars[..9].iter().all(|c| c.is_ascii_digit())
                && matches!(chars[9], '0'..='9' | 'X' | 'x')
        }
        _ => false,
    }
}

// LCCN shape: 1-3 letter prefix followed by 6-10 digits, optional single
// dash (e.g. "n78-890351", "sh85026371"). A letter prefix is required to
// disambiguate from bare numbers.
fn is_lccn_shape(raw: &str) -> bool {
    let s: String = raw.chars().filter(|c| *c != ' ').collect();
    let letters: String = s.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() || letters.len() > 3 {
        return false;
    }
    let rest = &s[letters.len()..];
    let digits: String = rest.chars().filter(|c| *c != '-').collect();
    let dashes = rest.chars().filter(|c| *c == '-').count();
    dashes <= 1
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && (6..=10).contains(&digits.len())
}

fn is_asin_shape(compact: &str) -> bool {
    compact.len() == 10
        && compact.starts_with(['B', 'b'])
        && compact.chars().all(|c| c.is_ascii_alphanumeric())
        && compact.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'X' | 'x'))
}

// ============================================================================
// Normalization and validation
// ============================================================================

/// Normalize a raw identifier for its detected type
///
/// Returns the canonical form plus a validity flag. Invalid values keep
/// their compacted form; they are carried, not discarded.
pub fn normalize(raw: &str, kind: IdentifierKind) -> (String, bool) {
    let stripped = strip_prefix(raw.trim(), kind);
    match kind {
        IdentifierKind::Isbn => normalize_isbn(&stripped),
        IdentifierKind::Doi => {
            let bare = stripped
                .trim_start_matches("https://doi.org/")
                .trim_start_matches("http://doi.org/")
                .to_ascii_lowercase();
            let valid = bare.starts_with("10.") && bare.contains('/');
            (bare, valid)
        }
        IdentifierKind::Oclc => {
            let digits: String = stripped
                .to_ascii_lowercase()
                .trim_start_matches("(ocolc)")
                .trim_start_matches("ocm")
                .trim_start_matches("ocn")
                .trim_start_matches("on")
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            let valid = (4..=12).contains(&digits.len());
            (digits, valid)
        }
        IdentifierKind::Lccn => {
            let compact: String = stripped
                .chars()
                .filter(|c| *c != ' ' && *c != '-')
                .collect::<String>()
                .to_ascii_lowercase();
            let valid = is_lccn_shape(&stripped);
            (compact, valid)
        }
        IdentifierKind::Amazon => {
            let upper = compact_identifier(&stripped).to_ascii_uppercase();
            let valid = upper.len() == 10 && upper.chars().all(|c| c.is_ascii_alphanumeric());
            (upper, valid)
        }
        IdentifierKind::Goodreads => {
            let digits: String = stripped.chars().filter(|c| c.is_ascii_digit()).collect();
            let valid = !digits.is_empty();
            (digits, valid)
        }
        IdentifierKind::Google => {
            let compact = compact_identifier(&stripped);
            let valid = compact.len() == 12 && compact.chars().all(|c| c.is_ascii_alphanumeric());
            (compact, valid)
        }
        IdentifierKind::Other => (stripped.trim().to_string(), false),
    }
}

fn strip_prefix(raw: &str, kind: IdentifierKind) -> String {
    let lower = raw.to_ascii_lowercase();
    let prefixes: &[&str] = match kind {
        IdentifierKind::Isbn => &["isbn:"],
        IdentifierKind::Doi => &["doi:"],
        IdentifierKind::Oclc => &["oclc:"],
        IdentifierKind::Lccn => &["lccn:"],
        IdentifierKind::Amazon => &["amazon:", "asin:"],
        IdentifierKind::Goodreads => &["goodreads:"],
        IdentifierKind::Google => &["google:"],
        IdentifierKind::Other => &[],
    };
    for prefix in prefixes {
        if lower.starts_with(prefix) {
            return raw[prefix.len()..].trim().to_string();
        }
    }
    raw.to_string()
}

/// Normalize an ISBN: compact, upgrade ISBN-10 to ISBN-13 with a recomputed
/// check digit, validate the result
pub fn normalize_isbn(raw: &str) -> (String, bool) {
    let compact = compact_identifier(raw).to_ascii_uppercase();
    match compact.len() {
        13 if compact.chars().all(|c| c.is_ascii_digit()) => {
            let valid = validate_isbn13(&compact);
            (compact, valid)
        }
        10 if is_isbn_shape(&compact) => {
            if validate_isbn10(&compact) {
                // "978" + first nine digits + recomputed EAN-13 check digit
                let mut thirteen = String::with_capacity(13);
                thirteen.push_str("978");
                thirteen.push_str(&compact[..9]);
                let digits: Vec<u8> = thirteen
                    .bytes()
                    .map(|b| b - b'0')
                    .collect();
                thirteen.push((b'0' + isbn13_check_digit(&digits)) as char);
                (thirteen, true)
            } else {
                // Failed the ISBN-10 checksum: keep the compact form so the
                // invalid value stays visible, never forge a passing ISBN-13.
                (compact, false)
            }
        }
        _ => (compact, false),
    }
}

/// ISBN-10 checksum: sum of digit * (10 - position) must be 0 mod 11
pub fn validate_isbn10(compact: &str) -> bool {
    if compact.len() != 10 {
        return false;
    }
    let mut sum: u32 = 0;
    for (i, c) in compact.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'X' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

/// ISBN-13 (EAN) checksum: alternating 1/3 weights, sum must be 0 mod 10
pub fn validate_isbn13(compact: &str) -> bool {
    if compact.len() != 13 || !compact.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u8> = compact.bytes().map(|b| b - b'0').collect();
    let check = isbn13_check_digit(&digits[..12]);
    check == digits[12]
}

/// EAN-13 check digit over the first twelve digits
pub fn isbn13_check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .take(12)
        .enumerate()
        .map(|(i, d)| *d as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    ((10 - (sum % 10)) % 10) as u8
}

// ============================================================================
// Reconciliation
// ============================================================================

struct IdentifierGroup {
    identifier: Identifier,
    sources: Vec<MetadataSource>,
    inputs: usize,
}

/// Reconcile raw identifier strings from multiple sources
///
/// # Errors
/// `ReconcileError::EmptyInput` when called with no inputs at all.
pub fn reconcile_identifiers(
    inputs: &[IdentifierInput],
) -> Result<ReconciledField<Vec<Identifier>>, ReconcileError> {
    if inputs.is_empty() {
        return Err(ReconcileError::EmptyInput("identifiers"));
    }

    let all_sources = collect_sources(inputs.iter().map(|i| &i.source));

    // Normalize + validate; blank values are the only ones dropped.
    let mut groups: HashMap<(IdentifierKind, String), IdentifierGroup> = HashMap::new();
    let mut usable = 0usize;
    let mut valid_count = 0usize;
    for input in inputs {
        let raw = input.value.trim();
        if raw.is_empty() {
            continue;
        }
        usable += 1;
        let kind = detect_kind(raw);
        let (normalized, valid) = normalize(raw, kind);
        if valid {
            valid_count += 1;
        }
        let entry = groups
            .entry((kind, normalized.clone()))
            .or_insert_with(|| IdentifierGroup {
                identifier: Identifier {
                    kind,
                    raw: raw.to_string(),
                    normalized,
                    valid,
                },
                sources: Vec::new(),
                inputs: 0,
            });
        entry.inputs += 1;
        if !entry.sources.iter().any(|s| s.name == input.source.name) {
            entry.sources.push(input.source.clone());
        }
    }

    if groups.is_empty() {
        return Ok(ReconciledField {
            value: Vec::new(),
            confidence: weights::CONFIDENCE_FLOOR,
            sources: all_sources,
            conflicts: Vec::new(),
            reasoning: "no usable identifiers after dropping blank values".to_string(),
        });
    }

    // Per type: the group with the highest aggregate reliability wins;
    // losing groups become conflicts.
    let mut by_kind: HashMap<IdentifierKind, Vec<IdentifierGroup>> = HashMap::new();
    for (_, group) in groups {
        by_kind.entry(group.identifier.kind).or_default().push(group);
    }

    let mut winners: Vec<IdentifierGroup> = Vec::new();
    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut kinds: Vec<IdentifierKind> = by_kind.keys().copied().collect();
    kinds.sort();
    for kind in kinds {
        let mut candidates = by_kind.remove(&kind).unwrap_or_default();
        candidates.sort_by(|a, b| {
            b.identifier
                .valid
                .cmp(&a.identifier.valid)
                .then_with(|| {
                    group_weight(&b.sources)
                        .partial_cmp(&group_weight(&a.sources))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.identifier.normalized.cmp(&b.identifier.normalized))
        });
        let winner = candidates.remove(0);
        if !candidates.is_empty() {
            debug!(
                kind = kind.label(),
                losing_groups = candidates.len(),
                "Identifier disagreement"
            );
            let mut values = vec![];
            for group in std::iter::once(&winner).chain(candidates.iter()) {
                for source in &group.sources {
                    values.push(ConflictValue {
                        value: group.identifier.normalized.clone(),
                        source: source.name.clone(),
                    });
                }
            }
            let losers: Vec<String> = candidates
                .iter()
                .map(|g| g.identifier.normalized.clone())
                .collect();
            conflicts.push(Conflict {
                field: format!("identifiers.{}", kind.label()),
                values,
                resolution: format!(
                    "kept {} (combined reliability {:.2}) over {}",
                    winner.identifier.normalized,
                    group_weight(&winner.sources),
                    losers.join(", ")
                ),
            });
        }
        winners.push(winner);
    }

    // Presentation order: valid first, then type priority, then weight.
    winners.sort_by(|a, b| {
        b.identifier
            .valid
            .cmp(&a.identifier.valid)
            .then_with(|| a.identifier.kind.cmp(&b.identifier.kind))
            .then_with(|| {
                group_weight(&b.sources)
                    .partial_cmp(&group_weight(&a.sources))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let winning_inputs: usize = winners.iter().map(|g| g.inputs).sum();
    let winning_sources: Vec<MetadataSource> = winners
        .iter()
        .flat_map(|g| g.sources.iter().cloned())
        .collect();
    let max_agreement = winners.iter().map(|g| g.sources.len()).max().unwrap_or(0);

    let confidence = field_confidence(
        valid_count as f64 / usable as f64,
        mean_reliability(&winning_sources),
        winning_inputs as f64 / usable as f64,
        max_agreement,
    );

    let reasoning = format!(
        "{} identifier(s) from {} input(s); {} valid; {} conflict(s)",
        winners.len(),
        usable,
        valid_count,
        conflicts.len()
    );

    Ok(ReconciledField {
        value: winners.into_iter().map(|g| g.identifier).collect(),
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

    fn input(raw: &str, source: &str, reliability: f64) -> IdentifierInput {
        IdentifierInput::new(raw.to_string(), MetadataSource::new(source, reliability))
    }

    #[test]
    fn test_detect_isbn_shapes() {
        assert_eq!(detect_kind("978-0-14-118263-6"), IdentifierKind::Isbn);
        assert_eq!(detect_kind("0141182636"), IdentifierKind::Isbn);
        assert_eq!(detect_kind("080442957X"), IdentifierKind::Isbn);
    }

    #[test]
    fn test_detect_other_kinds() {
        assert_eq!(detect_kind("10.1000/182"), IdentifierKind::Doi);
        assert_eq!(detect_kind("https://doi.org/10.1000/182"), IdentifierKind::Doi);
        assert_eq!(detect_kind("ocm12345678"), IdentifierKind::Oclc);
        assert_eq!(detect_kind("(OCoLC)12345678"), IdentifierKind::Oclc);
        assert_eq!(detect_kind("n78-890351"), IdentifierKind::Lccn);
        assert_eq!(detect_kind("B000FC0SIS"), IdentifierKind::Amazon);
        assert_eq!(detect_kind("12345"), IdentifierKind::Goodreads);
        assert_eq!(detect_kind("zyTCAlFPjgYC"), IdentifierKind::Google);
        assert_eq!(detect_kind("not an identifier"), IdentifierKind::Other);
    }

    #[test]
    fn test_isbn10_upgraded_to_13() {
        let (normalized, valid) = normalize_isbn("0141182636");
        assert_eq!(normalized, "9780141182636");
        assert!(valid);
        assert!(validate_isbn13(&normalized), "Upgraded check digit must validate");
    }

    #[test]
    fn test_isbn10_with_x_check_digit() {
        let (normalized, valid) = normalize_isbn("080442957X");
        assert!(valid);
        assert!(validate_isbn13(&normalized));
    }

    #[test]
    fn test_invalid_isbn10_kept_invalid() {
        // Bad checksum: must not be forged into a passing ISBN-13
        let (normalized, valid) = normalize_isbn("0141182637");
        assert!(!valid);
        assert_eq!(normalized, "0141182637");
    }

    #[test]
    fn test_doi_prefix_stripping() {
        let (normalized, valid) = normalize("https://doi.org/10.1000/182", IdentifierKind::Doi);
        assert_eq!(normalized, "10.1000/182");
        assert!(valid);
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = reconcile_identifiers(&[]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("No identifiers"));
    }

    #[test]
    fn test_agreeing_isbns_merge() {
        // Same edition via ISBN-10 and dashed ISBN-13
        let inputs = vec![
            input("978-0-14-118263-6", "openlibrary", 0.8),
            input("0141182636", "worldcat", 0.9),
        ];
        let field = reconcile_identifiers(&inputs).unwrap();

        assert_eq!(field.value.len(), 1);
        let id = &field.value[0];
        assert_eq!(id.kind, IdentifierKind::Isbn);
        assert_eq!(id.normalized, "9780141182636");
        assert!(id.valid);
        assert!(field.confidence > 0.8, "confidence was {}", field.confidence);
        assert!(field.conflicts.is_empty());
        assert_eq!(field.sources.len(), 2);
    }

    #[test]
    fn test_conflicting_isbns_recorded() {
        let inputs = vec![
            input("9780441013593", "strong", 0.9),
            input("9780441172719", "weak", 0.5),
        ];
        let field = reconcile_identifiers(&inputs).unwrap();

        assert_eq!(field.value.len(), 1);
        assert_eq!(field.value[0].normalized, "9780441013593");
        assert_eq!(field.conflicts.len(), 1);
        assert_eq!(field.conflicts[0].field, "identifiers.isbn");
        assert!(field.conflicts[0].resolution.contains("9780441013593"));
        assert_eq!(field.conflicts[0].values.len(), 2);
    }

    #[test]
    fn test_presentation_order_valid_then_kind() {
        let inputs = vec![
            input("not an identifier", "a", 0.9),
            input("10.1000/182", "b", 0.6),
            input("9780141182636", "c", 0.6),
        ];
        let field = reconcile_identifiers(&inputs).unwrap();

        let kinds: Vec<IdentifierKind> = field.value.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![IdentifierKind::Isbn, IdentifierKind::Doi, IdentifierKind::Other],
            "valid first, then type priority"
        );
    }

    #[test]
    fn test_determinism() {
        let inputs = vec![
            input("9780441013593", "a", 0.7),
            input("9780441172719", "b", 0.7),
            input("10.1000/182", "c", 0.6),
        ];
        let first = reconcile_identifiers(&inputs).unwrap();
        let second = reconcile_identifiers(&inputs).unwrap();
        assert_eq!(first.value, second.value);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn test_agreement_monotonicity() {
        let base = reconcile_identifiers(&[input("9780141182636", "a", 0.9)]).unwrap();
        let more = reconcile_identifiers(&[
            input("9780141182636", "a", 0.9),
            input("9780141182636", "b", 0.9),
        ])
        .unwrap();
        assert!(
            more.confidence >= base.confidence,
            "agreeing source lowered confidence: {} -> {}",
            base.confidence,
            more.confidence
        );
    }

    #[test]
    fn test_non_ascii_input_classified_other() {
        // 10 bytes but 9 chars; must not be read as an ISBN-10 shape
        assert_eq!(detect_kind("12345678é"), IdentifierKind::Other);

        let field = reconcile_identifiers(&[input("12345678é", "a", 0.9)]).unwrap();
        assert_eq!(field.value.len(), 1);
        assert_eq!(field.value[0].kind, IdentifierKind::Other);
        assert!(!field.value[0].valid);
    }

    #[test]
    fn test_all_blank_yields_floor() {
        let field = reconcile_identifiers(&[input("  ", "a", 0.9)]).unwrap();
        assert!(field.value.is_empty());
        assert_eq!(field.confidence, weights::CONFIDENCE_FLOOR);
        assert_eq!(field.sources.len(), 1, "sources considered are still listed");
    }
}
