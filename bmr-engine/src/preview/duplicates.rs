//! Duplicate detection against an existing library
//!
//! Compares a proposed entry against each library entry with weighted field
//! similarity: Jaro-Winkler for titles, Jaccard over normalized author and
//! ISBN sets, exact-or-adjacent for years. Weights renormalize over the
//! fields actually present on both sides, so a missing year does not dilute
//! a strong title/author match.

use crate::preview::{LibraryEntry, ProposedEntry};
use crate::reconcile::weights;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strsim::jaro_winkler;
use tracing::debug;

/// Similarity band classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Likely,
    Possible,
    /// Same work, different edition (disjoint ISBNs, matching title/author)
    DifferentEdition,
}

/// What to do about a detected duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    Skip,
    Merge,
    ReviewManually,
}

/// One library entry that resembles the proposed entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub existing: LibraryEntry,
    pub similarity: f64,
    pub match_type: MatchType,
    /// Fields whose individual similarity cleared the match bar
    pub matching_fields: Vec<String>,
    pub confidence: f64,
    pub recommendation: DuplicateAction,
    pub explanation: String,
}

fn normalize_for_match(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<String> = a.iter().map(|s| normalize_for_match(s)).collect();
    let set_b: HashSet<String> = b.iter().map(|s| normalize_for_match(s)).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn year_similarity(a: i32, b: i32) -> f64 {
    match (a - b).abs() {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    }
}

/// Compare one proposed entry against one library entry
///
/// Returns `None` when overall similarity falls below the discard floor.
pub fn compare(proposed: &ProposedEntry, existing: &LibraryEntry) -> Option<DuplicateMatch> {
    let mut weighted = 0.0;
    let mut weight_total = 0.0;
    let mut matching_fields = Vec::new();

    let title_sim = match (&proposed.title, &existing.title) {
        (Some(a), b) if !b.is_empty() => {
            let sim = jaro_winkler(&normalize_for_match(a), &normalize_for_match(b));
            weighted += sim * weights::DUP_WEIGHT_TITLE;
            weight_total += weights::DUP_WEIGHT_TITLE;
            if sim >= weights::DUP_FIELD_MATCH {
                matching_fields.push("title".to_string());
            }
            Some(sim)
        }
        _ => None,
    };

    let author_sim = if !proposed.authors.is_empty() && !existing.authors.is_empty() {
        let sim = jaccard(&proposed.authors, &existing.authors);
        weighted += sim * weights::DUP_WEIGHT_AUTHORS;
        weight_total += weights::DUP_WEIGHT_AUTHORS;
        if sim >= weights::DUP_FIELD_MATCH {
            matching_fields.push("authors".to_string());
        }
        Some(sim)
    } else {
        None
    };

    let isbn_sim = if !proposed.isbn.is_empty() && !existing.isbn.is_empty() {
        let sim = jaccard(&proposed.isbn, &existing.isbn);
        weighted += sim * weights::DUP_WEIGHT_ISBN;
        weight_total += weights::DUP_WEIGHT_ISBN;
        if sim >= weights::DUP_FIELD_MATCH {
            matching_fields.push("isbn".to_string());
        }
        Some(sim)
    } else {
        None
    };

    if let (Some(a), Some(b)) = (proposed.year, existing.year) {
        let sim = year_similarity(a, b);
        weighted += sim * weights::DUP_WEIGHT_YEAR;
        weight_total += weights::DUP_WEIGHT_YEAR;
        if sim >= weights::DUP_FIELD_MATCH {
            matching_fields.push("year".to_string());
        }
    }

    if weight_total == 0.0 {
        return None;
    }
    let similarity = weighted / weight_total;
    if similarity < weights::DUP_FLOOR {
        return None;
    }

    // Disjoint ISBNs with a strong title/author match mean another edition
    // of the same work, not a straight duplicate.
    let disjoint_isbn = isbn_sim == Some(0.0);
    let strong_work_match = title_sim.map_or(false, |s| s >= weights::DUP_BAND_EXACT)
        && author_sim.map_or(true, |s| s >= weights::DUP_FIELD_MATCH);

    let match_type = if similarity >= weights::DUP_BAND_EXACT {
        MatchType::Exact
    } else if similarity >= weights::DUP_BAND_LIKELY {
        MatchType::Likely
    } else if disjoint_isbn && strong_work_match {
        MatchType::DifferentEdition
    } else {
        MatchType::Possible
    };

    let recommendation = match match_type {
        MatchType::Exact => DuplicateAction::Skip,
        MatchType::DifferentEdition => DuplicateAction::Merge,
        MatchType::Likely | MatchType::Possible => DuplicateAction::ReviewManually,
    };

    let explanation = match match_type {
        MatchType::Exact => format!(
            "matches '{}' on {} (similarity {:.2})",
            existing.title,
            matching_fields.join(", "),
            similarity
        ),
        MatchType::DifferentEdition => format!(
            "same work as '{}' with different ISBNs; likely another edition",
            existing.title
        ),
        MatchType::Likely => format!(
            "strongly resembles '{}' (similarity {:.2}); matching: {}",
            existing.title,
            similarity,
            matching_fields.join(", ")
        ),
        MatchType::Possible => format!(
            "partially resembles '{}' (similarity {:.2})",
            existing.title, similarity
        ),
    };

    debug!(
        existing = %existing.title,
        similarity,
        match_type = ?match_type,
        "Duplicate candidate"
    );

    Some(DuplicateMatch {
        existing: existing.clone(),
        similarity,
        match_type,
        matching_fields,
        confidence: similarity,
        recommendation,
        explanation,
    })
}

/// Find all duplicate candidates in the library, best match first
pub fn find_duplicates(proposed: &ProposedEntry, library: &[LibraryEntry]) -> Vec<DuplicateMatch> {
    let mut matches: Vec<DuplicateMatch> = library
        .iter()
        .filter_map(|entry| compare(proposed, entry))
        .collect();
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.existing.id.cmp(&b.existing.id))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposed(title: &str, authors: &[&str], isbn: &[&str]) -> ProposedEntry {
        ProposedEntry {
            title: Some(title.to_string()),
            authors: authors.iter().map(|s| s.to_string()).collect(),
            isbn: isbn.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn existing(id: &str, title: &str, authors: &[&str], isbn: &[&str]) -> LibraryEntry {
        LibraryEntry {
            id: id.to_string(),
            title: title.to_string(),
            authors: authors.iter().map(|s| s.to_string()).collect(),
            isbn: isbn.iter().map(|s| s.to_string()).collect(),
            year: None,
            series_name: None,
            series_position: None,
        }
    }

    #[test]
    fn test_identical_entries_are_exact() {
        let p = proposed("Dune", &["Frank Herbert"], &["9780441013593"]);
        let e = existing("1", "Dune", &["Frank Herbert"], &["9780441013593"]);
        let m = compare(&p, &e).unwrap();
        assert_eq!(m.match_type, MatchType::Exact);
        assert_eq!(m.recommendation, DuplicateAction::Skip);
    }

    #[test]
    fn test_same_work_different_isbn_is_never_ignored() {
        // Same title and author, disjoint ISBNs, no year on either side
        let p = proposed("Dune", &["Frank Herbert"], &["9780441013593"]);
        let e = existing("1", "Dune", &["Frank Herbert"], &["9780441172719"]);
        let m = compare(&p, &e).expect("must not be silently discarded");
        assert!(
            matches!(m.match_type, MatchType::Exact | MatchType::Likely),
            "got {:?} at similarity {}",
            m.match_type,
            m.similarity
        );
    }

    #[test]
    fn test_unrelated_entries_discarded() {
        let p = proposed("Dune", &["Frank Herbert"], &["9780441013593"]);
        let e = existing("1", "Pride and Prejudice", &["Jane Austen"], &["9780141439518"]);
        assert!(compare(&p, &e).is_none());
    }

    #[test]
    fn test_author_jaccard_partial_overlap() {
        assert_eq!(
            jaccard(
                &["Frank Herbert".to_string(), "Brian Herbert".to_string()],
                &["Frank Herbert".to_string()]
            ),
            0.5
        );
    }

    #[test]
    fn test_case_and_punctuation_insensitive_title() {
        let p = proposed("DUNE!", &["Frank Herbert"], &[]);
        let e = existing("1", "dune", &["frank herbert"], &[]);
        let m = compare(&p, &e).unwrap();
        assert_eq!(m.match_type, MatchType::Exact);
    }

    #[test]
    fn test_year_adjacent_counts_half() {
        assert_eq!(year_similarity(1965, 1965), 1.0);
        assert_eq!(year_similarity(1965, 1966), 0.5);
        assert_eq!(year_similarity(1965, 1970), 0.0);
    }

    #[test]
    fn test_find_duplicates_sorted_best_first() {
        let p = proposed("Dune", &["Frank Herbert"], &["9780441013593"]);
        let library = vec![
            existing("near", "Dune Messiah", &["Frank Herbert"], &["9780441172696"]),
            existing("best", "Dune", &["Frank Herbert"], &["9780441013593"]),
        ];
        let matches = find_duplicates(&p, &library);
        assert!(!matches.is_empty());
        assert_eq!(matches[0].existing.id, "best");
    }

    #[test]
    fn test_missing_year_does_not_dilute() {
        let with_isbn = proposed("Dune", &["Frank Herbert"], &["9780441013593"]);
        let e = existing("1", "Dune", &["Frank Herbert"], &["9780441013593"]);
        let m = compare(&with_isbn, &e).unwrap();
        assert!(
            m.similarity > 0.99,
            "absent year must renormalize, got {}",
            m.similarity
        );
    }
}
