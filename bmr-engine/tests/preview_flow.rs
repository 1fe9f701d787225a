//! Preview and duplicate detection across the public surface

use bmr_engine::preview::duplicates::{compare, MatchType};
use bmr_engine::preview::{LibraryEntry, PreviewEngine, PreviewOptions, ProposedEntry};
use bmr_engine::types::MetadataRecord;
use bmr_engine::ReconciliationCoordinator;

fn dune_proposed() -> ProposedEntry {
    ProposedEntry {
        title: Some("Dune".to_string()),
        authors: vec!["Frank Herbert".to_string()],
        isbn: vec!["9780441013593".to_string()],
        ..Default::default()
    }
}

fn library_entry(id: &str, isbn: &str) -> LibraryEntry {
    LibraryEntry {
        id: id.to_string(),
        title: "Dune".to_string(),
        authors: vec!["Frank Herbert".to_string()],
        isbn: vec![isbn.to_string()],
        year: None,
        series_name: None,
        series_position: None,
    }
}

#[test]
fn same_work_with_different_isbn_is_flagged() {
    // Same title and author, disjoint ISBNs: must surface as exact or
    // likely, never be silently ignored.
    let existing = library_entry("lib-1", "9780441172719");
    let m = compare(&dune_proposed(), &existing).expect("match must surface");
    assert!(
        matches!(m.match_type, MatchType::Exact | MatchType::Likely),
        "got {:?} at {}",
        m.match_type,
        m.similarity
    );
}

#[tokio::test]
async fn full_pipeline_produces_a_complete_preview() {
    let mut a = MetadataRecord::new("ol-1", "openlibrary", 0.85);
    a.title = Some("Dune".to_string());
    a.authors = Some(vec!["Frank Herbert".to_string()]);
    a.isbn = Some(vec!["9780441013593".to_string()]);
    a.publication_date = Some("1965".to_string());
    a.publisher = Some("Chilton Books".to_string());
    a.subjects = Some(vec!["Science Fiction".to_string()]);
    a.series = Some("Dune Chronicles #1".to_string());

    let mut b = MetadataRecord::new("gb-1", "googlebooks", 0.75);
    b.title = Some("Dune".to_string());
    b.isbn = Some(vec!["0441013597".to_string()]);
    b.subjects = Some(vec!["Sci-Fi".to_string()]);

    let records = vec![a, b];
    let reconciled = ReconciliationCoordinator::new()
        .reconcile(&records)
        .await
        .unwrap();

    let engine = PreviewEngine::new(PreviewOptions {
        include_conflict_report: true,
        ..Default::default()
    });
    let preview = engine.build_preview(&records, Some(&reconciled), &[]);

    assert_eq!(preview.entry.title.as_deref(), Some("Dune"));
    // ISBN-10 and ISBN-13 spellings of the same edition collapsed
    assert_eq!(preview.entry.isbn, vec!["9780441013593"]);
    assert_eq!(preview.entry.year, Some(1965));
    assert_eq!(preview.entry.subjects.len(), 1);
    assert_eq!(preview.entry.series_name.as_deref(), Some("Dune Chronicles"));

    assert!(preview.confidence > 0.0);
    assert!(!preview.quality.is_empty());
    assert!(!preview.recommendations.is_empty());
    assert!(preview.conflict_report.is_some());

    let total: f64 = preview.sources.weights.iter().map(|w| w.weight).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn exact_library_match_is_reported_first() {
    let engine = PreviewEngine::default();
    let mut record = MetadataRecord::new("1", "openlibrary", 0.9);
    record.title = Some("Dune".to_string());
    record.authors = Some(vec!["Frank Herbert".to_string()]);
    record.isbn = Some(vec!["9780441013593".to_string()]);

    let library = vec![
        library_entry("other-edition", "9780441172719"),
        library_entry("same-edition", "9780441013593"),
    ];
    let preview = engine.build_preview(&[record], None, &library);

    assert!(preview.duplicates.len() >= 2);
    assert_eq!(preview.duplicates[0].existing.id, "same-edition");
    assert_eq!(preview.duplicates[0].match_type, MatchType::Exact);
}
