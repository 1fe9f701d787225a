//! Core types for the reconciliation engine
//!
//! Defines the shapes that flow between the three layers:
//! - Provider answers (`MetadataRecord`) produced by the query coordinator
//! - Reconciliation outputs (`ReconciledField`, `Conflict`)
//! - Query criteria consumed by providers
//!
//! Records are created per query, consumed within one reconciliation pass,
//! and never mutated. Everything here is pure data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source confidence / reliability score (0.0-1.0)
pub type Confidence = f64;

// ============================================================================
// Provenance
// ============================================================================

/// Provenance weight for one source's contribution
///
/// Used in every reconciliation decision: higher-reliability sources win
/// conflicts and contribute more to weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSource {
    /// Source (provider) name
    pub name: String,
    /// Reliability weight (0.0-1.0)
    pub reliability: Confidence,
    /// When this source produced its answer
    pub timestamp: DateTime<Utc>,
}

impl MetadataSource {
    /// Create a source with clamped reliability and the current timestamp
    pub fn new(name: impl Into<String>, reliability: f64) -> Self {
        Self {
            name: name.into(),
            reliability: reliability.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Provider answers
// ============================================================================

/// One provider's answer to a query
///
/// Every field beyond the identity triple is optional: providers return only
/// what they know. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Provider-scoped record id (dedup key together with `source`)
    pub id: String,
    /// Provider name that produced this record
    pub source: String,
    /// Provider's confidence in this record (0.0-1.0)
    pub confidence: Confidence,
    /// When the record was produced
    pub timestamp: DateTime<Utc>,

    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub isbn: Option<Vec<String>>,
    pub publication_date: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub page_count: Option<u32>,
    pub physical_dimensions: Option<String>,
    pub cover_image: Option<String>,
    /// Provider-specific extras (identifiers, binding, rating, ...)
    pub provider_data: Option<serde_json::Value>,
}

impl MetadataRecord {
    /// Create a bare record; optional fields filled by the caller
    pub fn new(id: impl Into<String>, source: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            title: None,
            authors: None,
            isbn: None,
            publication_date: None,
            subjects: None,
            description: None,
            language: None,
            publisher: None,
            series: None,
            page_count: None,
            physical_dimensions: None,
            cover_image: None,
            provider_data: None,
        }
    }

    /// Provenance view of this record (record confidence as reliability weight)
    pub fn as_source(&self) -> MetadataSource {
        MetadataSource {
            name: self.source.clone(),
            reliability: self.confidence,
            timestamp: self.timestamp,
        }
    }
}

// ============================================================================
// Reconciliation outputs
// ============================================================================

/// Universal reconciliation output unit
///
/// `confidence` reflects agreement strength and source reliability, never a
/// constant. `sources` lists every source considered, losing ones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledField<T> {
    /// Winning (or synthesized) value
    pub value: T,
    /// Field confidence (0.0-1.0)
    pub confidence: Confidence,
    /// Every source considered for this field
    pub sources: Vec<MetadataSource>,
    /// Disagreements that survived value selection
    pub conflicts: Vec<Conflict>,
    /// Human-readable account of how the value was chosen
    pub reasoning: String,
}

impl<T: Default> ReconciledField<T> {
    /// Zero-confidence placeholder for a dimension with no input
    ///
    /// Distinguishes "never tried" (this, confidence 0.0) from "tried, found
    /// nothing usable" (reconciler output floored at 0.1).
    pub fn placeholder(reasoning: impl Into<String>) -> Self {
        Self {
            value: T::default(),
            confidence: 0.0,
            sources: Vec::new(),
            conflicts: Vec::new(),
            reasoning: reasoning.into(),
        }
    }
}

/// A recorded disagreement between sources for one field
///
/// Conflicts are never silently dropped; minority views survive here for
/// downstream review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Field path, e.g. "identifiers.isbn"
    pub field: String,
    /// The disagreeing values with their sources
    pub values: Vec<ConflictValue>,
    /// Human-readable resolution ("kept X over Y: higher combined reliability")
    pub resolution: String,
}

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictValue {
    pub value: String,
    pub source: String,
}

// ============================================================================
// Query criteria
// ============================================================================

/// Title search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleQuery {
    pub title: String,
    /// Require an exact title match instead of fuzzy search
    #[serde(default)]
    pub exact_match: bool,
}

/// Creator (author/editor) search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorQuery {
    pub name: String,
    /// Allow fuzzy name matching
    #[serde(default)]
    pub fuzzy: bool,
}

/// Multi-criteria search query; all present fields are AND-ed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiCriteriaQuery {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub isbn: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    /// Inclusive publication year range
    pub year_range: Option<(i32, i32)>,
    #[serde(default)]
    pub fuzzy: bool,
}

/// Search criteria dispatched to providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchCriteria {
    Title(TitleQuery),
    Isbn(String),
    Creator(CreatorQuery),
    Multi(MultiCriteriaQuery),
}

// ============================================================================
// Provider data types
// ============================================================================

/// Bibliographic dimensions a provider may or may not cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Title,
    Authors,
    Isbn,
    PublicationDate,
    Subjects,
    Description,
    Language,
    Publisher,
    Series,
    PageCount,
    PhysicalDimensions,
    CoverImage,
}

impl DataType {
    /// All data types, for reliability table construction
    pub const ALL: [DataType; 12] = [
        DataType::Title,
        DataType::Authors,
        DataType::Isbn,
        DataType::PublicationDate,
        DataType::Subjects,
        DataType::Description,
        DataType::Language,
        DataType::Publisher,
        DataType::Series,
        DataType::PageCount,
        DataType::PhysicalDimensions,
        DataType::CoverImage,
    ];
}

// ============================================================================
// Tests
// ============================================================================
