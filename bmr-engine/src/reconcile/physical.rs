//! Physical description reconciliation
//!
//! Extracts page counts, dimensions, binding format, and weight from the
//! free-text physical fields catalog records carry ("xii, 324 pages ; 24 cm",
//! "8.5 x 5.5 x 1.2 inches", "1.2 pounds"). Page counts within tolerance of
//! each other are the same printing; the representative is the
//! reliability-weighted average of the winning group.

use crate::reconcile::{
    collect_sources, field_confidence, group_weight, mean_reliability, weights, ReconcileError,
    SourceValue,
};
use crate::types::{Conflict, ConflictValue, MetadataSource, ReconciledField};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Raw physical fields from one source
#[derive(Debug, Clone, Default)]
pub struct PhysicalFields {
    pub page_count: Option<u32>,
    /// Free-text extent, e.g. "xii, 324 pages ; 24 cm"
    pub extent_text: Option<String>,
    /// Free-text dimensions, e.g. "8.5 x 5.5 x 1.2 inches"
    pub dimensions_text: Option<String>,
    /// Free-text binding, e.g. "Trade paperback"
    pub binding_text: Option<String>,
    /// Free-text weight, e.g. "1.2 pounds"
    pub weight_text: Option<String>,
}

pub type PhysicalInput = SourceValue<PhysicalFields>;

/// Millimeter dimensions, largest axis first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDimensions {
    pub height_mm: f64,
    pub width_mm: f64,
    pub thickness_mm: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingFormat {
    Hardcover,
    Paperback,
    MassMarket,
    Ebook,
    Audiobook,
    #[default]
    Unknown,
}

impl BindingFormat {
    pub fn label(&self) -> &'static str {
        match self {
            BindingFormat::Hardcover => "hardcover",
            BindingFormat::Paperback => "paperback",
            BindingFormat::MassMarket => "mass market",
            BindingFormat::Ebook => "ebook",
            BindingFormat::Audiobook => "audiobook",
            BindingFormat::Unknown => "unknown",
        }
    }

    /// Physical books have pages and dimensions; ebooks and audiobooks
    /// should not.
    pub fn is_physical(&self) -> bool {
        matches!(
            self,
            BindingFormat::Hardcover | BindingFormat::Paperback | BindingFormat::MassMarket
        )
    }
}

/// Reconciled physical description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDescription {
    pub page_count: Option<u32>,
    pub dimensions: Option<PhysicalDimensions>,
    pub format: BindingFormat,
    pub weight_grams: Option<f64>,
}

// ============================================================================
// Free-text parsing
// ============================================================================

/// Largest plausible integer in the text is the page count; roman-numeral
/// front matter and "24 cm" trailers fall below or outside the range.
pub fn extract_page_count(text: &str) -> Option<u32> {
    let mut best: Option<u32> = None;
    let mut current = String::new();
    for c in text.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            current.push(c);
        } else {
            if !current.is_empty() {
                if let Ok(n) = current.parse::<u32>() {
                    if (weights::MIN_PAGE_COUNT..=weights::MAX_PAGE_COUNT).contains(&n)
                        && best.map_or(true, |b| n > b)
                    {
                        best = Some(n);
                    }
                }
                current.clear();
            }
        }
    }
    best
}

/// Parse "H x W [x T] <unit>" dimension text into millimeters
pub fn parse_dimensions(text: &str) -> Option<PhysicalDimensions> {
    let lower = text.trim().to_lowercase();
    let factor = if lower.contains("mm") {
        1.0
    } else if lower.contains("cm") {
        10.0
    } else if lower.contains("in") || lower.contains('"') {
        25.4
    } else {
        // Bare numbers: centimeters are the common catalog convention
        10.0
    };

    let numeric: String = lower
        .chars()
        .map(|c| {
            if c.is_ascii_digit() || c == '.' {
                c
            } else if c == 'x' || c == '×' {
                'x'
            } else {
                ' '
            }
        })
        .collect();
    let mut values: Vec<f64> = Vec::new();
    for part in numeric.split('x') {
        let first = part.split_whitespace().find_map(|tok| tok.parse::<f64>().ok());
        match first {
            Some(v) if v > 0.0 => values.push(v * factor),
            _ => {}
        }
    }

    // Largest axis is height regardless of stated order
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    match values.len() {
        0 => None,
        1 => Some(PhysicalDimensions {
            height_mm: values[0],
            width_mm: values[0],
            thickness_mm: None,
        }),
        2 => Some(PhysicalDimensions {
            height_mm: values[0],
            width_mm: values[1],
            thickness_mm: None,
        }),
        _ => Some(PhysicalDimensions {
            height_mm: values[0],
            width_mm: values[1],
            thickness_mm: Some(values[2]),
        }),
    }
}

/// Keyword-match a binding description
pub fn detect_binding(text: &str) -> BindingFormat {
    let lower = text.to_lowercase();
    if lower.contains("mass market") || lower.contains("mass-market") {
        BindingFormat::MassMarket
    } else if lower.contains("hardcover")
        || lower.contains("hardback")
        || lower.contains("cloth")
        || lower.contains("library binding")
    {
        BindingFormat::Hardcover
    } else if lower.contains("paperback")
        || lower.contains("softcover")
        || lower.contains("trade paper")
    {
        BindingFormat::Paperback
    } else if lower.contains("ebook")
        || lower.contains("e-book")
        || lower.contains("kindle")
        || lower.contains("epub")
        || lower.contains("digital")
    {
        BindingFormat::Ebook
    } else if lower.contains("audio") || lower.contains("mp3") || lower.contains("cd") {
        BindingFormat::Audiobook
    } else {
        BindingFormat::Unknown
    }
}

/// Parse weight text to grams (pounds, ounces, kilograms, grams)
pub fn parse_weight_grams(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    let value: f64 = lower
        .split_whitespace()
        .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse().ok())
        .filter(|v: &f64| *v > 0.0)?;

    let grams = if lower.contains("kg") || lower.contains("kilogram") {
        value * 1000.0
    } else if lower.contains("lb") || lower.contains("pound") {
        value * 453.592
    } else if lower.contains("oz") || lower.contains("ounce") {
        value * 28.3495
    } else if lower.contains('g') {
        value
    } else {
        return None;
    };
    Some(grams)
}

// ============================================================================
// Reconciliation
// ============================================================================

fn same_page_group(a: u32, b: u32) -> bool {
    let diff = a.abs_diff(b);
    let larger = a.max(b);
    diff <= weights::PAGE_COUNT_TOLERANCE_PAGES
        || (diff as f64) <= (larger as f64) * weights::PAGE_COUNT_TOLERANCE_FRACTION
}

struct PageGroup {
    counts: Vec<(u32, MetadataSource)>,
}

impl PageGroup {
    fn weight(&self) -> f64 {
        self.counts.iter().map(|(_, s)| s.reliability).sum()
    }

    /// Reliability-weighted average, rounded
    fn representative(&self) -> u32 {
        let weight = self.weight();
        if weight <= 0.0 {
            return self.counts.first().map(|(n, _)| *n).unwrap_or(0);
        }
        let sum: f64 = self
            .counts
            .iter()
            .map(|(n, s)| *n as f64 * s.reliability)
            .sum();
        (sum / weight).round() as u32
    }

    fn sources(&self) -> Vec<MetadataSource> {
        collect_sources(self.counts.iter().map(|(_, s)| s))
    }
}

/// Reconcile physical fields from multiple sources
///
/// # Errors
/// `ReconcileError::EmptyInput` when called with no inputs at all.
pub fn reconcile_physical(
    inputs: &[PhysicalInput],
) -> Result<ReconciledField<PhysicalDescription>, ReconcileError> {
    if inputs.is_empty() {
        return Err(ReconcileError::EmptyInput("physical descriptions"));
    }

    let all_sources = collect_sources(inputs.iter().map(|i| &i.source));
    let mut conflicts: Vec<Conflict> = Vec::new();

    // ---- Page count: explicit field wins over text extraction per source
    let mut page_claims: Vec<(u32, MetadataSource)> = Vec::new();
    for input in inputs {
        let claimed = input.value.page_count.or_else(|| {
            input
                .value
                .extent_text
                .as_deref()
                .and_then(extract_page_count)
        });
        if let Some(n) = claimed {
            if (weights::MIN_PAGE_COUNT..=weights::MAX_PAGE_COUNT).contains(&n) {
                page_claims.push((n, input.source.clone()));
            }
        }
    }

    let mut page_groups: Vec<PageGroup> = Vec::new();
    for (count, source) in page_claims {
        match page_groups
            .iter_mut()
            .find(|g| g.counts.iter().all(|(n, _)| same_page_group(*n, count)))
        {
            Some(group) => group.counts.push((count, source)),
            None => page_groups.push(PageGroup {
                counts: vec![(count, source)],
            }),
        }
    }
    page_groups.sort_by(|a, b| {
        b.weight()
            .partial_cmp(&a.weight())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.representative().cmp(&b.representative()))
    });

    let page_count = page_groups.first().map(|g| g.representative());
    if page_groups.len() > 1 {
        let winner = &page_groups[0];
        debug!(
            winner = winner.representative(),
            groups = page_groups.len(),
            "Page count disagreement"
        );
        conflicts.push(Conflict {
            field: "physical.page_count".to_string(),
            values: page_groups
                .iter()
                .flat_map(|g| {
                    g.counts.iter().map(|(n, s)| ConflictValue {
                        value: n.to_string(),
                        source: s.name.clone(),
                    })
                })
                .collect(),
            resolution: format!(
                "kept {} (combined reliability {:.2}) over {}",
                winner.representative(),
                winner.weight(),
                page_groups[1..]
                    .iter()
                    .map(|g| g.representative().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }

    // ---- Dimensions: highest-reliability parseable claim wins
    let dimensions = inputs
        .iter()
        .filter_map(|i| {
            i.value
                .dimensions_text
                .as_deref()
                .and_then(parse_dimensions)
                .map(|d| (d, &i.source))
        })
        .max_by(|a, b| {
            a.1.reliability
                .partial_cmp(&b.1.reliability)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(d, _)| d);

    // ---- Binding: highest aggregate reliability per detected format
    let mut binding_votes: Vec<(BindingFormat, Vec<MetadataSource>)> = Vec::new();
    for input in inputs {
        if let Some(text) = input.value.binding_text.as_deref() {
            let format = detect_binding(text);
            if format == BindingFormat::Unknown {
                continue;
            }
            match binding_votes.iter_mut().find(|(f, _)| *f == format) {
                Some((_, sources)) => {
                    if !sources.iter().any(|s| s.name == input.source.name) {
                        sources.push(input.source.clone());
                    }
                }
                None => binding_votes.push((format, vec![input.source.clone()])),
            }
        }
    }
    binding_votes.sort_by(|a, b| {
        group_weight(&b.1)
            .partial_cmp(&group_weight(&a.1))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.label().cmp(b.0.label()))
    });
    let format = binding_votes
        .first()
        .map(|(f, _)| *f)
        .unwrap_or(BindingFormat::Unknown);
    if binding_votes.len() > 1 {
        conflicts.push(Conflict {
            field: "physical.format".to_string(),
            values: binding_votes
                .iter()
                .flat_map(|(f, sources)| {
                    sources.iter().map(|s| ConflictValue {
                        value: f.label().to_string(),
                        source: s.name.clone(),
                    })
                })
                .collect(),
            resolution: format!(
                "kept {} over {}",
                format.label(),
                binding_votes[1..]
                    .iter()
                    .map(|(f, _)| f.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }

    // Non-physical format claiming pages or dimensions is itself suspect
    if !format.is_physical()
        && format != BindingFormat::Unknown
        && (page_count.is_some() || dimensions.is_some())
    {
        conflicts.push(Conflict {
            field: "physical.format".to_string(),
            values: vec![ConflictValue {
                value: format.label().to_string(),
                source: "reconciler".to_string(),
            }],
            resolution: format!(
                "{} format reported alongside physical page count or dimensions",
                format.label()
            ),
        });
    }

    // ---- Weight: highest-reliability parseable claim
    let weight_grams = inputs
        .iter()
        .filter_map(|i| {
            i.value
                .weight_text
                .as_deref()
                .and_then(parse_weight_grams)
                .map(|w| (w, &i.source))
        })
        .max_by(|a, b| {
            a.1.reliability
                .partial_cmp(&b.1.reliability)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(w, _)| w);

    let usable = inputs
        .iter()
        .filter(|i| {
            i.value.page_count.is_some()
                || i.value.extent_text.is_some()
                || i.value.dimensions_text.is_some()
                || i.value.binding_text.is_some()
                || i.value.weight_text.is_some()
        })
        .count();

    if usable == 0 {
        return Ok(ReconciledField {
            value: PhysicalDescription {
                page_count: None,
                dimensions: None,
                format: BindingFormat::Unknown,
                weight_grams: None,
            },
            confidence: weights::CONFIDENCE_FLOOR,
            sources: all_sources,
            conflicts,
            reasoning: "no usable physical fields in any input".to_string(),
        });
    }

    let winning_sources = page_groups
        .first()
        .map(|g| g.sources())
        .unwrap_or_else(|| all_sources.clone());
    let supporting = page_groups
        .first()
        .map(|g| g.counts.len())
        .unwrap_or(usable);
    let agreement = winning_sources.len();
    let total_claims: usize = page_groups.iter().map(|g| g.counts.len()).sum::<usize>().max(1);

    let confidence = field_confidence(
        1.0,
        mean_reliability(&winning_sources),
        supporting as f64 / total_claims as f64,
        agreement,
    );

    let reasoning = format!(
        "pages {:?}, format {}, {} conflict(s) from {} usable input(s)",
        page_count,
        format.label(),
        conflicts.len(),
        usable
    );

    Ok(ReconciledField {
        value: PhysicalDescription {
            page_count,
            dimensions,
            format,
            weight_grams,
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
