//! Per-field quality grading
//!
//! Grades each preview field from its confidence, contributing-source count,
//! and conflict presence. Thresholds are configurable so a strict library
//! can demand more corroboration than a casual one.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn label(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Fair => "fair",
            QualityLevel::Poor => "poor",
        }
    }
}

/// Score bands for quality levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: 0.85,
            good: 0.70,
            fair: 0.50,
        }
    }
}

/// Quality assessment for one preview field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldQuality {
    pub score: f64,
    pub level: QualityLevel,
    /// What drove the score, for display
    pub factors: Vec<String>,
    /// Concrete improvement hints
    pub suggestions: Vec<String>,
}

/// Grade one field from confidence, corroboration, and conflicts
pub fn grade_field(
    confidence: f64,
    source_count: usize,
    conflict_count: usize,
    thresholds: &QualityThresholds,
) -> FieldQuality {
    let mut factors = Vec::new();
    let mut suggestions = Vec::new();

    // Confidence carries the score; corroboration nudges, conflicts drag.
    let mut score = confidence;
    factors.push(format!("confidence {confidence:.2}"));

    if source_count >= 3 {
        score += 0.05;
        factors.push(format!("{source_count} corroborating sources"));
    } else if source_count == 1 {
        score -= 0.05;
        factors.push("single source".to_string());
        suggestions.push("query additional providers for corroboration".to_string());
    } else if source_count == 0 {
        factors.push("no sources".to_string());
        suggestions.push("no provider returned this field".to_string());
    }

    if conflict_count > 0 {
        score -= 0.05 * conflict_count as f64;
        factors.push(format!("{conflict_count} recorded conflict(s)"));
        suggestions.push("review recorded conflicts before accepting".to_string());
    }

    let score = score.clamp(0.0, 1.0);
    let level = if score >= thresholds.excellent {
        QualityLevel::Excellent
    } else if score >= thresholds.good {
        QualityLevel::Good
    } else if score >= thresholds.fair {
        QualityLevel::Fair
    } else {
        QualityLevel::Poor
    };

    if level == QualityLevel::Poor && suggestions.is_empty() {
        suggestions.push("verify this field manually".to_string());
    }

    FieldQuality {
        score,
        level,
        factors,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_confidence_multi_source_is_excellent() {
        let quality = grade_field(0.9, 3, 0, &QualityThresholds::default());
        assert_eq!(quality.level, QualityLevel::Excellent);
        assert!(quality.suggestions.is_empty());
    }

    #[test]
    fn test_single_source_downgrades() {
        let multi = grade_field(0.72, 2, 0, &QualityThresholds::default());
        let single = grade_field(0.72, 1, 0, &QualityThresholds::default());
        assert!(single.score < multi.score);
        assert!(!single.suggestions.is_empty());
    }

    #[test]
    fn test_conflicts_drag_score() {
        let clean = grade_field(0.8, 2, 0, &QualityThresholds::default());
        let conflicted = grade_field(0.8, 2, 2, &QualityThresholds::default());
        assert!(conflicted.score < clean.score);
        assert!(conflicted
            .suggestions
            .iter()
            .any(|s| s.contains("conflicts")));
    }

    #[test]
    fn test_poor_field_always_gets_a_suggestion() {
        let quality = grade_field(0.2, 2, 0, &QualityThresholds::default());
        assert_eq!(quality.level, QualityLevel::Poor);
        assert!(!quality.suggestions.is_empty());
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = QualityThresholds {
            excellent: 0.95,
            good: 0.85,
            fair: 0.70,
        };
        let quality = grade_field(0.9, 2, 0, &strict);
        assert_eq!(quality.level, QualityLevel::Good);
    }
}
