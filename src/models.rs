//! Domain types for a parsed skin analysis.
//!
//! An `AnalysisReport` is created once per successful orchestration call and
//! never mutated; corrections require a new analysis. It is always
//! producible from any raw report text: when section parsing finds nothing,
//! a report with only `raw_text` populated is still valid and renderable.

use serde::{Deserialize, Serialize};

use crate::config::ProviderId;

/// Qualitative severity of the photographed condition. Closed set;
/// unrecognized text defaults to `Mild`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Healthy,
    #[default]
    Mild,
    Moderate,
    Severe,
}

/// Recognition priority when a text mentions several levels.
const SEVERITY_PRIORITY: &[(SeverityLevel, &str)] = &[
    (SeverityLevel::Healthy, "HEALTHY"),
    (SeverityLevel::Mild, "MILD"),
    (SeverityLevel::Moderate, "MODERATE"),
    (SeverityLevel::Severe, "SEVERE"),
];

impl SeverityLevel {
    /// Deterministic 1-10 score used for UI progress bars.
    /// Not model-supplied unless the structured JSON path provides one.
    pub fn score(self) -> u8 {
        match self {
            Self::Healthy => 2,
            Self::Mild => 3,
            Self::Moderate => 6,
            Self::Severe => 9,
        }
    }

    /// First recognized severity keyword in `text`, by case-insensitive
    /// substring match, in Healthy > Mild > Moderate > Severe priority.
    pub fn from_text(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        SEVERITY_PRIORITY
            .iter()
            .find(|(_, keyword)| upper.contains(keyword))
            .map(|(level, _)| *level)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
        }
    }

    /// Exact (case-insensitive) stored form back to a level.
    /// Anything unrecognized maps to the `Mild` default.
    pub fn from_stored(text: &str) -> Self {
        match text.to_ascii_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "moderate" => Self::Moderate,
            "severe" => Self::Severe,
            _ => Self::Mild,
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate condition named by the model.
///
/// Ordering across a report preserves provider-output order: it is treated
/// as the model's confidence ranking and never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    /// 0-100.
    pub probability: u8,
    #[serde(default)]
    pub description: String,
}

/// A home remedy entry from the Ayurvedic Remedies section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Remedy {
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub benefits: String,
}

/// The parsed, structured result of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub severity_level: SeverityLevel,
    /// 1-10, monotonically correlated with `severity_level`.
    pub severity_score: u8,
    pub observations: Vec<String>,
    pub possible_conditions: Vec<Condition>,
    pub recommended_actions: Vec<String>,
    pub remedies: Vec<Remedy>,
    pub skincare_tips: Vec<String>,
    /// The full normalized report string, retained verbatim for
    /// audit, history, and sharing.
    pub raw_text: String,
    /// Which provider produced the successful response (attribution footer).
    pub provider_used: Option<ProviderId>,
}

impl AnalysisReport {
    /// A report carrying only raw text, the guaranteed-valid fallback when
    /// no structure could be recovered.
    pub fn text_only(raw_text: impl Into<String>) -> Self {
        Self {
            severity_level: SeverityLevel::default(),
            severity_score: SeverityLevel::default().score(),
            observations: Vec::new(),
            possible_conditions: Vec::new(),
            recommended_actions: Vec::new(),
            remedies: Vec::new(),
            skincare_tips: Vec::new(),
            raw_text: raw_text.into(),
            provider_used: None,
        }
    }

    /// Probability of the highest-ranked condition, if any.
    pub fn top_condition_probability(&self) -> Option<u8> {
        self.possible_conditions.first().map(|c| c.probability)
    }
}
