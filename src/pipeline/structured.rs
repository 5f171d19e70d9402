//! Structured-output decode path.
//!
//! When a provider is asked for JSON instead of the bulleted layout, this
//! module decodes the payload leniently and falls back to the text parser
//! whenever decoding fails. The pipeline therefore never loses a response:
//! worst case the user gets a text-only report.

use serde::Deserialize;
use tracing::debug;

use crate::models::{AnalysisReport, Condition, Remedy, SeverityLevel};
use crate::pipeline::report;

/// JSON shape the structured prompt asks the model for. Every field is
/// optional; models routinely omit or misname parts of the schema.
#[derive(Debug, Deserialize)]
struct ReportJson {
    severity_level: Option<String>,
    severity_score: Option<u8>,
    #[serde(default)]
    observations: Vec<serde_json::Value>,
    #[serde(default)]
    possible_conditions: Vec<serde_json::Value>,
    #[serde(default)]
    recommended_actions: Vec<serde_json::Value>,
    #[serde(default)]
    remedies: Vec<serde_json::Value>,
    #[serde(default)]
    skincare_tips: Vec<serde_json::Value>,
}

/// Build a report from a structured-JSON provider response.
///
/// Falls back to section parsing of the same text when no usable JSON
/// object is present, so the result is always a valid report.
pub fn build_structured(raw_text: &str) -> AnalysisReport {
    match decode_report_json(raw_text) {
        Some(json) => assemble(json, raw_text),
        None => {
            debug!("no decodable JSON object in response, using text parser");
            report::parse(raw_text)
        }
    }
}

/// Locate and decode the outermost JSON object, tolerating markdown fences
/// and prose before or after it.
fn decode_report_json(raw_text: &str) -> Option<ReportJson> {
    let start = raw_text.find('{')?;
    let end = raw_text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw_text[start..=end]).ok()
}

fn assemble(json: ReportJson, raw_text: &str) -> AnalysisReport {
    let severity_level = json
        .severity_level
        .as_deref()
        .and_then(SeverityLevel::from_text)
        .unwrap_or_default();

    // A model-supplied score is honored only when it is in range.
    let severity_score = match json.severity_score {
        Some(score @ 1..=10) => score,
        _ => severity_level.score(),
    };

    AnalysisReport {
        severity_level,
        severity_score,
        observations: parse_strings_lenient(&json.observations),
        possible_conditions: parse_array_lenient::<Condition>(&json.possible_conditions),
        recommended_actions: parse_strings_lenient(&json.recommended_actions),
        remedies: parse_array_lenient::<Remedy>(&json.remedies),
        skincare_tips: parse_strings_lenient(&json.skincare_tips),
        raw_text: raw_text.to_string(),
        provider_used: None,
    }
}

/// Deserialize array items one by one, skipping any that fail.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(items: &[serde_json::Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}

/// String arrays with the same tolerance: non-string items are dropped.
fn parse_strings_lenient(items: &[serde_json::Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
