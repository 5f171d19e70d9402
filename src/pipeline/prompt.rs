//! Prompt templates and the shared response-formatting step.
//!
//! The bulleted layout requested here is effectively a wire contract with
//! the AI provider: the parser's section-keyword table recognizes exactly
//! the headers this template asks for. Change one and you must change the
//! other; a test below keeps them in sync.

use crate::config::ProviderId;

pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a dermatology analysis assistant. You examine a photo of skin and \
produce a structured report. You are not a doctor and never claim to be; \
you describe what is visible and suggest non-prescription care only. \
Follow the requested output layout exactly, section by section.";

/// The text-path template. Section headers here must keep matching the
/// parser's keyword table.
pub const ANALYSIS_USER_PROMPT: &str = "\
Analyze the skin shown in this photo and reply using EXACTLY this layout:

📊 SEVERITY: <one of: Healthy, Mild, Moderate, Severe>

🔍 WHAT I OBSERVED
• <short bullet, one finding per line>

⚠️ POSSIBLE CONDITIONS
<Condition Name> - <probability>%
<one-line description of that condition>

✅ WHAT YOU SHOULD DO (RECOMMENDED)
1. <concrete action>

🌿 AYURVEDIC REMEDIES
<Remedy Name>
Ingredients: <comma-separated list>
<how to prepare and apply>
Benefits: <what it helps with>

💡 DAILY SKINCARE TIPS
• <one tip per line>

List conditions in order of likelihood, most likely first. Keep bullets \
short. Do not add sections beyond these.";

/// The structured-path template: same content, JSON layout. Used when the
/// active provider is prompted for constrained output; the decoded shape
/// mirrors `AnalysisReport`.
pub const STRUCTURED_JSON_PROMPT: &str = "\
Analyze the skin shown in this photo and reply with a single JSON object, \
no prose, matching exactly:

{
  \"severity_level\": \"healthy | mild | moderate | severe\",
  \"severity_score\": 1,
  \"observations\": [\"finding\"],
  \"possible_conditions\": [
    {\"name\": \"condition\", \"probability\": 0, \"description\": \"one line\"}
  ],
  \"recommended_actions\": [\"action\"],
  \"remedies\": [
    {\"name\": \"remedy\", \"ingredients\": [\"item\"], \"instructions\": \"how to use\", \"benefits\": \"what it helps\"}
  ],
  \"skincare_tips\": [\"tip\"]
}

Order possible_conditions most likely first. severity_score is 1-10.";

// ──────────────────────────────────────────────
// Response formatting
// ──────────────────────────────────────────────

const FOOTER_DIVIDER: &str = "────────────────────────────";

const DISCLAIMER: &str = "\
⚠️ This analysis is generated by an AI model and is not a medical \
diagnosis. Consult a qualified dermatologist if symptoms persist or worsen.";

/// Wrap a raw completion into the final report string: trimmed body, a
/// divider, the fixed disclaimer, and provider attribution. Applied on
/// every successful orchestration exit.
pub fn format_report(raw: &str, provider: ProviderId) -> String {
    format!(
        "{}\n\n{FOOTER_DIVIDER}\n{DISCLAIMER}\nPowered by {provider}",
        raw.trim()
    )
}
