//! Section parser: free-text report → typed [`AnalysisReport`].
//!
//! The provider is prompted for a fixed bulleted layout; this module walks
//! that text line by line, recognizes section headers by keyword substring,
//! and extracts typed content per section. Pure and deterministic: same
//! input always yields the same output, and nothing here ever fails: text
//! with no recognizable headers simply yields an all-empty report with
//! `raw_text` preserved.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{AnalysisReport, Condition, Remedy, SeverityLevel};

// ──────────────────────────────────────────────
// Section table
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Severity,
    Observations,
    Conditions,
    Actions,
    Remedies,
    Tips,
}

/// Ordered header table. A line matches a section when it contains any of
/// the section's keywords (case-insensitive); the first table entry that
/// matches wins when a line matches several.
const SECTION_TABLE: &[(SectionKind, &[&str])] = &[
    (SectionKind::Severity, &["SEVERITY"]),
    (SectionKind::Observations, &["OBSERVED"]),
    (SectionKind::Conditions, &["POSSIBLE CONDITIONS"]),
    (SectionKind::Actions, &["SHOULD DO", "RECOMMENDED"]),
    (SectionKind::Remedies, &["AYURVEDIC"]),
    (SectionKind::Tips, &["SKINCARE", "TIPS"]),
];

/// Keyword sets per section, for the prompt-template sync test.
pub fn section_keywords() -> impl Iterator<Item = &'static [&'static str]> {
    SECTION_TABLE.iter().map(|(_, keywords)| *keywords)
}

fn match_section(line: &str) -> Option<SectionKind> {
    let upper = line.to_uppercase();
    SECTION_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| upper.contains(k)))
        .map(|(kind, _)| *kind)
}

// ──────────────────────────────────────────────
// Line cleanup
// ──────────────────────────────────────────────

/// Decorative divider: a run of box-drawing/dash characters and nothing else.
fn is_divider(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= 3
        && trimmed
            .chars()
            .all(|c| matches!(c, '─' | '═' | '━' | '╌' | '┄' | '-' | '–' | '—' | '=' | '_' | '*' | '~' | ' '))
}

/// Strip bullet glyphs, bold markers, and leading ordinal numbering.
fn clean_line(line: &str) -> String {
    let mut s = line.trim();

    // Leading bullet glyphs (possibly repeated, e.g. "- • item").
    loop {
        let stripped = s
            .strip_prefix('•')
            .or_else(|| s.strip_prefix('▪'))
            .or_else(|| s.strip_prefix('◦'))
            .or_else(|| s.strip_prefix('-'))
            .or_else(|| s.strip_prefix('–'))
            .or_else(|| s.strip_prefix('*'));
        match stripped {
            Some(rest) => s = rest.trim_start(),
            None => break,
        }
    }

    // Leading ordinal like "1." or "2)".
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            s = rest.trim_start();
        }
    }

    s.replace("**", "").trim().to_string()
}

// ──────────────────────────────────────────────
// Parse
// ──────────────────────────────────────────────

/// Parse a normalized report string into a typed `AnalysisReport`.
///
/// Sections absent from the text yield empty lists, never an error. Empty
/// input yields an all-empty report with empty `raw_text`.
pub fn parse(raw_text: &str) -> AnalysisReport {
    let mut sections: Vec<(SectionKind, Vec<String>)> = Vec::new();
    let mut current: Option<(SectionKind, Vec<String>)> = None;

    for line in raw_text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        // A divider ends the open section. The formatted report places one
        // before the disclaimer footer, so footer lines never attach to
        // parsed content.
        if is_divider(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            continue;
        }

        if let Some(kind) = match_section(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            let mut content = Vec::new();
            // A header like "SEVERITY: Moderate" carries its value on the
            // header line itself, after the colon.
            if let Some((_, trailing)) = line.split_once(':') {
                let cleaned = clean_line(trailing);
                if !cleaned.is_empty() {
                    content.push(cleaned);
                }
            }
            current = Some((kind, content));
            continue;
        }

        if let Some((_, content)) = current.as_mut() {
            let cleaned = clean_line(line);
            if !cleaned.is_empty() {
                content.push(cleaned);
            }
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }

    let mut report = AnalysisReport::text_only(raw_text);
    for (kind, content) in sections {
        match kind {
            SectionKind::Severity => {
                let joined = content.join(" ");
                report.severity_level =
                    SeverityLevel::from_text(&joined).unwrap_or_default();
                report.severity_score = report.severity_level.score();
            }
            SectionKind::Observations => report.observations.extend(content),
            SectionKind::Conditions => {
                report.possible_conditions.extend(parse_conditions(&content))
            }
            SectionKind::Actions => report.recommended_actions.extend(content),
            SectionKind::Remedies => report.remedies.extend(parse_remedies(&content)),
            SectionKind::Tips => report.skincare_tips.extend(content),
        }
    }
    report
}

// ──────────────────────────────────────────────
// Possible Conditions
// ──────────────────────────────────────────────

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*%").expect("valid regex"));

/// Extract conditions from section content.
///
/// A line carrying a `NN%` token opens a condition. The name is the text
/// before a dash separator on that line; when the model split name and
/// probability across lines, the following non-percentage line supplies the
/// name instead. A further non-percentage line becomes the description.
fn parse_conditions(lines: &[String]) -> Vec<Condition> {
    let mut out: Vec<Condition> = Vec::new();
    let mut awaiting_name: Option<usize> = None;

    for line in lines {
        let Some(caps) = PERCENT_RE.captures(line) else {
            // Not a percentage line: it names a pending condition, or
            // describes the most recent one.
            if let Some(idx) = awaiting_name.take() {
                out[idx].name = line.clone();
            } else if let Some(last) = out.last_mut() {
                if last.description.is_empty() {
                    last.description = line.clone();
                }
            }
            continue;
        };

        let probability = caps[1].parse::<u32>().unwrap_or(0).min(100) as u8;
        let pct_start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let pct_end = caps.get(0).map(|m| m.end()).unwrap_or(0);

        let name = name_before_percent(&line[..pct_start]);
        let trailing = strip_separators(&line[pct_end..]);

        let idx = out.len();
        out.push(Condition {
            name: name.unwrap_or_default(),
            probability,
            description: trailing.unwrap_or_default(),
        });
        awaiting_name = if out[idx].name.is_empty() {
            Some(idx)
        } else {
            None
        };
    }
    // Consecutive percentage lines can leave an entry with no name to
    // back-fill; a nameless condition is unrenderable, so drop it.
    out.retain(|c| !c.name.is_empty());
    out
}

/// Condition name from the text preceding the percentage, ending at a dash
/// separator (" - " or " – ") or a colon.
fn name_before_percent(prefix: &str) -> Option<String> {
    let prefix = prefix
        .rsplit_once(" - ")
        .or_else(|| prefix.rsplit_once(" – "))
        .map(|(name, _)| name)
        .unwrap_or(prefix);
    let name = prefix.trim().trim_end_matches([':', '-', '–']).trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Trailing description text after the percentage token, minus separators.
fn strip_separators(trailing: &str) -> Option<String> {
    let t = trailing.trim().trim_start_matches(['-', '–', ':', ',']).trim();
    (!t.is_empty()).then(|| t.to_string())
}

// ──────────────────────────────────────────────
// Ayurvedic Remedies
// ──────────────────────────────────────────────

/// Lines shorter than this, with no colon, open a new remedy.
const REMEDY_NAME_MAX_CHARS: usize = 40;

/// Group remedy-section lines into remedies: short colon-free lines are
/// names; `Ingredients:` / `Benefits:` prefixed lines fill those fields;
/// everything else accumulates into instructions.
fn parse_remedies(lines: &[String]) -> Vec<Remedy> {
    let mut out: Vec<Remedy> = Vec::new();

    for line in lines {
        let is_name = line.chars().count() < REMEDY_NAME_MAX_CHARS && !line.contains(':');
        if is_name {
            out.push(Remedy {
                name: line.clone(),
                ..Remedy::default()
            });
            continue;
        }

        let Some(remedy) = out.last_mut() else {
            // Detail line before any remedy name; nothing to attach it to.
            continue;
        };

        let lower = line.to_lowercase();
        if let Some(rest) = lower
            .starts_with("ingredients:")
            .then(|| &line["ingredients:".len()..])
        {
            remedy.ingredients = rest
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        } else if let Some(rest) = lower
            .starts_with("benefits:")
            .then(|| &line["benefits:".len()..])
        {
            remedy.benefits = rest.trim().to_string();
        } else if remedy.instructions.is_empty() {
            remedy.instructions = line.clone();
        } else {
            remedy.instructions.push(' ');
            remedy.instructions.push_str(line);
        }
    }
    out
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "\
Here is your skin analysis.

📊 SEVERITY: Moderate

──────────────────────────
🔍 WHAT I OBSERVED
• Redness across both cheeks
• **Small raised bumps** near the jawline

⚠️ POSSIBLE CONDITIONS
Acne Vulgaris - 72%
Inflammatory follicular condition
Rosacea - 21%
Contact Dermatitis - 7%

✅ WHAT YOU SHOULD DO
1. Wash the area twice daily with a gentle cleanser
2. Avoid picking or squeezing the bumps

🌿 AYURVEDIC REMEDIES
Neem Paste
Ingredients: neem leaves, water
Grind fresh leaves into a paste and apply for 15 minutes.
Benefits: antibacterial, calms inflammation
Turmeric Mask
Ingredients: turmeric, honey
Mix into a smooth paste and apply to the affected area once a week.

💡 DAILY SKINCARE TIPS
• Use a non-comedogenic moisturizer
• Drink plenty of water
";

    #[test]
    fn parses_well_formed_report() {
        let report = parse(WELL_FORMED);

        assert_eq!(report.severity_level, SeverityLevel::Moderate);
        assert_eq!(report.severity_score, 6);

        assert_eq!(
            report.observations,
            vec![
                "Redness across both cheeks",
                "Small raised bumps near the jawline"
            ]
        );

        assert_eq!(report.possible_conditions.len(), 3);
        assert_eq!(report.possible_conditions[0].name, "Acne Vulgaris");
        assert_eq!(report.possible_conditions[0].probability, 72);
        assert_eq!(
            report.possible_conditions[0].description,
            "Inflammatory follicular condition"
        );
        assert_eq!(report.possible_conditions[1].name, "Rosacea");
        assert_eq!(report.possible_conditions[1].probability, 21);
        assert_eq!(report.possible_conditions[2].name, "Contact Dermatitis");
        assert_eq!(report.possible_conditions[2].probability, 7);

        assert_eq!(report.recommended_actions.len(), 2);
        assert!(report.recommended_actions[0].starts_with("Wash the area"));

        assert_eq!(report.remedies.len(), 2);
        assert_eq!(report.remedies[0].name, "Neem Paste");
        assert_eq!(report.remedies[0].ingredients, vec!["neem leaves", "water"]);
        assert!(report.remedies[0].instructions.contains("Grind fresh leaves"));
        assert_eq!(
            report.remedies[0].benefits,
            "antibacterial, calms inflammation"
        );
        assert_eq!(report.remedies[1].name, "Turmeric Mask");
        assert_eq!(report.remedies[1].ingredients, vec!["turmeric", "honey"]);

        assert_eq!(
            report.skincare_tips,
            vec!["Use a non-comedogenic moisturizer", "Drink plenty of water"]
        );

        assert_eq!(report.raw_text, WELL_FORMED);
    }

    #[test]
    fn condition_order_preserves_provider_ranking() {
        let report = parse(WELL_FORMED);
        let probs: Vec<u8> = report
            .possible_conditions
            .iter()
            .map(|c| c.probability)
            .collect();
        // Provider order, not sorted.
        assert_eq!(probs, vec![72, 21, 7]);
    }

    #[test]
    fn empty_input_yields_empty_report() {
        let report = parse("");
        assert!(report.raw_text.is_empty());
        assert!(report.observations.is_empty());
        assert!(report.possible_conditions.is_empty());
        assert_eq!(report.severity_level, SeverityLevel::Mild);
    }

    #[test]
    fn prose_without_headers_keeps_raw_text_only() {
        let text = "The weather is nice today.\nNothing dermatological here.";
        let report = parse(text);
        assert_eq!(report.raw_text, text);
        assert!(report.observations.is_empty());
        assert!(report.possible_conditions.is_empty());
        assert!(report.recommended_actions.is_empty());
        assert!(report.remedies.is_empty());
        assert!(report.skincare_tips.is_empty());
    }

    #[test]
    fn severity_on_header_line_is_recognized() {
        let report = parse("📊 SEVERITY: Severe\n");
        assert_eq!(report.severity_level, SeverityLevel::Severe);
        assert_eq!(report.severity_score, 9);
    }

    #[test]
    fn severity_on_following_line_is_recognized() {
        let report = parse("SEVERITY\nHealthy skin overall\n");
        assert_eq!(report.severity_level, SeverityLevel::Healthy);
        assert_eq!(report.severity_score, 2);
    }

    #[test]
    fn unrecognized_severity_defaults_to_mild() {
        let report = parse("SEVERITY: catastrophic\n");
        assert_eq!(report.severity_level, SeverityLevel::Mild);
        assert_eq!(report.severity_score, 3);
    }

    #[test]
    fn first_matching_header_in_table_wins() {
        // "RECOMMENDED SKINCARE TIPS" matches both Actions ("RECOMMENDED")
        // and Tips ("SKINCARE", "TIPS"); Actions comes first in the table.
        let report = parse("RECOMMENDED SKINCARE TIPS\n• apply sunscreen\n");
        assert_eq!(report.recommended_actions, vec!["apply sunscreen"]);
        assert!(report.skincare_tips.is_empty());
    }

    #[test]
    fn divider_closes_the_open_section() {
        let report = parse("WHAT I OBSERVED\n• dry patches\n-----\nstray trailing note\n");
        // Content after a divider belongs to no section until a new header.
        assert_eq!(report.observations, vec!["dry patches"]);
    }

    #[test]
    fn footer_lines_never_attach_to_the_last_section() {
        use crate::config::ProviderId;
        use crate::pipeline::prompt::format_report;

        let formatted = format_report(
            "SEVERITY: Mild\nWHAT I OBSERVED\n• redness\n",
            ProviderId::OpenRouter,
        );
        let report = parse(&formatted);
        assert_eq!(report.severity_level, SeverityLevel::Mild);
        assert_eq!(report.observations, vec!["redness"]);
        assert_eq!(report.raw_text, formatted);
    }

    #[test]
    fn bullets_numbering_and_bold_are_stripped() {
        let report = parse(
            "WHAT YOU SHOULD DO\n1. First action\n2) **Second** action\n- Third action\n",
        );
        assert_eq!(
            report.recommended_actions,
            vec!["First action", "Second action", "Third action"]
        );
    }

    #[test]
    fn condition_name_split_across_lines() {
        let text = "\
POSSIBLE CONDITIONS
72%
Acne Vulgaris
Eczema - 15%
";
        let report = parse(text);
        assert_eq!(report.possible_conditions.len(), 2);
        assert_eq!(report.possible_conditions[0].name, "Acne Vulgaris");
        assert_eq!(report.possible_conditions[0].probability, 72);
        assert_eq!(report.possible_conditions[1].name, "Eczema");
        assert_eq!(report.possible_conditions[1].probability, 15);
    }

    #[test]
    fn consecutive_percentage_lines_drop_the_nameless_entry() {
        let report = parse("POSSIBLE CONDITIONS\n72%\n15%\nEczema\n");
        assert_eq!(report.possible_conditions.len(), 1);
        assert_eq!(report.possible_conditions[0].name, "Eczema");
        assert_eq!(report.possible_conditions[0].probability, 15);
    }

    #[test]
    fn condition_with_en_dash_separator() {
        let report = parse("POSSIBLE CONDITIONS\nPsoriasis – 40%\n");
        assert_eq!(report.possible_conditions[0].name, "Psoriasis");
        assert_eq!(report.possible_conditions[0].probability, 40);
    }

    #[test]
    fn condition_description_on_same_line() {
        let report = parse("POSSIBLE CONDITIONS\nMilia - 30% - tiny keratin cysts\n");
        let c = &report.possible_conditions[0];
        assert_eq!(c.name, "Milia");
        assert_eq!(c.probability, 30);
        assert_eq!(c.description, "tiny keratin cysts");
    }

    #[test]
    fn condition_probability_clamped_to_100() {
        let report = parse("POSSIBLE CONDITIONS\nOddity - 250%\n");
        assert_eq!(report.possible_conditions[0].probability, 100);
    }

    #[test]
    fn remedy_long_lines_accumulate_into_instructions() {
        let text = "\
AYURVEDIC REMEDIES
Aloe Gel
Scoop fresh gel from the leaf and spread a thin layer over the area.
Leave it on overnight and rinse with cool water in the morning.
";
        let report = parse(text);
        assert_eq!(report.remedies.len(), 1);
        let r = &report.remedies[0];
        assert_eq!(r.name, "Aloe Gel");
        assert!(r.instructions.contains("thin layer"));
        assert!(r.instructions.contains("overnight"));
        assert!(r.ingredients.is_empty());
    }

    #[test]
    fn parse_is_deterministic() {
        let a = parse(WELL_FORMED);
        let b = parse(WELL_FORMED);
        assert_eq!(a, b);
    }

    #[test]
    fn sections_missing_from_text_stay_empty() {
        let report = parse("SEVERITY: Mild\nWHAT I OBSERVED\n• flaking\n");
        assert_eq!(report.observations, vec!["flaking"]);
        assert!(report.possible_conditions.is_empty());
        assert!(report.remedies.is_empty());
        assert!(report.skincare_tips.is_empty());
    }
}
