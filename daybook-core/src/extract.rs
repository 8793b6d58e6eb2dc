// Activity extraction from finished reply text
//
// A fixed table of independent field patterns, each evaluated in its own
// pass over the whole text. First match wins; a field with no match is
// simply absent. Values stay raw strings here — coercion to typed fields
// happens at the record-building boundary, so extraction never fails.

use std::collections::HashMap;

use regex::Regex;

/// Raw captured values keyed by field name. Absent fields carry no entry;
/// default substitution is the caller's responsibility.
pub type RawExtraction = HashMap<&'static str, String>;

pub const STEPS_WALKED: &str = "steps_walked";
pub const HOURS_SLEPT: &str = "hours_slept";
pub const WATER_INTAKE: &str = "water_intake";
pub const EXERCISE_DURATION: &str = "exercise_duration";
pub const MOOD: &str = "mood";
pub const CALORIES_INTAKE: &str = "calories_intake";
pub const PRODUCTIVITY_SCORE: &str = "productivity_score";
pub const WORK_DONE: &str = "work_done";

/// How a field's raw value is captured from its match.
enum FieldKind {
    /// Leading numeral followed by a fixed unit phrase; captures group 1.
    Numeric,
    /// Closed set of literal phrases; captures the whole match, so the
    /// raw value includes the trailing keyword (e.g. "Good mood").
    Enum,
    /// Everything after a fixed label to end of line.
    FreeText,
}

struct FieldPattern {
    name: &'static str,
    kind: FieldKind,
    pattern: Regex,
}

/// Matches the fixed set of activity fields against finished text.
pub struct ActivityExtractor {
    fields: Vec<FieldPattern>,
}

impl ActivityExtractor {
    pub fn new() -> Self {
        let field = |name, kind, pattern: &str| FieldPattern {
            name,
            kind,
            pattern: Regex::new(pattern).unwrap(),
        };
        Self {
            fields: vec![
                field(STEPS_WALKED, FieldKind::Numeric, r"(\d+) steps"),
                field(HOURS_SLEPT, FieldKind::Numeric, r"(\d+(?:\.\d+)?) hours of sleep"),
                field(WATER_INTAKE, FieldKind::Numeric, r"(\d+(?:\.\d+)?) liters of water"),
                field(EXERCISE_DURATION, FieldKind::Numeric, r"(\d+) minutes of exercise"),
                field(MOOD, FieldKind::Enum, r"(Excellent|Good|Neutral|Bad|Very Bad) mood"),
                field(CALORIES_INTAKE, FieldKind::Numeric, r"(\d+) calories"),
                field(PRODUCTIVITY_SCORE, FieldKind::Numeric, r"productivity score of (\d+)"),
                field(WORK_DONE, FieldKind::FreeText, r"work done: (.+)"),
            ],
        }
    }

    /// One pass per field over the whole text; independent fields, no
    /// cross-field validation.
    pub fn extract(&self, text: &str) -> RawExtraction {
        let mut raw = RawExtraction::new();
        for field in &self.fields {
            if let Some(captures) = field.pattern.captures(text) {
                let value = match field.kind {
                    FieldKind::Enum => captures.get(0),
                    FieldKind::Numeric | FieldKind::FreeText => captures.get(1),
                };
                if let Some(m) = value {
                    raw.insert(field.name, m.as_str().to_string());
                }
            }
        }
        raw
    }
}

impl Default for ActivityExtractor {
    fn default() -> Self {
        Self::new()
    }
}
