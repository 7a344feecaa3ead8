//! Plan-mode output parser.
//!
//! Turns the model's text into ordered [`ActionStep`]s. The parser is total:
//! text that is not a JSON array of objects collapses into one low-confidence
//! `analysis` step carrying the raw text, so callers always get at least one
//! step and never see an error.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::config::ConfidenceTable;
use crate::types::{ActionKind, ActionStep, Point};

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?\s*```\s*$")
        .expect("fence pattern is valid")
});

/// Steps recovered from one plan response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub steps: Vec<ActionStep>,
    /// True when the text could not be read as a step array.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct PlanParser {
    step_default: f64,
    fallback: f64,
}

impl Default for PlanParser {
    fn default() -> Self {
        Self::from_table(&ConfidenceTable::default())
    }
}

impl PlanParser {
    pub fn from_table(table: &ConfidenceTable) -> Self {
        Self {
            step_default: table.plan_step_default,
            fallback: table.plan_fallback,
        }
    }

    pub fn parse(&self, raw: &str) -> ParsedPlan {
        let steps = serde_json::from_str::<Value>(strip_code_fence(raw))
            .ok()
            .and_then(|value| self.steps_from(&value));
        self.finish(steps, raw)
    }

    /// Same rules for an action list that arrived already decoded, e.g. the
    /// `actions` field of a gateway reply. A string is parsed as model text.
    pub fn parse_value(&self, value: &Value) -> ParsedPlan {
        match value {
            Value::String(text) => self.parse(text),
            Value::Null => self.finish(None, ""),
            other => self.finish(self.steps_from(other), &other.to_string()),
        }
    }

    fn finish(&self, steps: Option<Vec<ActionStep>>, raw: &str) -> ParsedPlan {
        match steps {
            Some(steps) => {
                tracing::debug!(steps = steps.len(), "plan parsed");
                ParsedPlan {
                    steps,
                    degraded: false,
                }
            }
            None => {
                tracing::info!(
                    raw_len = raw.len(),
                    "plan output is not a JSON step array; degrading to analysis step"
                );
                ParsedPlan {
                    steps: vec![ActionStep {
                        kind: ActionKind::Analysis,
                        description: raw.to_string(),
                        coordinates: None,
                        text_to_type: None,
                        confidence: self.fallback,
                    }],
                    degraded: true,
                }
            }
        }
    }

    /// All-or-nothing: one non-object element rejects the whole array.
    fn steps_from(&self, value: &Value) -> Option<Vec<ActionStep>> {
        let Value::Array(items) = value else {
            return None;
        };
        items
            .iter()
            .map(|item| item.as_object().map(|obj| self.map_step(obj)))
            .collect()
    }

    fn map_step(&self, obj: &Map<String, Value>) -> ActionStep {
        let kind = first_str(obj, &["type", "action", "action_type"])
            .map(parse_kind)
            .unwrap_or_else(|| ActionKind::Other("unknown".into()));
        let description = first_str(obj, &["description", "target", "target_description", "element"])
            .unwrap_or_default()
            .to_string();
        let text_to_type = first_str(obj, &["textToType", "text_to_type", "text"]).map(str::to_string);
        let confidence = obj
            .get("confidence")
            .and_then(unit_interval)
            .unwrap_or(self.step_default);

        ActionStep {
            kind,
            description,
            coordinates: coordinates(obj),
            text_to_type,
            confidence,
        }
    }
}

/// Parses with the default confidence table.
pub fn parse(raw: &str) -> ParsedPlan {
    PlanParser::default().parse(raw)
}

fn strip_code_fence(raw: &str) -> &str {
    FENCE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

/// A finite number, or a numeric string, clamped to [0, 1].
pub(crate) fn unit_interval(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then(|| n.clamp(0.0, 1.0))
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

/// Known kinds match case-insensitively; anything else is kept verbatim.
fn parse_kind(name: &str) -> ActionKind {
    match ActionKind::from(name.trim().to_ascii_lowercase()) {
        ActionKind::Other(_) => ActionKind::Other(name.to_string()),
        known => known,
    }
}

/// Accepts `{"coordinates": {"x":..,"y":..}}`, `{"coordinates": [x, y]}`
/// or top-level `x`/`y`.
fn coordinates(obj: &Map<String, Value>) -> Option<Point> {
    let pair = |x: Option<&Value>, y: Option<&Value>| -> Option<Point> {
        Some(Point {
            x: x?.as_f64()?,
            y: y?.as_f64()?,
        })
    };
    match obj.get("coordinates") {
        Some(Value::Object(c)) => pair(c.get("x"), c.get("y")),
        Some(Value::Array(c)) if c.len() == 2 => pair(c.first(), c.get(1)),
        _ => pair(obj.get("x"), obj.get("y")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_click_step() {
        let plan = parse(r#"[{"type":"click","description":"Search button","confidence":0.95}]"#);
        assert!(!plan.degraded);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].kind, ActionKind::Click);
        assert_eq!(plan.steps[0].confidence, 0.95);
        assert_eq!(plan.steps[0].timeline_line(0), "Step 1: click - Search button");
    }

    #[test]
    fn prose_degrades_to_analysis_step() {
        let plan = parse("I clicked the button");
        assert!(plan.degraded);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].kind, ActionKind::Analysis);
        assert_eq!(plan.steps[0].description, "I clicked the button");
        assert_eq!(plan.steps[0].confidence, 0.7);
    }

    #[test]
    fn non_array_json_degrades() {
        assert!(parse(r#"{"type":"click"}"#).degraded);
        assert!(parse("42").degraded);
        assert!(parse("").degraded);
    }

    #[test]
    fn one_bad_element_rejects_whole_array() {
        let plan = parse(r#"[{"type":"click","description":"ok"}, "scroll down"]"#);
        assert!(plan.degraded);
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn empty_array_yields_no_steps() {
        let plan = parse("[]");
        assert!(!plan.degraded);
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n[{\"type\":\"type\",\"description\":\"Search box\",\"text\":\"rust\"}]\n```";
        let plan = parse(raw);
        assert!(!plan.degraded);
        assert_eq!(plan.steps[0].kind, ActionKind::Type);
        assert_eq!(plan.steps[0].text_to_type.as_deref(), Some("rust"));
    }

    #[test]
    fn missing_confidence_uses_step_default_and_out_of_range_is_clamped() {
        let plan = parse(r#"[{"type":"wait"},{"type":"scroll","confidence":3}]"#);
        assert_eq!(plan.steps[0].confidence, 0.85);
        assert_eq!(plan.steps[1].confidence, 1.0);
    }

    #[test]
    fn coordinate_shapes_and_aliases() {
        let plan = parse(
            r#"[
                {"action":"Click","target":"OK","coordinates":{"x":10,"y":20}},
                {"type":"click","element":"Cancel","coordinates":[30.5,40]},
                {"type":"click","description":"Help","x":1,"y":2},
                {"type":"click","description":"Bad","coordinates":"100,200"}
            ]"#,
        );
        assert!(!plan.degraded);
        assert_eq!(plan.steps[0].kind, ActionKind::Click);
        assert_eq!(plan.steps[0].description, "OK");
        assert_eq!(plan.steps[0].coordinates, Some(Point { x: 10.0, y: 20.0 }));
        assert_eq!(plan.steps[1].coordinates, Some(Point { x: 30.5, y: 40.0 }));
        assert_eq!(plan.steps[2].coordinates, Some(Point { x: 1.0, y: 2.0 }));
        assert_eq!(plan.steps[3].coordinates, None);
    }

    #[test]
    fn decoded_actions_are_mapped_leniently() {
        let actions = serde_json::json!([
            {"action":"click","target":"Search","coordinates":"(100, 200)","confidence":"0.9"},
            {"type":"scroll","description":"results","confidence":"high"}
        ]);
        let plan = PlanParser::default().parse_value(&actions);
        assert!(!plan.degraded);
        assert_eq!(plan.steps[0].kind, ActionKind::Click);
        assert_eq!(plan.steps[0].description, "Search");
        assert_eq!(plan.steps[0].coordinates, None);
        assert_eq!(plan.steps[0].confidence, 0.9);
        assert_eq!(plan.steps[1].confidence, 0.85);
    }

    #[test]
    fn decoded_non_list_degrades() {
        let parser = PlanParser::default();
        let plan = parser.parse_value(&serde_json::json!({"steps": []}));
        assert!(plan.degraded);
        assert_eq!(plan.steps[0].description, r#"{"steps":[]}"#);

        let missing = parser.parse_value(&Value::Null);
        assert!(missing.degraded);
        assert_eq!(missing.steps[0].description, "");

        let text = parser.parse_value(&Value::String(r#"[{"type":"wait"}]"#.into()));
        assert!(!text.degraded);
        assert_eq!(text.steps[0].kind, ActionKind::Wait);
    }

    #[test]
    fn custom_table_changes_fallback_confidence() {
        let table = ConfidenceTable {
            plan_fallback: 0.4,
            ..ConfidenceTable::default()
        };
        let plan = PlanParser::from_table(&table).parse("not json");
        assert_eq!(plan.steps[0].confidence, 0.4);
    }

    #[test]
    fn serialized_steps_parse_back_identically() {
        let steps = vec![
            ActionStep {
                kind: ActionKind::Click,
                description: "Search button".into(),
                coordinates: Some(Point { x: 412.0, y: 88.5 }),
                text_to_type: None,
                confidence: 0.95,
            },
            ActionStep {
                kind: ActionKind::Type,
                description: "Query field".into(),
                coordinates: None,
                text_to_type: Some("weather berlin".into()),
                confidence: 0.8,
            },
            ActionStep {
                kind: ActionKind::Other("Drag".into()),
                description: String::new(),
                coordinates: None,
                text_to_type: None,
                confidence: 0.0,
            },
        ];
        let text = serde_json::to_string(&steps).unwrap();
        let plan = parse(&text);
        assert!(!plan.degraded);
        assert_eq!(plan.steps, steps);
    }
}
