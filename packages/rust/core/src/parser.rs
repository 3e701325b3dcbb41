//! Model output to blueprint.
//!
//! Parsing never fails outright. Output that is not a JSON object becomes a
//! [`ParseOutcome::NeedsRepair`] carrying a bounded excerpt for the reviewer;
//! anything else is accepted as-is with identity defaults filled in and
//! informational warnings attached.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use servicecraft_artifacts::rules::DEFAULT_CATEGORY;
use servicecraft_shared::ServiceBlueprint;

use crate::prompt::BLUEPRINT_KEYS;
use crate::request::CatalogContext;

/// Upper bound on the raw-output excerpt kept for manual repair.
pub const MAX_EXCERPT_CHARS: usize = 5000;

/// Something the reviewer should look at. Never a reason to reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlueprintWarning {
    /// An identity field was missing and got a default.
    Defaulted { field: &'static str, value: String },
    /// Trigger entries with the wrong shape were dropped from the typed view.
    DroppedTriggers { kind: &'static str, dropped: usize },
    /// A trigger references a question outside the supplied catalog.
    UnknownQuestion { question_id: String },
    /// The generated code is already used by an existing service.
    CodeCollision { code: String },
    /// A top-level key outside the blueprint schema.
    UnexpectedKey { key: String },
    /// A field had the wrong shape and was coerced or defaulted in the typed view.
    MalformedField { path: String },
}

impl fmt::Display for BlueprintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaulted { field, value } => {
                write!(f, "identity.{field} missing; defaulted to '{value}'")
            }
            Self::DroppedTriggers { kind, dropped } => {
                write!(f, "{dropped} malformed {kind} trigger(s) dropped")
            }
            Self::UnknownQuestion { question_id } => {
                write!(f, "trigger references unknown question id '{question_id}'")
            }
            Self::CodeCollision { code } => {
                write!(f, "service code '{code}' already exists in the catalogue")
            }
            Self::UnexpectedKey { key } => write!(f, "unexpected top-level key '{key}'"),
            Self::MalformedField { path } => {
                write!(f, "{path} had an unexpected shape; read leniently")
            }
        }
    }
}

/// A structurally accepted blueprint.
#[derive(Debug, Clone)]
pub struct AcceptedBlueprint {
    /// Lenient typed view used by the compiler.
    pub blueprint: ServiceBlueprint,
    /// The model's JSON document with identity defaults applied.
    pub document: Value,
    pub warnings: Vec<BlueprintWarning>,
}

#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Accepted(AcceptedBlueprint),
    /// Output that could not be read as a JSON object.
    NeedsRepair { error: String, excerpt: String },
}

/// Remove every markdown code-fence marker and trim.
pub fn strip_fences(raw: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"```(?i:json)?[ \t]*\r?\n?").expect("valid regex")
    });
    FENCE_RE.replace_all(raw, "").trim().to_string()
}

/// First [`MAX_EXCERPT_CHARS`] characters of `raw`.
pub fn excerpt(raw: &str) -> String {
    raw.chars().take(MAX_EXCERPT_CHARS).collect()
}

/// Lowercase snake_case code derived from a display name.
pub fn service_code_from_name(name: &str) -> String {
    let mut code = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            code.push(c.to_ascii_lowercase());
        } else if !code.is_empty() && !code.ends_with('_') {
            code.push('_');
        }
    }
    let code = code.trim_end_matches('_');
    if code.is_empty() {
        "new_service".to_string()
    } else {
        code.to_string()
    }
}

/// Parse raw provider output.
///
/// `source_name` supplies identity defaults; `catalog` is used for the
/// collision and question-id checks.
pub fn parse_blueprint(raw: &str, source_name: &str, catalog: &CatalogContext) -> ParseOutcome {
    let cleaned = strip_fences(raw);
    let mut document: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(e) => return needs_repair(format!("invalid JSON: {e}"), raw),
    };
    let Some(object) = document.as_object_mut() else {
        return needs_repair("expected a JSON object".to_string(), raw);
    };

    let mut warnings = Vec::new();
    apply_identity_defaults(object, source_name, &mut warnings);
    for key in object.keys() {
        if !BLUEPRINT_KEYS.contains(&key.as_str()) {
            warnings.push(BlueprintWarning::UnexpectedKey { key: key.clone() });
        }
    }

    let blueprint: ServiceBlueprint = match serde_json::from_value(document.clone()) {
        Ok(bp) => bp,
        Err(e) => return needs_repair(format!("unreadable blueprint: {e}"), raw),
    };

    check_shapes(&document, &blueprint, &mut warnings);
    check_triggers(&document, &blueprint, catalog, &mut warnings);
    if let Some(code) = blueprint.identity.code.as_deref() {
        if catalog.has_code(code) {
            warnings.push(BlueprintWarning::CodeCollision { code: code.to_string() });
        }
    }

    ParseOutcome::Accepted(AcceptedBlueprint {
        blueprint,
        document,
        warnings,
    })
}

fn needs_repair(error: String, raw: &str) -> ParseOutcome {
    let excerpt = if raw.trim().is_empty() {
        "(empty response)".to_string()
    } else {
        excerpt(raw)
    };
    ParseOutcome::NeedsRepair { error, excerpt }
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn apply_identity_defaults(
    object: &mut Map<String, Value>,
    source_name: &str,
    warnings: &mut Vec<BlueprintWarning>,
) {
    let identity = object
        .entry("identity")
        .or_insert_with(|| Value::Object(Map::new()));
    if !identity.is_object() {
        *identity = Value::Object(Map::new());
    }
    let Some(identity) = identity.as_object_mut() else {
        return;
    };

    let name = non_empty(identity.get("name")).map(String::from);
    let code = non_empty(identity.get("code")).map(String::from);

    let code_default = service_code_from_name(source_name);
    let name = name.unwrap_or_else(|| {
        set_default(identity, "name", source_name, warnings);
        source_name.to_string()
    });
    if code.is_none() {
        set_default(identity, "code", &code_default, warnings);
    }
    if non_empty(identity.get("displayName")).is_none() {
        set_default(identity, "displayName", &name, warnings);
    }
    if non_empty(identity.get("category")).is_none() {
        set_default(identity, "category", DEFAULT_CATEGORY, warnings);
    }
}

fn set_default(
    identity: &mut Map<String, Value>,
    field: &'static str,
    value: &str,
    warnings: &mut Vec<BlueprintWarning>,
) {
    identity.insert(field.to_string(), Value::String(value.to_string()));
    warnings.push(BlueprintWarning::Defaulted {
        field,
        value: value.to_string(),
    });
}

/// Compare the model's document with the typed view and report every field
/// whose JSON kind changed on the way through.
fn check_shapes(
    document: &Value,
    blueprint: &ServiceBlueprint,
    warnings: &mut Vec<BlueprintWarning>,
) {
    let (Some(original), Ok(Value::Object(typed))) =
        (document.as_object(), serde_json::to_value(blueprint))
    else {
        return;
    };
    for key in BLUEPRINT_KEYS {
        let Some(raw) = original.get(key).filter(|v| !v.is_null()) else {
            continue;
        };
        match typed.get(key) {
            Some(view) => compare_shapes(key.to_string(), raw, view, warnings),
            None => warnings.push(BlueprintWarning::MalformedField { path: key.to_string() }),
        }
    }
}

fn compare_shapes(path: String, raw: &Value, view: &Value, warnings: &mut Vec<BlueprintWarning>) {
    if raw.is_null() {
        return;
    }
    match (raw, view) {
        (Value::Object(raw), Value::Object(view)) => {
            for (key, raw_child) in raw {
                if let Some(view_child) = view.get(key) {
                    compare_shapes(format!("{path}.{key}"), raw_child, view_child, warnings);
                }
            }
        }
        // Lists that lost entries are reported by the trigger count instead.
        (Value::Array(raw), Value::Array(view)) if raw.len() == view.len() => {
            for (i, (raw_item, view_item)) in raw.iter().zip(view).enumerate() {
                compare_shapes(format!("{path}[{i}]"), raw_item, view_item, warnings);
            }
        }
        (Value::Array(_), Value::Array(_)) => {}
        _ if std::mem::discriminant(raw) != std::mem::discriminant(view) => {
            warnings.push(BlueprintWarning::MalformedField { path });
        }
        _ => {}
    }
}

fn raw_trigger_count(document: &Value, key: &str) -> usize {
    document
        .get("scoring")
        .and_then(|s| s.get(key))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

fn check_triggers(
    document: &Value,
    blueprint: &ServiceBlueprint,
    catalog: &CatalogContext,
    warnings: &mut Vec<BlueprintWarning>,
) {
    let scoring = &blueprint.scoring;
    for (kind, key, kept) in [
        ("choice", "choiceTriggers", scoring.choice_triggers.len()),
        ("keyword", "keywordTriggers", scoring.keyword_triggers.len()),
    ] {
        let dropped = raw_trigger_count(document, key).saturating_sub(kept);
        if dropped > 0 {
            warnings.push(BlueprintWarning::DroppedTriggers { kind, dropped });
        }
    }

    // The blueprint's own assessment questions are valid targets too.
    let own: BTreeSet<&str> = blueprint
        .assessment
        .sections
        .iter()
        .flat_map(|s| s.questions.iter())
        .map(|q| q.question_id.as_str())
        .collect();

    let referenced: BTreeSet<&str> = scoring
        .choice_triggers
        .iter()
        .map(|t| t.question_id.trim())
        .chain(
            scoring
                .keyword_triggers
                .iter()
                .flat_map(|t| t.target_questions.iter().map(|q| q.trim())),
        )
        .filter(|q| !q.is_empty())
        .collect();

    for question_id in referenced {
        if !own.contains(question_id) && !catalog.knows_question(question_id) {
            warnings.push(BlueprintWarning::UnknownQuestion {
                question_id: question_id.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CatalogQuestion, CatalogService};

    fn catalog() -> CatalogContext {
        CatalogContext {
            services: vec![CatalogService {
                code: "management_accounts".into(),
                name: "Management Accounts".into(),
                ..CatalogService::default()
            }],
            questions: vec![CatalogQuestion {
                question_id: "sd_financial_confidence".into(),
                ..CatalogQuestion::default()
            }],
            skills: Vec::new(),
        }
    }

    fn accepted(outcome: ParseOutcome) -> AcceptedBlueprint {
        match outcome {
            ParseOutcome::Accepted(a) => a,
            ParseOutcome::NeedsRepair { error, .. } => panic!("expected accepted, got {error}"),
        }
    }

    #[test]
    fn malformed_fenced_output_needs_repair() {
        let raw = "Sure! ```json\n{not valid json}\n```";
        assert_eq!(strip_fences(raw), "Sure! {not valid json}");

        match parse_blueprint(raw, "Cash Flow Clinic", &catalog()) {
            ParseOutcome::NeedsRepair { error, excerpt } => {
                assert!(error.starts_with("invalid JSON"));
                assert!(!excerpt.is_empty());
                assert!(excerpt.chars().count() <= MAX_EXCERPT_CHARS);
                assert_eq!(excerpt, raw);
            }
            ParseOutcome::Accepted(_) => panic!("malformed output accepted"),
        }
    }

    #[test]
    fn fenced_object_is_accepted() {
        let raw = "```json\n{\"identity\": {\"code\": \"cash_flow_clinic\", \"name\": \"Cash Flow Clinic\", \"displayName\": \"Cash Flow Clinic\", \"category\": \"financial\"}}\n```";
        let a = accepted(parse_blueprint(raw, "ignored", &catalog()));
        assert_eq!(a.blueprint.identity.code.as_deref(), Some("cash_flow_clinic"));
        assert!(a.warnings.is_empty(), "{:?}", a.warnings);
    }

    #[test]
    fn non_object_needs_repair() {
        let outcome = parse_blueprint("[1, 2, 3]", "x", &catalog());
        assert!(matches!(outcome, ParseOutcome::NeedsRepair { ref error, .. } if error == "expected a JSON object"));

        let outcome = parse_blueprint("   ", "x", &catalog());
        let ParseOutcome::NeedsRepair { excerpt, .. } = outcome else {
            panic!("blank output accepted");
        };
        assert_eq!(excerpt, "(empty response)");
    }

    #[test]
    fn long_output_excerpt_is_bounded_on_char_boundary() {
        let raw = format!("not json {}", "£".repeat(MAX_EXCERPT_CHARS * 2));
        let ParseOutcome::NeedsRepair { excerpt, .. } = parse_blueprint(&raw, "x", &catalog()) else {
            panic!("garbage accepted");
        };
        assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS);
        assert!(excerpt.starts_with("not json £"));
    }

    #[test]
    fn identity_defaults_come_from_source_name() {
        let a = accepted(parse_blueprint("{\"pricing\": {}}", "Cash Flow Clinic!", &catalog()));
        let identity = &a.document["identity"];
        assert_eq!(identity["code"], "cash_flow_clinic");
        assert_eq!(identity["name"], "Cash Flow Clinic!");
        assert_eq!(identity["displayName"], "Cash Flow Clinic!");
        assert_eq!(identity["category"], DEFAULT_CATEGORY);
        assert_eq!(a.blueprint.identity.code.as_deref(), Some("cash_flow_clinic"));

        let fields: Vec<&str> = a
            .warnings
            .iter()
            .filter_map(|w| match w {
                BlueprintWarning::Defaulted { field, .. } => Some(*field),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["name", "code", "displayName", "category"]);
    }

    #[test]
    fn display_name_defaults_to_model_name() {
        let raw = r#"{"identity": {"code": "exit_ready", "name": "Exit Ready"}}"#;
        let a = accepted(parse_blueprint(raw, "Source Name", &catalog()));
        assert_eq!(a.document["identity"]["displayName"], "Exit Ready");
    }

    #[test]
    fn warnings_cover_triggers_and_collisions() {
        let raw = r#"{
            "identity": {"code": "management_accounts", "name": "MA", "displayName": "MA", "category": "foundation"},
            "assessment": {"sections": [{"name": "Basics", "questions": [{"questionId": "ma_own_question"}]}]},
            "scoring": {
                "choiceTriggers": [
                    {"questionId": "sd_financial_confidence", "responseValue": "Not confident", "points": 30},
                    {"questionId": "dd_invented", "responseValue": "Yes", "points": 20},
                    {"questionId": "broken", "points": "lots"}
                ],
                "keywordTriggers": [
                    {"keywords": ["cash"], "targetQuestions": ["ma_own_question"], "points": 15}
                ]
            },
            "extras": true
        }"#;
        let a = accepted(parse_blueprint(raw, "x", &catalog()));
        assert_eq!(a.blueprint.scoring.choice_triggers.len(), 2);

        let rendered: Vec<String> = a.warnings.iter().map(ToString::to_string).collect();
        assert!(a.warnings.contains(&BlueprintWarning::UnexpectedKey { key: "extras".into() }));
        assert!(a.warnings.contains(&BlueprintWarning::DroppedTriggers { kind: "choice", dropped: 1 }));
        assert!(a.warnings.contains(&BlueprintWarning::UnknownQuestion { question_id: "dd_invented".into() }));
        assert!(a.warnings.contains(&BlueprintWarning::CodeCollision { code: "management_accounts".into() }));
        assert!(!rendered.iter().any(|w| w.contains("ma_own_question")));
        assert!(!rendered.iter().any(|w| w.contains("sd_financial_confidence")));
    }

    #[test]
    fn keyword_string_does_not_hide_collision() {
        let raw = r#"{
            "identity": {"code": "management_accounts", "name": "Management Accounts",
                         "displayName": "Management Accounts", "category": "foundation",
                         "keywords": "cash, runway"}
        }"#;
        let a = accepted(parse_blueprint(raw, "Source", &catalog()));
        assert_eq!(a.blueprint.identity.code.as_deref(), Some("management_accounts"));
        assert_eq!(a.blueprint.identity.keywords, vec!["cash", "runway"]);
        assert!(a.warnings.contains(&BlueprintWarning::CodeCollision { code: "management_accounts".into() }));
        assert!(a.warnings.contains(&BlueprintWarning::MalformedField { path: "identity.keywords".into() }));
        assert!(!a.warnings.iter().any(|w| matches!(w, BlueprintWarning::Defaulted { .. })));
    }

    #[test]
    fn string_threshold_keeps_choice_triggers() {
        let raw = r#"{
            "identity": {"code": "cash_clinic", "name": "Cash Clinic", "displayName": "Cash Clinic", "category": "growth"},
            "scoring": {
                "recommendationThreshold": "50",
                "choiceTriggers": [
                    {"questionId": "sd_financial_confidence", "responseValue": "Not confident", "points": 30}
                ]
            }
        }"#;
        let a = accepted(parse_blueprint(raw, "x", &catalog()));
        assert_eq!(a.blueprint.scoring.recommendation_threshold, Some(50));
        assert_eq!(a.blueprint.scoring.choice_triggers.len(), 1);
        assert!(!a.warnings.iter().any(|w| matches!(w, BlueprintWarning::DroppedTriggers { .. })));
        assert_eq!(
            a.warnings,
            vec![BlueprintWarning::MalformedField { path: "scoring.recommendationThreshold".into() }]
        );
        assert_eq!(
            a.warnings[0].to_string(),
            "scoring.recommendationThreshold had an unexpected shape; read leniently"
        );
    }

    #[test]
    fn unreadable_section_is_reported() {
        let raw = r#"{
            "identity": {"code": "cash_clinic", "name": "Cash Clinic", "displayName": "Cash Clinic", "category": "growth"},
            "pricing": "call us",
            "narrative": ["not", "an", "object"]
        }"#;
        let a = accepted(parse_blueprint(raw, "x", &catalog()));
        assert!(a.warnings.contains(&BlueprintWarning::MalformedField { path: "pricing".into() }));
        assert!(a.warnings.contains(&BlueprintWarning::MalformedField { path: "narrative".into() }));
        assert!(a.blueprint.narrative.is_none());
    }

    #[test]
    fn code_from_name() {
        assert_eq!(service_code_from_name("Cash Flow Clinic"), "cash_flow_clinic");
        assert_eq!(service_code_from_name("  £££ "), "new_service");
        assert_eq!(service_code_from_name("365 / Goal-Alignment"), "365_goal_alignment");
    }
}
