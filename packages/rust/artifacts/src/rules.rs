//! Blueprint scoring section to a structured [`ServiceDefinition`].

use servicecraft_shared::{
    ChoiceTrigger, DEFAULT_THRESHOLD, KeywordTrigger, Result, ServiceBlueprint, ServiceCraftError,
    ServiceDefinition,
};

/// Category used when the blueprint names none.
pub const DEFAULT_CATEGORY: &str = "strategic";

/// Identity fields after fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub code: String,
    pub name: String,
    pub display_name: String,
    pub category: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve identity fallbacks: name from code, display name from name.
pub fn resolve_identity(blueprint: &ServiceBlueprint) -> Result<ResolvedIdentity> {
    let identity = &blueprint.identity;
    let code = non_empty(identity.code.as_deref())
        .ok_or_else(|| ServiceCraftError::compile("blueprint has no identity.code"))?
        .to_string();
    let name = non_empty(identity.name.as_deref()).unwrap_or(&code).to_string();
    let display_name = non_empty(identity.display_name.as_deref())
        .unwrap_or(&name)
        .to_string();
    let category = non_empty(identity.category.as_deref())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    Ok(ResolvedIdentity {
        code,
        name,
        display_name,
        category,
    })
}

/// Translate the blueprint's declarative triggers into the rule-set schema
/// evaluated by the scoring engine. Entries without a question or value are
/// skipped.
pub fn compile_rules(blueprint: &ServiceBlueprint) -> Result<ServiceDefinition> {
    let identity = resolve_identity(blueprint)?;
    let scoring = &blueprint.scoring;

    let choice_triggers = scoring
        .choice_triggers
        .iter()
        .filter(|t| !t.question_id.trim().is_empty() && !t.response_value.is_empty())
        .map(|t| ChoiceTrigger {
            question_id: t.question_id.trim().to_string(),
            expected_value: t.response_value.clone(),
            points: t.points,
            description: description_or(&t.trigger_description, || {
                format!("{} = {}", t.question_id.trim(), t.response_value)
            }),
        })
        .collect();

    let keyword_triggers = scoring
        .keyword_triggers
        .iter()
        .filter_map(|t| {
            let targets: Vec<String> = t
                .target_questions
                .iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect();
            let keywords: Vec<String> = t
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if targets.is_empty() || keywords.is_empty() {
                return None;
            }
            Some(KeywordTrigger {
                description: description_or(&t.trigger_description, || {
                    format!("Mentions {}", keywords.join(", "))
                }),
                target_question_ids: targets,
                keywords,
                points: t.points,
            })
        })
        .collect();

    Ok(ServiceDefinition {
        code: identity.code,
        name: identity.name,
        display_name: identity.display_name,
        category: identity.category,
        threshold: scoring.recommendation_threshold.unwrap_or(DEFAULT_THRESHOLD),
        choice_triggers,
        keyword_triggers,
    })
}

fn description_or(description: &str, fallback: impl FnOnce() -> String) -> String {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servicecraft_shared::{BlueprintChoiceTrigger, BlueprintKeywordTrigger};

    fn blueprint() -> ServiceBlueprint {
        let mut bp = ServiceBlueprint::default();
        bp.identity.code = Some("cash_flow_clinic".into());
        bp.identity.name = Some("Cash Flow Clinic".into());
        bp
    }

    #[test]
    fn identity_fallbacks() {
        let mut bp = ServiceBlueprint::default();
        bp.identity.code = Some("cash_flow_clinic".into());
        let identity = resolve_identity(&bp).unwrap();
        assert_eq!(identity.name, "cash_flow_clinic");
        assert_eq!(identity.display_name, "cash_flow_clinic");
        assert_eq!(identity.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn missing_code_is_compile_error() {
        let err = compile_rules(&ServiceBlueprint::default()).unwrap_err();
        assert!(matches!(err, ServiceCraftError::Compile { .. }));
    }

    #[test]
    fn triggers_translate_and_skip_blanks() {
        let mut bp = blueprint();
        bp.scoring.recommendation_threshold = Some(40);
        bp.scoring.choice_triggers = vec![
            BlueprintChoiceTrigger {
                question_id: "sd_financial_confidence".into(),
                response_value: "Not confident - I mostly guess".into(),
                points: 30,
                trigger_description: String::new(),
            },
            BlueprintChoiceTrigger {
                question_id: " ".into(),
                response_value: "x".into(),
                points: 10,
                trigger_description: "blank question".into(),
            },
        ];
        bp.scoring.keyword_triggers = vec![
            BlueprintKeywordTrigger {
                keywords: vec!["cash".into(), " ".into()],
                target_questions: vec!["dd_sleep_thieves".into()],
                points: 15,
                trigger_description: "Cash worries".into(),
            },
            BlueprintKeywordTrigger {
                keywords: vec![],
                target_questions: vec!["dd_sleep_thieves".into()],
                points: 15,
                trigger_description: "no keywords".into(),
            },
        ];

        let def = compile_rules(&bp).unwrap();
        assert_eq!(def.threshold, 40);
        assert_eq!(def.choice_triggers.len(), 1);
        assert_eq!(
            def.choice_triggers[0].description,
            "sd_financial_confidence = Not confident - I mostly guess"
        );
        assert_eq!(def.keyword_triggers.len(), 1);
        assert_eq!(def.keyword_triggers[0].keywords, vec!["cash".to_string()]);
    }
}
