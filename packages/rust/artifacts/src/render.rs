//! Text renderers for the review artifacts.
//!
//! Everything here is presentation: the strings are shown to a reviewer and
//! exported, never compiled or executed by this workspace.

use std::collections::BTreeMap;

use serde::Serialize;
use servicecraft_shared::{Result, ServiceBlueprint, ServiceCraftError, ServiceDefinition};

use crate::escape::{
    identifier, line_comment, markdown_cell, rust_string, sql_literal, sql_number, sql_optional,
};
use crate::rules::ResolvedIdentity;

// ---------------------------------------------------------------------------
// Registry entry (TOML)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RegistryEntry<'a> {
    name: &'a str,
    display_name: &'a str,
    category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    keywords: &'a [String],
    is_recurring: bool,
    default_tier_index: usize,
    price: f64,
    price_display: &'a str,
    period: &'a str,
    is_active: bool,
    tiers: Vec<RegistryTier<'a>>,
}

#[derive(Serialize)]
struct RegistryTier<'a> {
    name: &'a str,
    price: f64,
    price_display: &'a str,
    period: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tagline: Option<&'a str>,
}

/// Catalog entry keyed by service code, as a TOML document.
pub(crate) fn registry_entry(bp: &ServiceBlueprint, identity: &ResolvedIdentity) -> Result<String> {
    let pricing = &bp.pricing;
    let default_tier = pricing.default_tier();
    let outcome = bp
        .narrative
        .as_ref()
        .and_then(|n| n.outcome_statement.as_deref())
        .or(bp.identity.outcome.as_deref());

    let entry = RegistryEntry {
        name: &identity.name,
        display_name: &identity.display_name,
        category: &identity.category,
        outcome,
        description: bp.identity.description.as_deref(),
        keywords: &bp.identity.keywords,
        is_recurring: pricing.is_recurring,
        default_tier_index: pricing.default_tier_index.unwrap_or(0),
        price: default_tier.map(|t| t.effective_price()).unwrap_or(0.0),
        price_display: default_tier.map(|t| t.display_price()).unwrap_or("TBD"),
        period: default_tier
            .and_then(|t| t.period.as_deref())
            .unwrap_or("one-off"),
        is_active: true,
        tiers: pricing
            .tiers
            .iter()
            .map(|t| RegistryTier {
                name: &t.name,
                price: t.effective_price(),
                price_display: t.display_price(),
                period: t.period.as_deref().unwrap_or("one-off"),
                tagline: t.tagline.as_deref(),
            })
            .collect(),
    };

    let mut services = BTreeMap::new();
    services.insert(identity.code.as_str(), entry);
    let mut doc = BTreeMap::new();
    doc.insert("services", services);

    toml::to_string_pretty(&doc)
        .map_err(|e| ServiceCraftError::compile(format!("registry entry: {e}")))
}

// ---------------------------------------------------------------------------
// Scorer fragment (Rust)
// ---------------------------------------------------------------------------

/// One block per trigger, for a reviewer to read or paste into a scorer.
pub(crate) fn scorer_fragment(def: &ServiceDefinition) -> String {
    let mut lines = vec![
        format!("// === {} ({}) ===", line_comment(&def.name), line_comment(&def.code)),
        "// Generated review fragment. Stage the structured rules instead of pasting this.".into(),
        format!(
            "pub fn score_{}(responses: &AssessmentResponseSet, hits: &mut Vec<(i32, String)>) {{",
            identifier(&def.code)
        ),
    ];

    for trigger in &def.choice_triggers {
        lines.push(format!("    // {}", line_comment(&trigger.description)));
        lines.push(format!(
            "    if responses.get({}).is_some_and(|v| v.text().to_lowercase() == {}) {{",
            rust_string(&trigger.question_id),
            rust_string(&trigger.expected_value.to_lowercase()),
        ));
        lines.push(format!(
            "        hits.push(({}, {}.to_string()));",
            trigger.points,
            rust_string(&trigger.description)
        ));
        lines.push("    }".into());
    }

    for trigger in &def.keyword_triggers {
        let targets: Vec<String> = trigger
            .target_question_ids
            .iter()
            .map(|q| rust_string(q))
            .collect();
        let keywords: Vec<String> = trigger
            .keywords
            .iter()
            .map(|k| rust_string(&k.to_lowercase()))
            .collect();

        lines.push(format!("    // {}", line_comment(&trigger.description)));
        lines.push(format!("    for question_id in [{}] {{", targets.join(", ")));
        lines.push(
            "        let text = responses.get(question_id).map(|v| v.text().to_lowercase()).unwrap_or_default();"
                .into(),
        );
        lines.push(format!(
            "        if [{}].iter().any(|k| text.contains(k)) {{",
            keywords.join(", ")
        ));
        lines.push(format!(
            "            hits.push(({}, {}.to_string()));",
            trigger.points,
            rust_string(&trigger.description)
        ));
        lines.push("            break;".into());
        lines.push("        }".into());
        lines.push("    }".into());
    }

    lines.push("}".into());
    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Rules fragment (TOML)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RulesFragment<'a> {
    services: [&'a ServiceDefinition; 1],
}

/// The structured rules as a rule-set fragment.
pub(crate) fn rules_fragment(def: &ServiceDefinition) -> Result<String> {
    let body = toml::to_string_pretty(&RulesFragment { services: [def] })
        .map_err(|e| ServiceCraftError::compile(format!("rules fragment: {e}")))?;
    Ok(format!(
        "# Candidate rules for {}. Stage with RuleSet::with_candidate; do not merge unreviewed.\n{body}",
        line_comment(&def.name)
    ))
}

// ---------------------------------------------------------------------------
// SQL migrations
// ---------------------------------------------------------------------------

/// Placeholder the reviewer replaces with the target practice id.
pub const PRACTICE_PLACEHOLDER: &str = "{{PRACTICE_ID}}";

pub(crate) fn services_migration(bp: &ServiceBlueprint, identity: &ResolvedIdentity) -> String {
    let tier = bp.pricing.default_tier();
    let price = tier.map(|t| t.effective_price()).unwrap_or(0.0);
    let display = tier.map(|t| t.display_price()).unwrap_or("TBD");
    let period = tier.and_then(|t| t.period.as_deref()).unwrap_or("one-off");

    format!(
        "-- Service catalog row for {name}\n\
         INSERT INTO services (code, name, category, description, status, price_amount, price_period, price_display)\n\
         VALUES ({code}, {name_lit}, {category}, {description}, 'active', {price}, {period}, {display})\n\
         ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, category = EXCLUDED.category, \
         description = EXCLUDED.description, price_amount = EXCLUDED.price_amount, \
         price_period = EXCLUDED.price_period, price_display = EXCLUDED.price_display;\n",
        name = line_comment(&identity.name),
        code = sql_literal(&identity.code),
        name_lit = sql_literal(&identity.name),
        category = sql_literal(&identity.category),
        description = sql_literal(bp.identity.description.as_deref().unwrap_or("")),
        price = sql_number(price),
        period = sql_literal(period),
        display = sql_literal(display),
    )
}

pub(crate) fn assessment_migration(bp: &ServiceBlueprint, identity: &ResolvedIdentity) -> String {
    let mut rows = Vec::new();
    let mut order = 1;
    for section in &bp.assessment.sections {
        for q in &section.questions {
            let options = if q.options.is_empty() {
                "NULL".to_string()
            } else {
                let json = serde_json::to_string(&q.options).unwrap_or_else(|_| "[]".into());
                sql_literal(&json)
            };
            rows.push(format!(
                "({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                sql_literal(&identity.code),
                sql_literal(&section.name),
                sql_literal(&q.question_id),
                sql_literal(&q.question_text),
                sql_literal(&q.question_type),
                options,
                sql_optional(q.placeholder.as_deref()),
                q.char_limit.map(|c| c.to_string()).unwrap_or_else(|| "NULL".into()),
                q.is_required,
                order,
                sql_literal(q.ai_anchor.as_deref().unwrap_or("")),
            ));
            order += 1;
        }
    }

    if rows.is_empty() {
        return "-- No assessment questions\n".into();
    }

    format!(
        "-- Assessment questions for {}\n\
         INSERT INTO assessment_questions (service_line_code, section, question_id, question_text, \
         question_type, options, placeholder, char_limit, is_required, display_order, ai_anchor)\n\
         VALUES\n{};\n",
        line_comment(&identity.name),
        rows.join(",\n")
    )
}

fn frequency(period: Option<&str>) -> &'static str {
    match period {
        Some("monthly") => "monthly",
        Some("annual") => "annual",
        Some("quarterly") => "quarterly",
        _ => "one_time",
    }
}

fn tier_code(name: &str, index: usize) -> String {
    let words: Vec<String> = name.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        format!("tier{}", index + 1)
    } else {
        words.join("_")
    }
}

pub(crate) fn pricing_migration(bp: &ServiceBlueprint, identity: &ResolvedIdentity) -> String {
    let practice = sql_literal(PRACTICE_PLACEHOLDER);
    let code = sql_literal(&identity.code);

    let mut blocks = vec![format!(
        "-- First ensure service_pricing row exists for practice:\n\
         INSERT INTO service_pricing (practice_id, service_code, service_name, category, pricing_model)\n\
         VALUES ({practice}, {code}, {name}, {category}, 'tiered')\n\
         ON CONFLICT (practice_id, service_code) DO UPDATE SET service_name = EXCLUDED.service_name;",
        name = sql_literal(&identity.name),
        category = sql_literal(&identity.category),
    )];

    for (index, tier) in bp.pricing.tiers.iter().enumerate() {
        blocks.push(format!(
            "-- Tier: {label}\n\
             INSERT INTO service_pricing_tiers (service_pricing_id, tier_name, tier_code, price, frequency, description) \
             SELECT id, {name}, {tier_code}, {price}, {frequency}, {tagline} \
             FROM service_pricing WHERE practice_id = {practice} AND service_code = {code};",
            label = line_comment(&tier.name),
            name = sql_literal(&tier.name),
            tier_code = sql_literal(&tier_code(&tier.name, index)),
            price = sql_number(tier.effective_price()),
            frequency = sql_literal(frequency(tier.period.as_deref())),
            tagline = sql_literal(tier.tagline.as_deref().unwrap_or("")),
        ));
    }

    blocks.join("\n\n") + "\n"
}

// ---------------------------------------------------------------------------
// Skills mapping (Markdown)
// ---------------------------------------------------------------------------

pub(crate) fn skills_mapping(bp: &ServiceBlueprint, identity: &ResolvedIdentity) -> String {
    let level = |l: Option<u8>| l.map(|v| v.to_string()).unwrap_or_else(|| "-".into());

    let mut lines = vec![
        format!("### {}", markdown_cell(&identity.name)),
        "| Skill | Category | Min Level | Ideal Level | Critical |".into(),
        "|-------|----------|-----------|-------------|----------|".into(),
    ];
    for skill in &bp.skills.required {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            markdown_cell(&skill.skill_name),
            markdown_cell(&skill.category),
            level(skill.min_level),
            level(skill.ideal_level),
            if skill.is_critical { "Yes" } else { "No" },
        ));
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use servicecraft_shared::blueprint::{AssessmentQuestion, AssessmentSection, SkillRequirement};
    use servicecraft_shared::{ChoiceTrigger, KeywordTrigger, PricingTier};

    fn identity() -> ResolvedIdentity {
        ResolvedIdentity {
            code: "owners_review".into(),
            name: "Owner's Review".into(),
            display_name: "Owner's Review".into(),
            category: "strategic".into(),
        }
    }

    fn blueprint() -> ServiceBlueprint {
        let mut bp = ServiceBlueprint::default();
        bp.identity.description = Some("A review of the owner's \"real\" numbers".into());
        bp.pricing.tiers = vec![
            PricingTier {
                name: "Core Review".into(),
                price: Some(2000.0),
                price_formatted: Some("£2,000".into()),
                period: Some("one-off".into()),
                tagline: Some("Know what's working".into()),
                ..Default::default()
            },
            PricingTier {
                name: "".into(),
                period: Some("monthly".into()),
                ..Default::default()
            },
        ];
        bp
    }

    #[test]
    fn registry_entry_is_valid_toml() {
        let text = registry_entry(&blueprint(), &identity()).unwrap();
        let parsed: toml::Value = toml::from_str(&text).expect("registry toml parses");
        let entry = &parsed["services"]["owners_review"];
        assert_eq!(entry["name"].as_str(), Some("Owner's Review"));
        assert_eq!(entry["price"].as_float(), Some(2000.0));
        assert_eq!(entry["price_display"].as_str(), Some("£2,000"));
        assert_eq!(entry["tiers"][1]["price_display"].as_str(), Some("TBD"));
        assert_eq!(entry["tiers"][1]["price"].as_float(), Some(0.0));
    }

    #[test]
    fn scorer_fragment_escapes_literals() {
        let def = ServiceDefinition {
            code: "owners-review".into(),
            name: "Owner's\nReview".into(),
            display_name: String::new(),
            category: String::new(),
            threshold: 50,
            choice_triggers: vec![ChoiceTrigger {
                question_id: "sd_plan_clarity".into(),
                expected_value: "I'm \"too\" busy".into(),
                points: 15,
                description: "Plan\nclarity".into(),
            }],
            keyword_triggers: vec![KeywordTrigger {
                target_question_ids: vec!["dd_core_frustration".into()],
                keywords: vec!["Cash".into()],
                points: 10,
                description: "Cash".into(),
            }],
        };
        let text = scorer_fragment(&def);
        assert!(text.contains("pub fn score_owners_review("));
        assert!(text.contains(r#"== "i'm \"too\" busy""#));
        assert!(text.contains(r#"hits.push((15, "Plan\nclarity".to_string()));"#));
        assert!(text.contains("// Plan clarity"));
        assert!(text.contains("// === Owner's Review (owners-review) ==="));
        assert!(text.contains(r#"for question_id in ["dd_core_frustration"] {"#));
        assert!(text.contains(r#"if ["cash"].iter().any(|k| text.contains(k)) {"#));
        assert!(text.contains("break;"));
    }

    #[test]
    fn migrations_double_quotes_and_use_placeholder() {
        let bp = blueprint();
        let services = services_migration(&bp, &identity());
        assert!(services.contains("'Owner''s Review'"));
        assert!(services.contains("'A review of the owner''s \"real\" numbers'"));
        assert!(services.contains(", 2000, 'one-off', '£2,000')"));

        let pricing = pricing_migration(&bp, &identity());
        assert!(pricing.contains("'{{PRACTICE_ID}}'"));
        assert!(pricing.contains("'core_review'"));
        assert!(pricing.contains("'tier2'"));
        assert!(pricing.contains("'monthly'"));
        assert!(pricing.contains("'Know what''s working'"));
    }

    #[test]
    fn assessment_migration_numbers_questions() {
        let mut bp = blueprint();
        assert_eq!(assessment_migration(&bp, &identity()), "-- No assessment questions\n");

        bp.assessment.sections = vec![AssessmentSection {
            name: "Cash".into(),
            description: None,
            questions: vec![
                AssessmentQuestion {
                    question_id: "cfc_runway".into(),
                    question_text: "How many weeks' cash do you hold?".into(),
                    question_type: "single".into(),
                    options: vec!["<4".into(), "4-12".into()],
                    is_required: true,
                    ..Default::default()
                },
                AssessmentQuestion {
                    question_id: "cfc_worry".into(),
                    question_text: "What worries you?".into(),
                    question_type: "text".into(),
                    placeholder: Some("e.g. VAT".into()),
                    char_limit: Some(400),
                    ..Default::default()
                },
            ],
        }];
        let sql = assessment_migration(&bp, &identity());
        assert!(sql.contains("'How many weeks'' cash do you hold?'"));
        assert!(sql.contains(r#"'["<4","4-12"]'"#));
        assert!(sql.contains("'e.g. VAT', 400, false, 2,"));
        assert!(sql.contains("NULL, NULL, true, 1,"));
    }

    #[test]
    fn skills_mapping_escapes_pipes() {
        let mut bp = blueprint();
        bp.skills.required = vec![SkillRequirement {
            skill_name: "Tax | VAT".into(),
            category: "technical".into(),
            min_level: Some(3),
            ideal_level: None,
            is_critical: true,
        }];
        let md = skills_mapping(&bp, &identity());
        assert!(md.contains("| Tax \\| VAT | technical | 3 | - | Yes |"));
    }
}
