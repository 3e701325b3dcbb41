//! Blueprint compiler.
//!
//! Turns an accepted [`ServiceBlueprint`] into:
//! - a structured [`ServiceDefinition`] the scoring engine can evaluate
//!   (staged via `RuleSet::with_candidate`, never promoted here), and
//! - literal review artifacts: registry entry, scorer fragment, rules
//!   fragment, SQL migrations and a skills table.
//!
//! Compilation is pure and deterministic; nothing is executed or installed.

mod escape;
mod render;
pub mod rules;

use serde::{Deserialize, Serialize};
use servicecraft_shared::{Result, ServiceBlueprint, ServiceDefinition};
use sha2::{Digest, Sha256};
use tracing::debug;

pub use render::PRACTICE_PLACEHOLDER;
pub use rules::{ResolvedIdentity, compile_rules, resolve_identity};

/// Everything the compiler produces for one blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifacts {
    /// Structured rules, evaluated by the same engine used at runtime.
    pub rules: ServiceDefinition,
    pub registry_entry: String,
    pub scorer_fragment: String,
    pub rules_fragment: String,
    pub services_migration: String,
    pub assessment_migration: String,
    pub pricing_migration: String,
    pub skills_mapping: String,
    /// SHA-256 over the literal artifacts, for spotting hand edits.
    pub fingerprint: String,
}

impl CompiledArtifacts {
    /// Literal artifacts by name, in a fixed order.
    pub fn named(&self) -> [(&'static str, &str); 7] {
        [
            ("registry_entry", self.registry_entry.as_str()),
            ("scorer_fragment", self.scorer_fragment.as_str()),
            ("rules_fragment", self.rules_fragment.as_str()),
            ("services_migration", self.services_migration.as_str()),
            ("assessment_migration", self.assessment_migration.as_str()),
            ("pricing_migration", self.pricing_migration.as_str()),
            ("skills_mapping", self.skills_mapping.as_str()),
        ]
    }
}

/// Compile a blueprint into structured rules and review artifacts.
pub fn compile(blueprint: &ServiceBlueprint) -> Result<CompiledArtifacts> {
    let identity = resolve_identity(blueprint)?;
    let rules = compile_rules(blueprint)?;

    let mut compiled = CompiledArtifacts {
        registry_entry: render::registry_entry(blueprint, &identity)?,
        scorer_fragment: render::scorer_fragment(&rules),
        rules_fragment: render::rules_fragment(&rules)?,
        services_migration: render::services_migration(blueprint, &identity),
        assessment_migration: render::assessment_migration(blueprint, &identity),
        pricing_migration: render::pricing_migration(blueprint, &identity),
        skills_mapping: render::skills_mapping(blueprint, &identity),
        fingerprint: String::new(),
        rules,
    };
    compiled.fingerprint = fingerprint(&compiled);

    debug!(
        code = %identity.code,
        choice_triggers = compiled.rules.choice_triggers.len(),
        keyword_triggers = compiled.rules.keyword_triggers.len(),
        fingerprint = %compiled.fingerprint,
        "compiled blueprint"
    );

    Ok(compiled)
}

fn fingerprint(compiled: &CompiledArtifacts) -> String {
    let mut hasher = Sha256::new();
    for (name, text) in compiled.named() {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use servicecraft_scoring::{AliasTable, RuleSet, ScoringEngine};
    use servicecraft_shared::{AssessmentResponseSet, ResponseValue};

    fn blueprint_json() -> serde_json::Value {
        serde_json::json!({
            "identity": {
                "code": "cash_flow_clinic",
                "name": "Cash Flow Clinic",
                "category": "financial",
                "keywords": ["cash", "runway"]
            },
            "pricing": {
                "isRecurring": false,
                "tiers": [
                    {"name": "Clinic", "priceRanges": [{"maxTurnover": 1000000, "price": 1500, "priceFormatted": "£1,500"}], "priceFromFormatted": "from £1,500", "period": "one-off"}
                ],
                "defaultTierIndex": 0
            },
            "scoring": {
                "choiceTriggers": [
                    {"questionId": "sd_financial_confidence", "responseValue": "Not confident - I mostly guess", "points": 30, "triggerDescription": "Financial confidence"}
                ],
                "keywordTriggers": [
                    {"keywords": ["overdraft"], "targetQuestions": ["dd_core_frustration"], "points": 20, "triggerDescription": "Overdraft pressure"}
                ],
                "recommendationThreshold": 50
            }
        })
    }

    fn blueprint() -> ServiceBlueprint {
        serde_json::from_value(blueprint_json()).expect("blueprint parses")
    }

    #[test]
    fn compiled_choice_trigger_scores_through_engine() {
        let compiled = compile(&blueprint()).unwrap();
        let staged = RuleSet::discovery().with_candidate(compiled.rules.clone());
        let engine = ScoringEngine::new(staged, AliasTable::discovery());

        let mut responses = AssessmentResponseSet::new();
        responses.insert(
            "sd_financial_confidence".into(),
            ResponseValue::from("Not confident - I mostly guess"),
        );

        let results = engine.score(&responses);
        let clinic = results
            .iter()
            .find(|r| r.service_code == "cash_flow_clinic")
            .expect("staged service scored");
        assert_eq!(clinic.score, 30);
        assert_eq!(clinic.triggers.len(), 1);
        assert_eq!(clinic.triggers[0].points, 30);
        assert!(!clinic.recommended);
    }

    #[test]
    fn rules_fragment_reloads_as_rule_set_fragment() {
        let compiled = compile(&blueprint()).unwrap();

        #[derive(Deserialize)]
        struct Fragment {
            services: Vec<ServiceDefinition>,
        }
        let fragment: Fragment = toml::from_str(&compiled.rules_fragment).expect("fragment parses");
        assert_eq!(fragment.services, vec![compiled.rules.clone()]);
    }

    #[test]
    fn price_falls_back_to_range_table() {
        let compiled = compile(&blueprint()).unwrap();
        assert!(compiled.registry_entry.contains("price = 1500.0"));
        assert!(compiled.registry_entry.contains("price_display = \"from £1,500\""));
        assert!(compiled.services_migration.contains(", 1500, 'one-off', 'from £1,500')"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let a = compile(&blueprint()).unwrap();
        let b = compile(&blueprint()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = compile(&blueprint()).unwrap();
        let mut json = blueprint_json();
        json["identity"]["name"] = serde_json::json!("Cash Flow Clinic Plus");
        let b = compile(&serde_json::from_value(json).unwrap()).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn artifacts_serialize_camel_case() {
        let compiled = compile(&blueprint()).unwrap();
        let value = serde_json::to_value(&compiled).unwrap();
        assert!(value.get("registryEntry").is_some());
        assert!(value.get("scorerFragment").is_some());
        assert_eq!(value["rules"]["code"], "cash_flow_clinic");
    }
}
