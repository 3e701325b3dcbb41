//! Generation request model.
//!
//! Source records and catalog context are resolved by the caller (a review
//! UI, a batch job, the CLI reading JSON files); this crate never fetches them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use servicecraft_scoring::RuleSet;
use servicecraft_shared::{
    AssessmentResponseSet, Result, ServiceCraftError, SourceKind,
};

/// Name used for identity defaults when the source carries none.
pub const FALLBACK_SOURCE_NAME: &str = "New Service";

/// Only this many client examples are ever sent to the provider.
pub const MAX_CLIENT_EXAMPLES: usize = 3;

/// A service concept identified across earlier client analyses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConceptRecord {
    pub id: String,
    pub suggested_name: String,
    pub problem_it_solves: String,
    pub description: Option<String>,
    pub suggested_deliverables: Vec<serde_json::Value>,
    pub suggested_pricing: Option<String>,
    pub times_identified: Option<u32>,
    pub market_size_estimate: Option<String>,
}

/// A single client opportunity that no existing service covers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub financial_impact_amount: Option<f64>,
    pub financial_impact_type: Option<String>,
    pub life_impact: Option<String>,
    pub service_fit_limitation: Option<String>,
    pub talking_point: Option<String>,
}

/// Free-text input from an advisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualInput {
    pub problem_statement: String,
    pub target_client: Option<String>,
    pub suggested_name: Option<String>,
    pub pricing_guidance: Option<String>,
    pub delivery_preference: Option<String>,
    pub existing_inspirations: Vec<String>,
}

/// Exactly one origin per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintSource {
    Concept(ConceptRecord),
    Opportunity(OpportunityRecord),
    Manual(ManualInput),
}

impl BlueprintSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Concept(_) => SourceKind::Concept,
            Self::Opportunity(_) => SourceKind::Opportunity,
            Self::Manual(_) => SourceKind::Manual,
        }
    }

    /// Id of the originating record, if any.
    pub fn source_ref(&self) -> Option<&str> {
        let id = match self {
            Self::Concept(c) => c.id.as_str(),
            Self::Opportunity(o) => o.id.as_str(),
            Self::Manual(_) => return None,
        };
        let id = id.trim();
        (!id.is_empty()).then_some(id)
    }

    /// Name used for identity defaults.
    pub fn source_name(&self) -> &str {
        let name = match self {
            Self::Concept(c) => Some(c.suggested_name.as_str()),
            Self::Opportunity(o) => Some(o.title.as_str()),
            Self::Manual(m) => m.suggested_name.as_deref(),
        };
        name.map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_SOURCE_NAME)
    }
}

/// One completed discovery assessment, used as an anonymised example.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientExample {
    pub responses: AssessmentResponseSet,
}

/// Everything needed to ask the provider for one blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub practice_id: String,
    pub source: BlueprintSource,
    #[serde(default)]
    pub client_examples: Vec<ClientExample>,
    #[serde(default)]
    pub additional_context: Option<String>,
}

impl GenerationRequest {
    /// Load a request from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ServiceCraftError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            ServiceCraftError::parse(format!("invalid generation request {}: {e}", path.display()))
        })
    }

    /// Reject requests that cannot identify what to generate.
    pub fn validate(&self) -> Result<()> {
        if self.practice_id.trim().is_empty() {
            return Err(ServiceCraftError::validation("practice id is required"));
        }
        match &self.source {
            BlueprintSource::Manual(m) if m.problem_statement.trim().is_empty() => Err(
                ServiceCraftError::validation("manual input requires a problem statement"),
            ),
            BlueprintSource::Concept(c)
                if c.suggested_name.trim().is_empty() && c.problem_it_solves.trim().is_empty() =>
            {
                Err(ServiceCraftError::validation(
                    "concept record has neither a name nor a problem",
                ))
            }
            BlueprintSource::Opportunity(o) if o.title.trim().is_empty() => Err(
                ServiceCraftError::validation("opportunity record requires a title"),
            ),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog context
// ---------------------------------------------------------------------------

/// An existing service, listed so the model avoids its code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogService {
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub outcome: Option<String>,
}

/// One discovery question the generated triggers may reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogQuestion {
    pub question_id: String,
    pub section: String,
    pub question_text: String,
    pub question_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillEntry {
    pub name: String,
    pub category: String,
}

/// Existing codes, the question universe and the skills taxonomy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogContext {
    pub services: Vec<CatalogService>,
    pub questions: Vec<CatalogQuestion>,
    pub skills: Vec<SkillEntry>,
}

impl CatalogContext {
    /// Load catalog context from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ServiceCraftError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            ServiceCraftError::parse(format!("invalid catalog context {}: {e}", path.display()))
        })
    }

    /// Registry-only context derived from a rule set.
    pub fn from_rule_set(rules: &RuleSet) -> Self {
        Self {
            services: rules
                .services
                .iter()
                .map(|s| CatalogService {
                    code: s.code.clone(),
                    name: s.name.clone(),
                    category: Some(s.category.clone()),
                    outcome: None,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.services.iter().any(|s| s.code.eq_ignore_ascii_case(code))
    }

    /// Whether `question_id` belongs to the supplied question catalog.
    /// An empty catalog knows nothing and accepts everything.
    pub fn knows_question(&self, question_id: &str) -> bool {
        self.questions.is_empty() || self.questions.iter().any(|q| q.question_id == question_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(problem: &str, name: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            practice_id: "practice-1".into(),
            source: BlueprintSource::Manual(ManualInput {
                problem_statement: problem.into(),
                suggested_name: name.map(String::from),
                ..ManualInput::default()
            }),
            client_examples: Vec::new(),
            additional_context: None,
        }
    }

    #[test]
    fn source_name_fallbacks() {
        assert_eq!(manual("p", Some("Cash Flow Clinic")).source.source_name(), "Cash Flow Clinic");
        assert_eq!(manual("p", Some("  ")).source.source_name(), FALLBACK_SOURCE_NAME);
        assert_eq!(manual("p", None).source.source_name(), FALLBACK_SOURCE_NAME);

        let opp = BlueprintSource::Opportunity(OpportunityRecord {
            id: "opp-9".into(),
            title: "Exit readiness".into(),
            ..OpportunityRecord::default()
        });
        assert_eq!(opp.source_name(), "Exit readiness");
        assert_eq!(opp.source_ref(), Some("opp-9"));
        assert_eq!(opp.kind(), SourceKind::Opportunity);
    }

    #[test]
    fn validation_rejects_missing_identifiers() {
        assert!(manual("Owners cannot read their numbers", None).validate().is_ok());

        let err = manual("   ", None).validate().unwrap_err();
        assert!(matches!(err, ServiceCraftError::Validation { .. }));

        let mut no_practice = manual("problem", None);
        no_practice.practice_id = String::new();
        assert!(no_practice.validate().is_err());
    }

    #[test]
    fn request_deserializes_tagged_source() {
        let json = r#"{
            "practiceId": "p1",
            "source": {"concept": {"id": "c1", "suggestedName": "Exit Planning", "problemItSolves": "No exit plan"}},
            "clientExamples": [{"responses": {"dd_magic_fix": "More time"}}]
        }"#;
        let request: GenerationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.source.kind(), SourceKind::Concept);
        assert_eq!(request.source.source_ref(), Some("c1"));
        assert_eq!(request.client_examples.len(), 1);
    }

    #[test]
    fn catalog_lookups() {
        let catalog = CatalogContext::from_rule_set(&RuleSet::discovery());
        assert!(catalog.has_code("Management_Accounts"));
        assert!(!catalog.has_code("cash_flow_clinic"));
        assert!(catalog.knows_question("anything"));

        let with_questions = CatalogContext {
            questions: vec![CatalogQuestion {
                question_id: "dd_weekly_hours".into(),
                ..CatalogQuestion::default()
            }],
            ..CatalogContext::default()
        };
        assert!(with_questions.knows_question("dd_weekly_hours"));
        assert!(!with_questions.knows_question("dd_made_up"));
    }
}
