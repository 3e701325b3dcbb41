//! Versioned trigger rule set.
//!
//! A [`RuleSet`] is plain data: services with their choice and keyword
//! triggers over canonical question ids. The built-in discovery catalog is
//! returned by [`RuleSet::discovery`]; deployments can supply their own file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use servicecraft_shared::{
    ChoiceTrigger, DEFAULT_THRESHOLD, KeywordTrigger, Result, ServiceCraftError, ServiceDefinition,
};

/// Version tag of the built-in catalog.
pub const DISCOVERY_RULES_VERSION: &str = "discovery-v1";

/// Ordered catalog of scored services. Order breaks score ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl RuleSet {
    /// Load a rule set from a `.json` file, or TOML for any other extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ServiceCraftError::io(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };

        let rules: Self = parsed.map_err(|e| {
            ServiceCraftError::parse(format!("invalid rule set {}: {e}", path.display()))
        })?;
        tracing::debug!(
            version = %rules.version,
            services = rules.services.len(),
            "loaded rule set"
        );
        Ok(rules)
    }

    /// Render the rule set as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ServiceCraftError::parse(e.to_string()))
    }

    pub fn get(&self, code: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.code == code)
    }

    /// Service codes in catalog order.
    pub fn codes(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.code.as_str()).collect()
    }

    /// A copy of this set with `candidate` staged in: an existing service
    /// with the same code is replaced in place, otherwise it is appended.
    /// The receiver is left untouched.
    pub fn with_candidate(&self, candidate: ServiceDefinition) -> Self {
        let mut staged = self.clone();
        match staged.services.iter_mut().find(|s| s.code == candidate.code) {
            Some(existing) => *existing = candidate,
            None => staged.services.push(candidate),
        }
        staged.version = format!("{}+candidate", self.version);
        staged
    }

    /// The built-in discovery catalog.
    pub fn discovery() -> Self {
        Self {
            version: DISCOVERY_RULES_VERSION.into(),
            services: vec![
                goal_alignment(),
                management_accounts(),
                benchmarking(),
                systems_audit(),
                fractional_cfo(),
                fractional_coo(),
                business_advisory(),
                automation(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

fn service(code: &str, name: &str, category: &str) -> ServiceDefinition {
    ServiceDefinition {
        code: code.into(),
        name: name.into(),
        display_name: name.into(),
        category: category.into(),
        threshold: DEFAULT_THRESHOLD,
        choice_triggers: Vec::new(),
        keyword_triggers: Vec::new(),
    }
}

/// One choice trigger per accepted answer, all awarding the same points.
fn choices(question_id: &str, values: &[&str], points: i32, description: &str) -> Vec<ChoiceTrigger> {
    values
        .iter()
        .map(|value| ChoiceTrigger {
            question_id: question_id.into(),
            expected_value: (*value).into(),
            points,
            description: description.into(),
        })
        .collect()
}

fn keyword(targets: &[&str], keywords: &[&str], points: i32, description: &str) -> KeywordTrigger {
    KeywordTrigger {
        target_question_ids: targets.iter().map(|t| t.to_string()).collect(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        points,
        description: description.into(),
    }
}

fn goal_alignment() -> ServiceDefinition {
    let mut def = service("365_method", "Goal Alignment Programme", "strategic");
    def.choice_triggers = [
        choices(
            "dd_success_definition",
            &[
                "Creating a business that runs profitably without me",
                "Building a legacy that outlasts me",
                "Building something I can sell for a life-changing amount",
            ],
            25,
            "Success definition",
        ),
        choices(
            "sd_plan_clarity",
            &[
                "I have goals but not a real plan",
                "I'm too busy to plan",
                "I've given up on planning - things always change",
            ],
            15,
            "Plan clarity",
        ),
        choices(
            "sd_accountability_source",
            &["My spouse/family (informally)", "No one - just me"],
            10,
            "No formal accountability",
        ),
        choices(
            "dd_exit_mindset",
            &["I think about it but haven't planned", "I'd love to but can't see how"],
            10,
            "Exit desire without plan",
        ),
        choices(
            "dd_external_perspective",
            &[
                "It's a significant source of tension",
                "They've given up complaining",
                "They worry about me sometimes",
            ],
            10,
            "Work-life balance strain",
        ),
        choices(
            "dd_scaling_constraint",
            &["My personal capacity - Im already maxed"],
            10,
            "Personal capacity maxed",
        ),
    ]
    .concat();
    def.keyword_triggers = vec![keyword(
        &["dd_five_year_vision"],
        &["invest", "portfolio", "advisory", "board", "step back", "chairman"],
        20,
        "Vision: operator-to-investor transition",
    )];
    def
}

fn management_accounts() -> ServiceDefinition {
    let mut def = service("management_accounts", "Management Accounts", "financial");
    def.choice_triggers = [
        choices(
            "sd_financial_confidence",
            &[
                "Uncertain - Im often surprised",
                "Not confident - I mostly guess",
                "I avoid financial decisions because I dont trust the data",
            ],
            30,
            "Financial confidence",
        ),
        choices(
            "sd_numbers_action_frequency",
            &[
                "Quarterly - when accounts come through",
                "Rarely - I dont find them useful",
                "Never - I dont get meaningful management information",
            ],
            25,
            "Numbers frequency",
        ),
        choices(
            "dd_priority_area",
            &["Getting real financial visibility and control"],
            30,
            "Priority: financial visibility",
        ),
    ]
    .concat();
    def.keyword_triggers = vec![
        keyword(
            &["dd_suspected_truth"],
            &["margin", "profit", "losing", "cost", "pricing", "money"],
            20,
            "Suspects financial issues",
        ),
        keyword(
            &["dd_sleep_thieves"],
            &["cash flow", "numbers"],
            15,
            "Financial worries keeping awake",
        ),
    ];
    def
}

fn benchmarking() -> ServiceDefinition {
    let mut def = service("benchmarking", "Benchmarking", "strategic");
    def.choice_triggers = [
        choices(
            "sd_benchmark_awareness",
            &["No - Id love to know but dont have access"],
            40,
            "Wants benchmarking but lacks access",
        ),
        choices(
            "sd_benchmark_awareness",
            &["Never considered it"],
            25,
            "Never considered benchmarking",
        ),
        choices(
            "sd_benchmark_awareness",
            &["Roughly - I have a general sense"],
            15,
            "Only rough sense of market position",
        ),
        choices(
            "sd_valuation_understanding",
            &["No idea - its never come up", "I try not to think about it"],
            15,
            "No valuation understanding",
        ),
    ]
    .concat();
    def.keyword_triggers = vec![
        keyword(
            &["dd_suspected_truth"],
            &["underperform", "behind", "compared", "competitor", "industry", "average"],
            20,
            "Suspects market underperformance",
        ),
        keyword(
            &["dd_core_frustration"],
            &["price", "compet", "market", "rate"],
            15,
            "Frustration with competitive positioning",
        ),
    ];
    def
}

fn systems_audit() -> ServiceDefinition {
    let mut def = service("systems_audit", "Systems Audit", "operational");
    def.choice_triggers = [
        choices(
            "sd_founder_dependency",
            &["Chaos - Im essential to everything", "Significant problems - but wouldnt collapse"],
            25,
            "Founder dependency",
        ),
        choices(
            "sd_manual_work_percentage",
            &["Significant - probably 30-50%", "Too much - over half our effort is manual"],
            25,
            "Manual work",
        ),
        choices(
            "sd_manual_work_percentage",
            &["I dont know - never measured it"],
            15,
            "Unknown manual work level",
        ),
        choices(
            "sd_problem_awareness_speed",
            &[
                "Days later - when problems compound",
                "Often too late - when customers complain",
                "Were often blindsided",
            ],
            20,
            "Slow problem detection",
        ),
        choices(
            "dd_key_person_dependency",
            &["Disaster - the business would struggle badly", "Major disruption for 6+ months"],
            20,
            "Key person risk",
        ),
        choices(
            "dd_time_allocation",
            &["90% firefighting / 10% strategic", "70% firefighting / 30% strategic"],
            15,
            "Firefighting",
        ),
        choices(
            "sd_scaling_vulnerability",
            &["Operational processes"],
            20,
            "Operations would break on scaling",
        ),
        choices(
            "dd_delegation_ability",
            &["Poor - I struggle to let go", "Terrible - I end up doing everything myself"],
            15,
            "Delegation issues",
        ),
        choices(
            "dd_priority_area",
            &["Building a business that runs without me", "Scaling without scaling the chaos"],
            25,
            "Priority",
        ),
    ]
    .concat();
    def.keyword_triggers = vec![keyword(
        &["sd_operational_frustration"],
        &["manual", "process", "system", "repeat"],
        15,
        "Operational frustration with processes",
    )];
    def
}

fn fractional_cfo() -> ServiceDefinition {
    let mut def = service("fractional_cfo", "Fractional CFO", "financial");
    def.choice_triggers = [
        choices(
            "sd_scaling_vulnerability",
            &["Financial systems and controls"],
            30,
            "Financial systems would break on scaling",
        ),
        choices("sd_growth_blocker", &["Dont have the capital"], 20, "Capital constraint"),
        choices(
            "sd_decision_support",
            &[
                "Friends or family (not business experts)",
                "I figure it out myself",
                "I avoid major decisions",
            ],
            15,
            "Lacks strategic financial advice",
        ),
    ]
    .concat();
    def
}

fn fractional_coo() -> ServiceDefinition {
    let mut def = service("fractional_coo", "Fractional COO", "operational");
    def.choice_triggers = [
        choices(
            "dd_scaling_constraint",
            &["My team - were stretched thin"],
            25,
            "Team stretched thin",
        ),
        choices(
            "dd_scaling_constraint",
            &["My personal capacity - Im already maxed"],
            20,
            "Personal capacity maxed",
        ),
        choices(
            "dd_people_challenge",
            &[
                "Finding good people to hire",
                "Developing future leaders",
                "Managing performance",
                "Getting the best from current team",
            ],
            20,
            "People challenge",
        ),
        choices(
            "sd_scaling_vulnerability",
            &["Team capacity", "My personal capacity"],
            20,
            "Team/capacity would break on scaling",
        ),
        choices(
            "dd_team_confidence",
            &["1-3: Major concerns", "4-5: Some good people but significant gaps"],
            15,
            "Team confidence",
        ),
    ]
    .concat();
    def
}

fn business_advisory() -> ServiceDefinition {
    let mut def = service("business_advisory", "Business Advisory", "strategic");
    def.choice_triggers = [
        choices(
            "sd_exit_timeline",
            &[
                "Already exploring options",
                "1-3 years - actively preparing",
                "3-5 years - need to start thinking",
            ],
            30,
            "Exit timeline",
        ),
        choices(
            "sd_documentation_readiness",
            &[
                "It would take weeks to pull together",
                "Months - things are scattered",
                "I dont know where to start",
            ],
            20,
            "Documentation",
        ),
        choices(
            "dd_priority_area",
            &["Protecting the value Ive built"],
            30,
            "Priority: value protection",
        ),
        choices(
            "dd_success_definition",
            &["Building something I can sell for a life-changing amount"],
            20,
            "Success defined as exit",
        ),
        choices(
            "dd_exit_mindset",
            &["Ive already got a clear exit plan"],
            15,
            "Already has exit plan - needs advisory support",
        ),
    ]
    .concat();
    def
}

fn automation() -> ServiceDefinition {
    let mut def = service("automation", "Automation", "operational");
    def.choice_triggers = choices(
        "sd_manual_work_percentage",
        &["Significant - probably 30-50%", "Too much - over half our effort is manual"],
        30,
        "High manual work",
    );
    def.keyword_triggers = vec![keyword(
        &["sd_operational_frustration"],
        &["manual", "process", "system", "repeat"],
        15,
        "Frustration suggests automation opportunity",
    )];
    def
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_catalog_order_and_codes() {
        let rules = RuleSet::discovery();
        assert_eq!(
            rules.codes(),
            vec![
                "365_method",
                "management_accounts",
                "benchmarking",
                "systems_audit",
                "fractional_cfo",
                "fractional_coo",
                "business_advisory",
                "automation",
            ]
        );
        assert_eq!(rules.version, DISCOVERY_RULES_VERSION);
    }

    #[test]
    fn discovery_catalog_has_no_empty_triggers() {
        for def in RuleSet::discovery().services {
            assert!(
                !def.choice_triggers.is_empty() || !def.keyword_triggers.is_empty(),
                "{} has no triggers",
                def.code
            );
            for kw in &def.keyword_triggers {
                assert!(!kw.keywords.is_empty());
                assert!(!kw.target_question_ids.is_empty());
            }
        }
    }

    #[test]
    fn with_candidate_appends_new_code() {
        let base = RuleSet::discovery();
        let staged = base.with_candidate(service("cash_flow_clinic", "Cash Flow Clinic", "financial"));
        assert_eq!(staged.services.len(), base.services.len() + 1);
        assert_eq!(staged.codes().last(), Some(&"cash_flow_clinic"));
        assert_eq!(staged.version, "discovery-v1+candidate");
        assert!(base.get("cash_flow_clinic").is_none());
    }

    #[test]
    fn with_candidate_replaces_in_place() {
        let base = RuleSet::discovery();
        let staged = base.with_candidate(service("benchmarking", "Benchmarking v2", "strategic"));
        assert_eq!(staged.services.len(), base.services.len());
        assert_eq!(staged.services[2].name, "Benchmarking v2");
        assert!(staged.services[2].choice_triggers.is_empty());
    }

    #[test]
    fn toml_export_reloads() {
        let rules = RuleSet::discovery();
        let text = rules.to_toml().expect("render toml");
        let reloaded: RuleSet = toml::from_str(&text).expect("reparse toml");
        assert_eq!(reloaded, rules);
    }

    #[test]
    fn load_from_json_file() {
        let path = std::env::temp_dir().join(format!("sc-rules-{}.json", uuid::Uuid::now_v7()));
        let json = r#"{
            "version": "practice-7",
            "services": [{
                "code": "cash_flow_clinic",
                "name": "Cash Flow Clinic",
                "choice_triggers": [{
                    "question_id": "sd_financial_confidence",
                    "expected_value": "Not confident - I mostly guess",
                    "points": 30,
                    "description": "Financial confidence"
                }]
            }]
        }"#;
        std::fs::write(&path, json).expect("write rules");

        let rules = RuleSet::load_from(&path).expect("load rules");
        assert_eq!(rules.version, "practice-7");
        let def = rules.get("cash_flow_clinic").expect("service present");
        assert_eq!(def.threshold, DEFAULT_THRESHOLD);
        assert_eq!(def.choice_triggers[0].points, 30);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_from_reports_bad_toml() {
        let path = std::env::temp_dir().join(format!("sc-rules-{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "services = \"nope\"").expect("write rules");
        let err = RuleSet::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("invalid rule set"));
        let _ = std::fs::remove_file(&path);
    }
}
