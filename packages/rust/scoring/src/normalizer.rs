//! Response normalization.
//!
//! Assessment answers were captured under several key names as the survey
//! evolved. The [`AliasTable`] maps each canonical question id to the legacy
//! keys it may appear under, most specific first, so the rule set only ever
//! sees canonical ids.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use servicecraft_shared::{AssessmentResponseSet, ResponseValue, Result, ServiceCraftError};

/// First key in `aliases` whose value is present and not blank.
pub fn lookup<'a, S: AsRef<str>>(
    raw: &'a AssessmentResponseSet,
    aliases: &[S],
) -> Option<&'a ResponseValue> {
    aliases
        .iter()
        .filter_map(|key| raw.get(key.as_ref()))
        .find(|value| !value.is_blank())
}

/// Canonical question id to ordered legacy keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTable {
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl AliasTable {
    /// Load an alias table from a TOML file with an `[aliases]` table.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ServiceCraftError::io(path, e))?;
        toml::from_str(&content).map_err(|e| {
            ServiceCraftError::parse(format!("invalid alias table {}: {e}", path.display()))
        })
    }

    /// Known legacy keys of the discovery assessment.
    pub fn discovery() -> Self {
        let mut aliases = BTreeMap::new();
        for (canonical, legacy) in DISCOVERY_ALIASES {
            aliases.insert(
                canonical.to_string(),
                legacy.iter().map(|key| key.to_string()).collect(),
            );
        }
        Self { aliases }
    }

    /// Lookup chain for a canonical id: the id itself, then its legacy keys.
    pub fn chain<'a>(&'a self, canonical: &'a str) -> Vec<&'a str> {
        let mut chain = vec![canonical];
        if let Some(legacy) = self.aliases.get(canonical) {
            chain.extend(legacy.iter().map(String::as_str));
        }
        chain
    }

    /// Resolve one canonical field against a raw answer map.
    pub fn resolve<'a>(
        &self,
        raw: &'a AssessmentResponseSet,
        canonical: &str,
    ) -> Option<&'a ResponseValue> {
        lookup(raw, self.chain(canonical).as_slice())
    }

    /// Re-key a raw answer map by canonical id.
    ///
    /// Keys that belong to an alias chain are folded into their canonical id.
    /// Other keys pass through unchanged. Blank answers are dropped.
    pub fn normalize(&self, raw: &AssessmentResponseSet) -> AssessmentResponseSet {
        let mut normalized = AssessmentResponseSet::new();
        let mut consumed = BTreeSet::new();

        for canonical in self.aliases.keys() {
            let chain = self.chain(canonical);
            if let Some(value) = lookup(raw, chain.as_slice()) {
                normalized.insert(canonical.clone(), value.clone());
            }
            consumed.extend(chain);
        }

        for (key, value) in raw {
            if consumed.contains(key.as_str()) || value.is_blank() {
                continue;
            }
            normalized
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        normalized
    }
}

const DISCOVERY_ALIASES: &[(&str, &[&str])] = &[
    // Destination discovery
    ("dd_five_year_vision", &["dd_five_year_picture", "five_year_vision"]),
    ("dd_success_definition", &["success_definition"]),
    ("dd_non_negotiables", &["non_negotiables"]),
    ("dd_exit_mindset", &["exit_mindset"]),
    ("dd_reality_assessment", &["reality_assessment"]),
    ("dd_weekly_hours", &["dd_owner_hours", "weekly_hours"]),
    ("dd_time_allocation", &["time_allocation"]),
    ("dd_scaling_constraint", &["scaling_constraint"]),
    ("dd_sleep_thieves", &["dd_sleep_thief", "sleep_thieves"]),
    ("dd_core_frustration", &["core_frustration"]),
    ("dd_team_confidence", &["team_confidence"]),
    ("dd_key_person_dependency", &["key_person_dependency"]),
    ("dd_people_challenge", &["people_challenge"]),
    ("dd_delegation_ability", &["delegation_ability"]),
    ("dd_external_perspective", &["dd_external_view", "external_perspective"]),
    ("dd_suspected_truth", &["dd_if_i_knew", "suspected_truth"]),
    ("dd_priority_area", &["priority_area"]),
    ("dd_change_readiness", &["change_readiness"]),
    ("dd_priority_focus", &["dd_magic_fix"]),
    // Service diagnostics
    ("sd_financial_confidence", &["financial_confidence"]),
    ("sd_numbers_action_frequency", &["numbers_action_frequency"]),
    ("sd_benchmark_awareness", &["benchmark_awareness"]),
    ("sd_founder_dependency", &["founder_dependency"]),
    ("sd_manual_work_percentage", &["manual_work_percentage"]),
    ("sd_problem_awareness_speed", &["problem_awareness_speed"]),
    ("sd_plan_clarity", &["plan_clarity"]),
    ("sd_accountability_source", &["accountability_source"]),
    ("sd_decision_support", &["decision_support"]),
    ("sd_growth_blocker", &["growth_blocker"]),
    ("sd_scaling_vulnerability", &["scaling_vulnerability"]),
    ("sd_operational_frustration", &["operational_frustration"]),
    ("sd_documentation_readiness", &["documentation_readiness"]),
    ("sd_valuation_understanding", &["valuation_understanding"]),
    ("sd_exit_timeline", &["exit_timeline"]),
];
