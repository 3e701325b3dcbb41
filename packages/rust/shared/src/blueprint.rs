//! Typed view of a model-authored service blueprint.
//!
//! Blueprints come from an untrusted generator, so every field is read
//! leniently: a leaf with the wrong shape falls back to its default (numbers
//! and flags given as strings are coerced), and a malformed list entry is
//! dropped, instead of rejecting the surrounding section. The original JSON
//! is kept next to this view for reviewers.

use std::str::FromStr;

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deserialize `T`, falling back to `T::default()` when the value has the wrong shape.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Deserialize a list, keeping only the entries that match `T`.
pub fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_number<T: FromStr>(value: &Value) -> Option<T> {
    let text = match value {
        Value::String(s) => s.trim().replace(',', ""),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            // f64 Display drops a zero fraction: 30.0 reads as "30".
            (None, None, Some(f)) => f.to_string(),
            _ => return None,
        },
        _ => return None,
    };
    text.parse().ok()
}

/// Optional text; numbers and booleans are rendered as text.
pub fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(&Value::deserialize(deserializer)?))
}

/// Text, or an empty string when the value is not a scalar.
pub fn text_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(&Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Text that must be present as a scalar.
pub fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_text(&Value::deserialize(deserializer)?)
        .ok_or_else(|| D::Error::custom("expected a string"))
}

/// Optional number; numeric strings such as `"50"` or `"1,500"` are accepted.
pub fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    Ok(scalar_number(&Value::deserialize(deserializer)?))
}

/// Number that must be present; numeric strings are accepted.
pub fn required_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    scalar_number(&Value::deserialize(deserializer)?)
        .ok_or_else(|| D::Error::custom("expected a number"))
}

/// Flag; `"true"`/`"yes"` strings count as true, anything unreadable as false.
pub fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    })
}

/// List of strings; a single comma-separated string is split.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    })
}

/// Top-level blueprint. Only the sections the compiler reads are typed;
/// the rest stay as raw JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBlueprint {
    #[serde(default, deserialize_with = "lenient")]
    pub identity: Identity,
    #[serde(default, deserialize_with = "lenient")]
    pub pricing: Pricing,
    #[serde(default, deserialize_with = "lenient")]
    pub assessment: AssessmentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub skills: Skills,
    #[serde(default, deserialize_with = "lenient")]
    pub scoring: ScoringSpec,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub narrative: Option<Narrative>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, Value>>,
}

// Section-level `lenient` above only catches a section that is not an object
// at all; the leaf attributes below keep one bad field from wiping the rest.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    #[serde(deserialize_with = "lenient_text")]
    pub code: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub outcome: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub tagline: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub problem_statement: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub target_client: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub not_suitable_for: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pricing {
    #[serde(deserialize_with = "lenient_flag")]
    pub is_recurring: bool,
    #[serde(deserialize_with = "lenient_text")]
    pub pricing_model: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub tiers: Vec<PricingTier>,
    #[serde(deserialize_with = "lenient_number")]
    pub default_tier_index: Option<usize>,
    #[serde(deserialize_with = "lenient_text")]
    pub value_justification: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub competitor_comparison: Option<String>,
}

impl Pricing {
    /// The tier named by `defaultTierIndex`, or the first tier.
    pub fn default_tier(&self) -> Option<&PricingTier> {
        self.tiers.get(self.default_tier_index.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingTier {
    #[serde(deserialize_with = "text_or_default")]
    pub name: String,
    #[serde(deserialize_with = "lenient_text")]
    pub tagline: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub pricing_model: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    #[serde(deserialize_with = "lenient_text")]
    pub price_formatted: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub price_ranges: Vec<PriceRange>,
    #[serde(deserialize_with = "lenient_text")]
    pub price_from_formatted: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub period: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub period_label: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub show_in_popup: Option<bool>,
    #[serde(deserialize_with = "lenient_text")]
    pub popup_cta_label: Option<String>,
}

impl PricingTier {
    /// Explicit price, else the first price-range entry, else 0.
    pub fn effective_price(&self) -> f64 {
        self.price
            .or_else(|| self.price_ranges.first().map(|range| range.price))
            .unwrap_or(0.0)
    }

    /// Formatted price, else the "from" string, else `TBD`.
    pub fn display_price(&self) -> &str {
        self.price_formatted
            .as_deref()
            .or(self.price_from_formatted.as_deref())
            .unwrap_or("TBD")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriceRange {
    #[serde(deserialize_with = "lenient_number")]
    pub max_turnover: Option<f64>,
    #[serde(deserialize_with = "required_number")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_text")]
    pub price_formatted: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentSpec {
    #[serde(deserialize_with = "lenient_number")]
    pub estimated_minutes: Option<u32>,
    #[serde(deserialize_with = "lenient_vec")]
    pub sections: Vec<AssessmentSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentSection {
    #[serde(deserialize_with = "text_or_default")]
    pub name: String,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub questions: Vec<AssessmentQuestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentQuestion {
    #[serde(deserialize_with = "text_or_default")]
    pub question_id: String,
    #[serde(deserialize_with = "text_or_default")]
    pub question_text: String,
    #[serde(deserialize_with = "text_or_default")]
    pub question_type: String,
    #[serde(deserialize_with = "string_list")]
    pub options: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub placeholder: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub char_limit: Option<u32>,
    #[serde(deserialize_with = "lenient_flag")]
    pub is_required: bool,
    #[serde(deserialize_with = "lenient_number")]
    pub display_order: Option<u32>,
    #[serde(deserialize_with = "lenient_text")]
    pub ai_anchor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Skills {
    #[serde(deserialize_with = "lenient_vec")]
    pub required: Vec<SkillRequirement>,
    #[serde(deserialize_with = "lenient_vec")]
    pub desirable: Vec<SkillRequirement>,
    #[serde(deserialize_with = "lenient_vec")]
    pub new_skills_needed: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillRequirement {
    #[serde(deserialize_with = "text_or_default")]
    pub skill_name: String,
    #[serde(deserialize_with = "text_or_default")]
    pub category: String,
    #[serde(deserialize_with = "lenient_number")]
    pub min_level: Option<u8>,
    #[serde(deserialize_with = "lenient_number")]
    pub ideal_level: Option<u8>,
    #[serde(deserialize_with = "lenient_flag")]
    pub is_critical: bool,
}

/// Declarative scoring rules authored for the new service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringSpec {
    #[serde(deserialize_with = "lenient_vec")]
    pub choice_triggers: Vec<BlueprintChoiceTrigger>,
    #[serde(deserialize_with = "lenient_vec")]
    pub keyword_triggers: Vec<BlueprintKeywordTrigger>,
    #[serde(deserialize_with = "lenient_number")]
    pub recommendation_threshold: Option<u32>,
}

/// A trigger entry is dropped only when its question, value or points are
/// missing or unreadable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintChoiceTrigger {
    #[serde(deserialize_with = "required_text")]
    pub question_id: String,
    #[serde(deserialize_with = "required_text")]
    pub response_value: String,
    #[serde(deserialize_with = "required_number")]
    pub points: i32,
    #[serde(default, deserialize_with = "text_or_default")]
    pub trigger_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintKeywordTrigger {
    #[serde(deserialize_with = "string_list")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub target_questions: Vec<String>,
    #[serde(deserialize_with = "required_number")]
    pub points: i32,
    #[serde(default, deserialize_with = "text_or_default")]
    pub trigger_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Narrative {
    #[serde(deserialize_with = "lenient_text")]
    pub outcome_statement: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub before_state: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub after_state: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub value_drivers: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub cost_of_not_acting: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub enabled_by_string: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub enabled_by_string_deferred: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_sections_fall_back_to_defaults() {
        let json = r#"{
            "identity": "not an object",
            "pricing": {"tiers": [{"name": "Core", "price": 2000}, 17, {"name": "Plus", "priceRanges": [{"price": 3500}]}]},
            "scoring": {"choiceTriggers": [
                {"questionId": "sd_plan_clarity", "responseValue": "I'm too busy to plan", "points": 20, "triggerDescription": "No plan"},
                {"questionId": "sd_plan_clarity", "points": "lots"}
            ]}
        }"#;
        let bp: ServiceBlueprint = serde_json::from_str(json).expect("lenient parse");
        assert!(bp.identity.code.is_none());
        assert_eq!(bp.pricing.tiers.len(), 2);
        assert_eq!(bp.scoring.choice_triggers.len(), 1);
        assert!(bp.scoring.keyword_triggers.is_empty());
    }

    #[test]
    fn keyword_string_keeps_the_rest_of_identity() {
        let json = r#"{
            "identity": {"code": "management_accounts", "name": "Management Accounts", "keywords": "cash, runway"}
        }"#;
        let bp: ServiceBlueprint = serde_json::from_str(json).expect("lenient parse");
        assert_eq!(bp.identity.code.as_deref(), Some("management_accounts"));
        assert_eq!(bp.identity.name.as_deref(), Some("Management Accounts"));
        assert_eq!(bp.identity.keywords, vec!["cash", "runway"]);
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let json = r#"{
            "scoring": {
                "recommendationThreshold": "50",
                "choiceTriggers": [
                    {"questionId": "sd_plan_clarity", "responseValue": "No plan", "points": 20},
                    {"questionId": "sd_plan_clarity", "responseValue": "Vague", "points": "30"}
                ]
            },
            "pricing": {"defaultTierIndex": "1", "tiers": [{"name": "Core", "price": "1,500"}]}
        }"#;
        let bp: ServiceBlueprint = serde_json::from_str(json).expect("lenient parse");
        assert_eq!(bp.scoring.recommendation_threshold, Some(50));
        assert_eq!(bp.scoring.choice_triggers.len(), 2);
        assert_eq!(bp.scoring.choice_triggers[1].points, 30);
        assert_eq!(bp.pricing.default_tier_index, Some(1));
        assert_eq!(bp.pricing.tiers[0].price, Some(1500.0));
    }

    #[test]
    fn unreadable_leaf_falls_back_alone() {
        let json = r#"{
            "scoring": {
                "recommendationThreshold": {"value": 50},
                "choiceTriggers": [{"questionId": "q1", "responseValue": "Yes", "points": 10}]
            },
            "pricing": {"isRecurring": "yes", "pricingModel": ["fixed"]}
        }"#;
        let bp: ServiceBlueprint = serde_json::from_str(json).expect("lenient parse");
        assert_eq!(bp.scoring.recommendation_threshold, None);
        assert_eq!(bp.scoring.choice_triggers.len(), 1);
        assert!(bp.pricing.is_recurring);
        assert!(bp.pricing.pricing_model.is_none());
    }

    #[test]
    fn tier_price_fallbacks() {
        let explicit = PricingTier {
            price: Some(4500.0),
            price_formatted: Some("£4,500".into()),
            ..Default::default()
        };
        assert_eq!(explicit.effective_price(), 4500.0);
        assert_eq!(explicit.display_price(), "£4,500");

        let ranged = PricingTier {
            price_ranges: vec![PriceRange {
                max_turnover: Some(1_000_000.0),
                price: 750.0,
                price_formatted: None,
            }],
            price_from_formatted: Some("from £750".into()),
            ..Default::default()
        };
        assert_eq!(ranged.effective_price(), 750.0);
        assert_eq!(ranged.display_price(), "from £750");

        let bare = PricingTier::default();
        assert_eq!(bare.effective_price(), 0.0);
        assert_eq!(bare.display_price(), "TBD");
    }

    #[test]
    fn default_tier_uses_index() {
        let pricing = Pricing {
            tiers: vec![
                PricingTier { name: "Lite".into(), ..Default::default() },
                PricingTier { name: "Growth".into(), ..Default::default() },
            ],
            default_tier_index: Some(1),
            ..Default::default()
        };
        assert_eq!(pricing.default_tier().map(|t| t.name.as_str()), Some("Growth"));
    }
}
