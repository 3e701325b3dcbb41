//! Scoring engine: evaluates a rule set against assessment answers.
//!
//! Evaluation is pure and synchronous. The engine never fails: absent or
//! unmatched signals simply score zero.

use servicecraft_shared::{
    AssessmentResponseSet, ChoiceTrigger, KeywordTrigger, ResponseValue, ScoreResult,
    ServiceDefinition, TriggerHit,
};
use tracing::debug;

use crate::normalizer::AliasTable;
use crate::rules::RuleSet;

/// Upper bound of a clamped score.
pub const MAX_SCORE: i64 = 100;

/// Confidence added per matched trigger.
pub const CONFIDENCE_PER_TRIGGER: u32 = 20;

/// Lowest priority tier.
pub const LOWEST_PRIORITY: u32 = 5;

/// Rule set plus the alias table used to normalize raw answers.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    rules: RuleSet,
    aliases: AliasTable,
}

impl ScoringEngine {
    pub fn new(rules: RuleSet, aliases: AliasTable) -> Self {
        Self { rules, aliases }
    }

    /// Built-in discovery catalog and aliases.
    pub fn discovery() -> Self {
        Self::new(RuleSet::discovery(), AliasTable::discovery())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Normalize raw answers, then score them.
    pub fn score(&self, raw: &AssessmentResponseSet) -> Vec<ScoreResult> {
        let normalized = self.aliases.normalize(raw);
        self.score_normalized(&normalized)
    }

    /// Score answers already keyed by canonical question id.
    pub fn score_normalized(&self, responses: &AssessmentResponseSet) -> Vec<ScoreResult> {
        let mut results: Vec<ScoreResult> = self
            .rules
            .services
            .iter()
            .map(|def| evaluate_service(def, responses))
            .collect();

        // Stable: ties keep catalog order.
        results.sort_by(|a, b| b.score.cmp(&a.score));
        assign_priorities(&mut results);

        debug!(
            rules_version = %self.rules.version,
            services = results.len(),
            answered = responses.len(),
            recommended = results.iter().filter(|r| r.recommended).count(),
            top = results.first().map(|r| r.service_code.as_str()).unwrap_or(""),
            "scored assessment"
        );

        results
    }
}

fn evaluate_service(def: &ServiceDefinition, responses: &AssessmentResponseSet) -> ScoreResult {
    let mut total: i64 = 0;
    let mut triggers = Vec::new();

    for trigger in &def.choice_triggers {
        if let Some(hit) = match_choice(trigger, responses) {
            total += i64::from(hit.points);
            triggers.push(hit);
        }
    }

    for trigger in &def.keyword_triggers {
        if let Some(hit) = match_keyword(trigger, responses) {
            total += i64::from(hit.points);
            triggers.push(hit);
        }
    }

    let score = total.clamp(0, MAX_SCORE) as u32;
    let confidence = (CONFIDENCE_PER_TRIGGER.saturating_mul(triggers.len() as u32)).min(100);

    ScoreResult {
        service_code: def.code.clone(),
        name: def.name.clone(),
        score,
        confidence,
        triggers,
        priority: LOWEST_PRIORITY,
        recommended: score >= def.threshold,
    }
}

/// Case-insensitive equality, or membership for multi-select answers.
pub fn match_choice(trigger: &ChoiceTrigger, responses: &AssessmentResponseSet) -> Option<TriggerHit> {
    let expected = trigger.expected_value.to_lowercase();
    let matched = match responses.get(&trigger.question_id)? {
        ResponseValue::Null => None,
        ResponseValue::List(items) => items.iter().find(|item| item.to_lowercase() == expected).cloned(),
        scalar => {
            let text = scalar.text();
            (text.to_lowercase() == expected).then_some(text)
        }
    }?;

    Some(TriggerHit {
        question_ids: vec![trigger.question_id.clone()],
        description: trigger.description.clone(),
        matched,
        points: trigger.points,
    })
}

/// Fires once on the first keyword found in the combined target text.
pub fn match_keyword(trigger: &KeywordTrigger, responses: &AssessmentResponseSet) -> Option<TriggerHit> {
    let haystack = trigger
        .target_question_ids
        .iter()
        .filter_map(|id| responses.get(id))
        .map(ResponseValue::text)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if haystack.trim().is_empty() {
        return None;
    }

    let keyword = trigger
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .find(|k| haystack.contains(k.as_str()))?;

    Some(TriggerHit {
        question_ids: trigger.target_question_ids.clone(),
        description: trigger.description.clone(),
        matched: keyword,
        points: trigger.points,
    })
}

/// Walk results in sorted order with a running counter starting at 1:
/// `>= 50` takes the counter, `30..50` takes `max(3, counter)`, anything
/// lower gets the lowest tier. The counter advances for every service.
fn assign_priorities(results: &mut [ScoreResult]) {
    let mut counter: u32 = 1;
    for result in results.iter_mut() {
        let priority = if result.score >= 50 {
            counter
        } else if result.score >= 30 {
            counter.max(3)
        } else {
            LOWEST_PRIORITY
        };
        result.priority = priority.min(LOWEST_PRIORITY);
        counter += 1;
    }
}
