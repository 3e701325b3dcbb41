//! Prompt assembly for blueprint generation.
//!
//! One fixed system instruction plus one user message holding the context
//! document: the source section, optional anonymised client examples, the
//! existing service registry, the discovery question catalog and the skills
//! taxonomy.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use servicecraft_generation::ChatMessage;
use servicecraft_scoring::AliasTable;
use sha2::{Digest, Sha256};

use crate::request::{
    BlueprintSource, CatalogContext, ClientExample, ConceptRecord, GenerationRequest,
    MAX_CLIENT_EXAMPLES, ManualInput, OpportunityRecord,
};

/// Longest answer quoted from a client example.
const EXAMPLE_ANSWER_CHARS: usize = 200;

/// Top-level keys a blueprint may carry.
pub const BLUEPRINT_KEYS: [&str; 9] = [
    "identity",
    "pricing",
    "assessment",
    "deliverables",
    "delivery",
    "skills",
    "scoring",
    "narrative",
    "meta",
];

/// Fixed instruction sent as the system message on every request.
pub const SYSTEM_INSTRUCTION: &str = r#"You design new service lines for an accountancy and advisory practice that serves UK owner-managed businesses.

## VOICE
- British English throughout.
- Sell the outcome the owner gets, not the service we perform.
- Plain language an owner would use. No jargon, no buzzwords, no hype.

## OUTPUT
Return a single JSON object whose top-level keys are exactly: identity, pricing, assessment, deliverables, delivery, skills, scoring, narrative, meta. No other keys.

1. identity: code (unique snake_case, not one of the existing codes), name, displayName, category (foundation|growth|strategic|operational), outcome, tagline, description, problemStatement, targetClient, notSuitableFor, keywords (array of strings).
2. pricing: isRecurring, pricingModel (fixed|turnover-scaled), tiers (array of { name, tagline, description, pricingModel, price or priceRanges [{ maxTurnover, price, priceFormatted }], priceFormatted or priceFromFormatted, period (one-off|monthly|quarterly|annual), periodLabel, showInPopup, popupCtaLabel }), defaultTierIndex, valueJustification, competitorComparison.
3. assessment: estimatedMinutes, sections (array of { name, description, questions }). Each question: questionId (snake_case, prefixed with the service code), questionText, questionType (text|single|multi|scale|number), options (for single and multi), placeholder, charLimit, isRequired, displayOrder, aiAnchor. 10 to 20 questions across 3 to 5 sections, including one "magic wand" question and one quantification question.
4. deliverables: array of { tierName, deliverables: [{ name, description, format, frequency, estimatedHours, automatable }], totalEstimatedHours, marginTarget }.
5. delivery: model (project|retainer|programme|hybrid), typicalDuration, stages (array of { name, description, duration, activities, clientActions, deliverables, reviewGate }), clientTouchpoints, teamRequired, qualityGates.
6. skills: required and desirable (arrays of { skillName, category, minLevel 1-5, idealLevel 1-5, isCritical }), newSkillsNeeded.
7. scoring: choiceTriggers (array of { questionId, responseValue, points 15-50, triggerDescription }) using ONLY question ids from the discovery question catalog; keywordTriggers (array of { keywords, targetQuestions, points, triggerDescription }); recommendationThreshold (normally 50).
8. narrative: outcomeStatement, beforeState, afterState, valueDrivers (array), costOfNotActing (array), enabledByString, enabledByStringDeferred, objectionHandlers (array of { objection, response }), journeyPhases (array of { phase, headline, description }).
9. meta: estimatedMRRContribution, marketSizeEstimate (niche|moderate|broad), competitiveAdvantage, riskFactors (array), dependsOn (array), canBundleWith (array).

Prices must be credible for businesses turning over £500k to £20m. Assessment questions must diagnose, not sell.

Respond with the JSON object only. Do not wrap it in markdown code fences. Do not add any commentary before or after it."#;

/// The two messages for one generation call, plus their provenance hash.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// SHA-256 over both messages.
    pub hash: String,
}

impl Prompt {
    pub fn messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

/// Build the system and user messages for `request`.
pub fn build_prompt(request: &GenerationRequest, catalog: &CatalogContext) -> Prompt {
    let mut user = String::from("Generate the complete service line blueprint for this input:\n\n");
    user.push_str(&build_context(request, catalog));
    if let Some(notes) = request
        .additional_context
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        let _ = write!(user, "\n\n## ADVISOR NOTES\n{notes}");
    }

    let system = SYSTEM_INSTRUCTION.to_string();
    let hash = prompt_hash(&system, &user);
    Prompt { system, user, hash }
}

/// SHA-256 of the system and user messages.
pub fn prompt_hash(system: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(user.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Assemble the context document for one request.
pub fn build_context(request: &GenerationRequest, catalog: &CatalogContext) -> String {
    let mut doc = match &request.source {
        BlueprintSource::Concept(c) => concept_section(c),
        BlueprintSource::Opportunity(o) => opportunity_section(o),
        BlueprintSource::Manual(m) => manual_section(m),
    };

    let examples = client_examples_section(&request.client_examples);
    if !examples.is_empty() {
        doc.push_str("\n\n");
        doc.push_str(&examples);
    }

    doc.push_str("\n\n");
    doc.push_str(&registry_section(catalog));
    doc.push_str("\n\n");
    doc.push_str(&questions_section(catalog));
    doc.push_str("\n\n");
    doc.push_str(&skills_section(catalog));
    doc
}

fn concept_section(c: &ConceptRecord) -> String {
    let mut s = String::from("## SERVICE CONCEPT\n");
    let _ = writeln!(s, "Name: {}", c.suggested_name);
    let _ = writeln!(s, "Problem: {}", c.problem_it_solves);
    if let Some(description) = &c.description {
        let _ = writeln!(s, "Description: {description}");
    }
    let deliverables =
        serde_json::to_string(&c.suggested_deliverables).unwrap_or_else(|_| "[]".into());
    let _ = writeln!(s, "Deliverables: {deliverables}");
    let _ = writeln!(s, "Pricing: {}", c.suggested_pricing.as_deref().unwrap_or("not set"));
    let _ = writeln!(s, "Times Identified: {}", c.times_identified.unwrap_or(0));
    let _ = write!(
        s,
        "Market Size: {}",
        c.market_size_estimate.as_deref().unwrap_or("unknown")
    );
    s
}

fn opportunity_section(o: &OpportunityRecord) -> String {
    let mut s = String::from("## OPPORTUNITY\n");
    let _ = writeln!(s, "Title: {}", o.title);
    optional_line(&mut s, "Description", o.description.as_deref());
    optional_line(&mut s, "Category", o.category.as_deref());
    optional_line(&mut s, "Severity", o.severity.as_deref());
    if let Some(amount) = o.financial_impact_amount {
        let kind = o.financial_impact_type.as_deref().unwrap_or("estimated");
        let _ = writeln!(s, "Financial Impact: £{amount:.0} ({kind})");
    }
    optional_line(&mut s, "Life Impact", o.life_impact.as_deref());
    optional_line(&mut s, "Service Fit Limitation", o.service_fit_limitation.as_deref());
    optional_line(&mut s, "Talking Point", o.talking_point.as_deref());
    s.truncate(s.trim_end().len());
    s
}

fn manual_section(m: &ManualInput) -> String {
    let mut s = String::from("## MANUAL SERVICE CONCEPT\n");
    let _ = writeln!(s, "Problem: {}", m.problem_statement.trim());
    optional_line(&mut s, "Target Client", m.target_client.as_deref());
    optional_line(&mut s, "Suggested Name", m.suggested_name.as_deref());
    optional_line(&mut s, "Pricing Guidance", m.pricing_guidance.as_deref());
    optional_line(&mut s, "Delivery Preference", m.delivery_preference.as_deref());
    if !m.existing_inspirations.is_empty() {
        let _ = writeln!(s, "Draw Patterns From: {}", m.existing_inspirations.join(", "));
    }
    s.truncate(s.trim_end().len());
    s
}

fn optional_line(s: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        let _ = writeln!(s, "{label}: {value}");
    }
}

/// One line per example, answers only. Nothing that identifies the client.
fn client_examples_section(examples: &[ClientExample]) -> String {
    let aliases = AliasTable::discovery();
    let lines: Vec<String> = examples
        .iter()
        .take(MAX_CLIENT_EXAMPLES)
        .enumerate()
        .map(|(i, example)| {
            let focus = answer(&aliases, example, "dd_priority_focus");
            let blocker = answer(&aliases, example, "sd_growth_blocker");
            format!(
                "Client {}: Magic fix / priority: {}. Growth blocker: {}.",
                i + 1,
                focus.as_deref().unwrap_or("n/a"),
                blocker.as_deref().unwrap_or("n/a"),
            )
        })
        .collect();

    if lines.is_empty() {
        return String::new();
    }
    format!("## CLIENT EXAMPLES (anonymised)\n{}", lines.join("\n"))
}

fn answer(aliases: &AliasTable, example: &ClientExample, canonical: &str) -> Option<String> {
    let text = aliases.resolve(&example.responses, canonical)?.text();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(EXAMPLE_ANSWER_CHARS).collect())
}

fn registry_section(catalog: &CatalogContext) -> String {
    let mut s = String::from("## EXISTING SERVICE CATALOGUE\n");
    if catalog.services.is_empty() {
        s.push_str("(none supplied)\n");
    }
    for service in &catalog.services {
        let _ = write!(s, "- {} ({})", service.name, service.code);
        if let Some(category) = service.category.as_deref().filter(|c| !c.is_empty()) {
            let _ = write!(s, " [{category}]");
        }
        if let Some(outcome) = service.outcome.as_deref().filter(|o| !o.is_empty()) {
            let _ = write!(s, ": {outcome}");
        }
        s.push('\n');
    }

    let codes: Vec<&str> = catalog.services.iter().map(|s| s.code.as_str()).collect();
    let _ = write!(
        s,
        "\n## EXISTING SERVICE CODES (do not reuse)\n{}",
        if codes.is_empty() { "(none)".to_string() } else { codes.join(", ") }
    );
    s
}

fn questions_section(catalog: &CatalogContext) -> String {
    let mut s = String::from("## DISCOVERY QUESTIONS (valid question ids for scoring triggers)\n");
    if catalog.questions.is_empty() {
        s.push_str("(none supplied)");
        return s;
    }
    let lines: Vec<String> = catalog
        .questions
        .iter()
        .map(|q| {
            format!(
                "[{}] {}: {} ({})",
                q.question_id, q.section, q.question_text, q.question_type
            )
        })
        .collect();
    s.push_str(&lines.join("\n"));
    s
}

fn skills_section(catalog: &CatalogContext) -> String {
    let mut s = String::from("## SKILLS FRAMEWORK\n");
    if catalog.skills.is_empty() {
        s.push_str("(none supplied)");
        return s;
    }
    let mut by_category: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for skill in &catalog.skills {
        by_category
            .entry(skill.category.as_str())
            .or_default()
            .push(skill.name.as_str());
    }
    let lines: Vec<String> = by_category
        .into_iter()
        .map(|(category, names)| format!("{category}: {}", names.join(", ")))
        .collect();
    s.push_str(&lines.join("\n"));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CatalogQuestion, CatalogService, SkillEntry};
    use servicecraft_shared::ResponseValue;

    fn request(source: BlueprintSource) -> GenerationRequest {
        GenerationRequest {
            practice_id: "practice-1".into(),
            source,
            client_examples: Vec::new(),
            additional_context: None,
        }
    }

    fn catalog() -> CatalogContext {
        CatalogContext {
            services: vec![CatalogService {
                code: "management_accounts".into(),
                name: "Management Accounts".into(),
                category: Some("foundation".into()),
                outcome: Some("You'll know your numbers".into()),
            }],
            questions: vec![CatalogQuestion {
                question_id: "dd_weekly_hours".into(),
                section: "Your time".into(),
                question_text: "How many hours do you work a week?".into(),
                question_type: "single".into(),
            }],
            skills: vec![
                SkillEntry { name: "Cash flow forecasting".into(), category: "Finance".into() },
                SkillEntry { name: "Budgeting".into(), category: "Finance".into() },
                SkillEntry { name: "Facilitation".into(), category: "Advisory".into() },
            ],
        }
    }

    #[test]
    fn manual_context_has_every_section() {
        let req = request(BlueprintSource::Manual(ManualInput {
            problem_statement: "Owners cannot forecast cash".into(),
            suggested_name: Some("Cash Flow Clinic".into()),
            existing_inspirations: vec!["management_accounts".into()],
            ..ManualInput::default()
        }));
        let doc = build_context(&req, &catalog());

        assert!(doc.starts_with("## MANUAL SERVICE CONCEPT\nProblem: Owners cannot forecast cash"));
        assert!(doc.contains("Suggested Name: Cash Flow Clinic"));
        assert!(doc.contains("Draw Patterns From: management_accounts"));
        assert!(doc.contains("- Management Accounts (management_accounts) [foundation]"));
        assert!(doc.contains("EXISTING SERVICE CODES (do not reuse)\nmanagement_accounts"));
        assert!(doc.contains("[dd_weekly_hours] Your time: How many hours do you work a week? (single)"));
        assert!(doc.contains("Advisory: Facilitation\nFinance: Cash flow forecasting, Budgeting"));
        assert!(!doc.contains("CLIENT EXAMPLES"));
        assert!(!doc.contains("Target Client"));
    }

    #[test]
    fn opportunity_section_formats_impact() {
        let req = request(BlueprintSource::Opportunity(OpportunityRecord {
            id: "o1".into(),
            title: "Exit readiness".into(),
            financial_impact_amount: Some(250000.0),
            financial_impact_type: Some("valuation uplift".into()),
            ..OpportunityRecord::default()
        }));
        let doc = build_context(&req, &CatalogContext::default());
        assert!(doc.contains("## OPPORTUNITY\nTitle: Exit readiness\nFinancial Impact: £250000 (valuation uplift)"));
        assert!(doc.contains("(none supplied)"));
    }

    #[test]
    fn client_examples_are_capped_and_resolve_aliases() {
        let mut req = request(BlueprintSource::Manual(ManualInput {
            problem_statement: "p".into(),
            ..ManualInput::default()
        }));
        for i in 0..5 {
            let mut example = ClientExample::default();
            example
                .responses
                .insert("dd_magic_fix".into(), ResponseValue::from(format!("fix {i}").as_str()));
            example
                .responses
                .insert("client_name".into(), ResponseValue::from("Acme Widgets Ltd"));
            req.client_examples.push(example);
        }

        let doc = build_context(&req, &CatalogContext::default());
        assert!(doc.contains("## CLIENT EXAMPLES (anonymised)"));
        assert!(doc.contains("Client 1: Magic fix / priority: fix 0. Growth blocker: n/a."));
        assert!(doc.contains("Client 3: Magic fix / priority: fix 2."));
        assert!(!doc.contains("Client 4"));
        assert!(!doc.contains("Acme"));
    }

    #[test]
    fn prompt_appends_notes_and_hashes_both_messages() {
        let mut req = request(BlueprintSource::Manual(ManualInput {
            problem_statement: "p".into(),
            ..ManualInput::default()
        }));
        let plain = build_prompt(&req, &CatalogContext::default());
        assert!(plain.user.starts_with("Generate the complete service line blueprint"));
        assert!(!plain.user.contains("ADVISOR NOTES"));

        req.additional_context = Some("Keep it under £2k".into());
        let noted = build_prompt(&req, &CatalogContext::default());
        assert!(noted.user.ends_with("## ADVISOR NOTES\nKeep it under £2k"));
        assert_ne!(plain.hash, noted.hash);
        assert_eq!(noted.hash, prompt_hash(&noted.system, &noted.user));
        assert_eq!(noted.hash.len(), 64);

        let [system, user] = noted.messages();
        assert_eq!(system.role, "system");
        assert_eq!(user.role, "user");
    }

    #[test]
    fn system_instruction_names_closed_key_set() {
        for key in BLUEPRINT_KEYS {
            assert!(SYSTEM_INSTRUCTION.contains(key), "missing {key}");
        }
        assert!(SYSTEM_INSTRUCTION.contains("Do not wrap it in markdown code fences"));
    }
}
