//! Core domain types: assessment responses, trigger rules, scores, drafts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Assessment responses
// ---------------------------------------------------------------------------

/// A raw answer as stored by the assessment wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Null,
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl ResponseValue {
    /// `null` and the empty string count as "not answered".
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) | Self::List(_) => false,
        }
    }

    /// Flatten the answer into searchable text. Lists are space-joined.
    pub fn text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(" "),
        }
    }

    /// Coerce a scalar into a single-element list (multi-select callers).
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::Null => Vec::new(),
            Self::List(items) => items.clone(),
            other => vec![other.text()],
        }
    }
}

impl From<&str> for ResponseValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<&str>> for ResponseValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(String::from).collect())
    }
}

/// Question id to raw answer. Keys vary across survey schema versions.
pub type AssessmentResponseSet = BTreeMap<String, ResponseValue>;

// ---------------------------------------------------------------------------
// Trigger rule set
// ---------------------------------------------------------------------------

/// Fires when an answer equals `expected_value` (case-insensitive), or
/// contains it as an element for multi-select answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTrigger {
    pub question_id: String,
    pub expected_value: String,
    pub points: i32,
    pub description: String,
}

/// Fires once when any keyword occurs in the combined text of the target questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTrigger {
    pub target_question_ids: Vec<String>,
    pub keywords: Vec<String>,
    pub points: i32,
    pub description: String,
}

/// A service line in the catalog, with the triggers that recommend it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub category: String,
    /// Score at or above which the service counts as recommended.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default)]
    pub choice_triggers: Vec<ChoiceTrigger>,
    #[serde(default)]
    pub keyword_triggers: Vec<KeywordTrigger>,
}

/// Default recommendation threshold.
pub const DEFAULT_THRESHOLD: u32 = 50;

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// One matched trigger, kept for explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerHit {
    /// Question(s) the trigger inspected.
    pub question_ids: Vec<String>,
    /// The trigger's literal description.
    pub description: String,
    /// The answer value or keyword that matched.
    pub matched: String,
    pub points: i32,
}

impl std::fmt::Display for TriggerHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: \"{}\"", self.description, self.matched)
    }
}

/// Ranked, explained recommendation for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub service_code: String,
    pub name: String,
    /// Accumulated points clamped to `0..=100`.
    pub score: u32,
    /// `min(100, 20 * triggers.len())`; a signal count, not a probability.
    pub confidence: u32,
    pub triggers: Vec<TriggerHit>,
    /// 1 (highest) to 5.
    pub priority: u32,
    pub recommended: bool,
}

// ---------------------------------------------------------------------------
// Blueprint drafts
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for blueprint identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlueprintId(pub Uuid);

impl BlueprintId {
    /// Generate a new time-sortable blueprint identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BlueprintId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlueprintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BlueprintId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a stored blueprint. Promotion happens outside this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintStatus {
    Generating,
    Draft,
}

impl BlueprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Draft => "draft",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generating" => Some(Self::Generating),
            "draft" => Some(Self::Draft),
            _ => None,
        }
    }
}

/// Machine-readable marker on a draft whose generation did not yield a blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftMarker {
    /// Model output could not be parsed as a JSON object.
    ParseError,
    /// The provider could not be reached or returned an error.
    ProviderUnavailable,
}

impl DraftMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::ProviderUnavailable => "provider_unavailable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "parse_error" => Some(Self::ParseError),
            "provider_unavailable" => Some(Self::ProviderUnavailable),
            _ => None,
        }
    }
}

/// Where a generation request's context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Concept,
    Opportunity,
    Manual,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Opportunity => "opportunity",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "concept" => Some(Self::Concept),
            "opportunity" => Some(Self::Opportunity),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A stored blueprint draft as read back by reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintRecord {
    pub id: String,
    pub practice_id: String,
    pub source_type: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub status: BlueprintStatus,
    pub service_code: String,
    pub service_name: String,
    pub display_name: String,
    pub category: String,
    /// Stored document: the accepted blueprint (with `implementation`), or an error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_marker: Option<DraftMarker>,
    /// Bounded excerpt of the raw output or failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
