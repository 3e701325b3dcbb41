//! Shared types, error model, and configuration for ServiceCraft.
//!
//! This crate is the foundation depended on by all other ServiceCraft crates.
//! It provides:
//! - [`ServiceCraftError`], the unified error type
//! - Scoring types ([`ServiceDefinition`], [`ScoreResult`], [`ResponseValue`])
//! - Blueprint types ([`ServiceBlueprint`], [`BlueprintRecord`])
//! - Configuration ([`AppConfig`], [`GenerationSettings`], config loading)

pub mod blueprint;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use blueprint::{
    BlueprintChoiceTrigger, BlueprintKeywordTrigger, Pricing, PricingTier, ScoringSpec,
    ServiceBlueprint,
};
pub use config::{
    AppConfig, DefaultsConfig, GenerationSettings, OpenRouterConfig, ScoringConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{Result, ServiceCraftError};
pub use types::{
    AssessmentResponseSet, BlueprintId, BlueprintRecord, BlueprintStatus, ChoiceTrigger,
    DEFAULT_THRESHOLD, DraftMarker, KeywordTrigger, ResponseValue, ScoreResult, ServiceDefinition,
    SourceKind, TriggerHit,
};
