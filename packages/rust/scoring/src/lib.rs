//! Discovery scoring for ServiceCraft.
//!
//! Turns assessment answers into ranked, explained service recommendations:
//! - [`normalizer`] resolves legacy answer keys onto canonical question ids
//! - [`rules`] holds the versioned trigger rule set and the built-in catalog
//! - [`engine`] evaluates a rule set against normalized answers

pub mod engine;
pub mod normalizer;
pub mod rules;

pub use engine::ScoringEngine;
pub use normalizer::{AliasTable, lookup};
pub use rules::RuleSet;
