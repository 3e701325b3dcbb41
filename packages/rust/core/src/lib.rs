//! Blueprint generation for ServiceCraft.
//!
//! Assembles the context for one generation request, calls the provider,
//! parses and validates the output, compiles review artifacts and stores
//! the result as a draft (see [`pipeline::BlueprintPipeline`]).

pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod request;

pub use parser::{AcceptedBlueprint, BlueprintWarning, MAX_EXCERPT_CHARS, ParseOutcome, parse_blueprint};
pub use pipeline::{
    BlueprintPipeline, DraftState, GenerationOutcome, PreparedDraft, ProgressReporter,
    SilentProgress, prepare_draft,
};
pub use prompt::{Prompt, build_context, build_prompt, prompt_hash};
pub use request::{
    BlueprintSource, CatalogContext, CatalogQuestion, CatalogService, ClientExample,
    ConceptRecord, GenerationRequest, ManualInput, OpportunityRecord, SkillEntry,
};
