//! End-to-end blueprint generation: request → prompt → provider → parse →
//! compile → stored draft.
//!
//! Every attempt that passes request validation ends as a stored record:
//! an accepted draft, or a draft carrying a [`DraftMarker`] and an excerpt.

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use servicecraft_artifacts::{CompiledArtifacts, ResolvedIdentity, compile, resolve_identity};
use servicecraft_generation::ChatClient;
use servicecraft_shared::{BlueprintId, DraftMarker, Result};
use servicecraft_storage::{DraftCompletion, FailureRecord, NewBlueprint, Storage};

use crate::parser::{AcceptedBlueprint, ParseOutcome, excerpt, parse_blueprint, service_code_from_name};
use crate::prompt::build_prompt;
use crate::request::{CatalogContext, GenerationRequest};

/// How one generation attempt ended.
#[derive(Debug, Clone)]
pub enum DraftState {
    /// A blueprint was accepted and compiled.
    Accepted {
        service_code: String,
        service_name: String,
        warnings: Vec<String>,
    },
    /// No usable blueprint; the draft needs a human.
    Failed { marker: DraftMarker, message: String },
}

/// Result of [`BlueprintPipeline::generate`].
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub blueprint_id: BlueprintId,
    pub state: DraftState,
    pub elapsed: Duration,
}

impl GenerationOutcome {
    pub fn marker(&self) -> Option<DraftMarker> {
        match &self.state {
            DraftState::Accepted { .. } => None,
            DraftState::Failed { marker, .. } => Some(*marker),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &GenerationOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &GenerationOutcome) {}
}

/// An accepted blueprint ready to be stored: defaults applied, artifacts
/// attached under `implementation`, provenance stamped under `meta`.
#[derive(Debug, Clone)]
pub struct PreparedDraft {
    pub identity: ResolvedIdentity,
    pub document: Value,
    pub artifacts: Option<CompiledArtifacts>,
    pub warnings: Vec<String>,
}

/// Compile an accepted blueprint and stamp its document.
///
/// A compiler failure does not lose the draft; it is reported as a warning
/// and the document is stored without `implementation`.
pub fn prepare_draft(accepted: AcceptedBlueprint, source_name: &str, generated_by: &str) -> PreparedDraft {
    let AcceptedBlueprint {
        blueprint,
        mut document,
        warnings,
    } = accepted;
    let mut warnings: Vec<String> = warnings.iter().map(ToString::to_string).collect();

    let identity = resolve_identity(&blueprint).unwrap_or_else(|_| ResolvedIdentity {
        code: service_code_from_name(source_name),
        name: source_name.to_string(),
        display_name: source_name.to_string(),
        category: servicecraft_artifacts::rules::DEFAULT_CATEGORY.to_string(),
    });

    let artifacts = match compile(&blueprint) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            warn!(error = %e, code = %identity.code, "blueprint did not compile");
            warnings.push(format!("artifacts not compiled: {e}"));
            None
        }
    };

    if let Some(object) = document.as_object_mut() {
        if let Some(compiled) = &artifacts {
            match serde_json::to_value(compiled) {
                Ok(value) => {
                    object.insert("implementation".into(), value);
                }
                Err(e) => warnings.push(format!("artifacts not attached: {e}")),
            }
        }

        let meta = object
            .entry("meta")
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("generatedAt".into(), Value::String(chrono::Utc::now().to_rfc3339()));
            meta.insert("generatedBy".into(), Value::String(generated_by.to_string()));
            if !warnings.is_empty() {
                meta.insert(
                    "validationWarnings".into(),
                    Value::Array(warnings.iter().cloned().map(Value::String).collect()),
                );
            }
        }
    }

    PreparedDraft {
        identity,
        document,
        artifacts,
        warnings,
    }
}

/// Generation pipeline bound to its collaborators.
pub struct BlueprintPipeline<'a> {
    storage: &'a Storage,
    client: &'a ChatClient,
    catalog: &'a CatalogContext,
}

impl<'a> BlueprintPipeline<'a> {
    pub fn new(storage: &'a Storage, client: &'a ChatClient, catalog: &'a CatalogContext) -> Self {
        Self {
            storage,
            client,
            catalog,
        }
    }

    /// Run one generation attempt.
    ///
    /// Returns `Err` only when the request is invalid (nothing is stored) or
    /// when storage itself fails. Provider and parse failures come back as
    /// `Ok` with [`DraftState::Failed`].
    #[instrument(skip_all, fields(practice_id = %request.practice_id, source = request.source.kind().as_str()))]
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerationOutcome> {
        request.validate()?;
        let start = Instant::now();
        let source_name = request.source.source_name();

        progress.phase("Assembling context");
        let prompt = build_prompt(request, self.catalog);
        let model = self.client.settings().model.clone();

        let blueprint_id = self
            .storage
            .insert_generating(&NewBlueprint {
                practice_id: request.practice_id.trim(),
                source_type: request.source.kind(),
                source_ref: request.source.source_ref(),
                service_name: source_name,
                llm_model: &model,
                prompt_hash: &prompt.hash,
            })
            .await?;
        info!(%blueprint_id, %model, "generation started");

        progress.phase("Waiting for model");
        let completion = match self.client.complete(&prompt.messages()).await {
            Ok(completion) => completion,
            Err(e) => {
                if !e.is_provider_failure() {
                    warn!(error = %e, "unexpected error from provider call");
                }
                let message = e.to_string();
                let duration_ms = millis(start.elapsed());
                self.storage
                    .record_failure(
                        &blueprint_id,
                        &FailureRecord {
                            marker: DraftMarker::ProviderUnavailable,
                            excerpt: &excerpt(&message),
                            generation_tokens: None,
                            generation_duration_ms: Some(duration_ms),
                        },
                    )
                    .await?;
                warn!(%blueprint_id, marker = DraftMarker::ProviderUnavailable.as_str(), duration_ms, "generation failed");
                return Ok(self.finish(blueprint_id, DraftState::Failed {
                    marker: DraftMarker::ProviderUnavailable,
                    message,
                }, start, progress));
            }
        };

        let tokens = completion.usage.total_tokens;
        let duration_ms = millis(completion.latency);

        progress.phase("Parsing blueprint");
        let accepted = match parse_blueprint(&completion.content, source_name, self.catalog) {
            ParseOutcome::Accepted(accepted) => accepted,
            ParseOutcome::NeedsRepair { error, excerpt } => {
                self.storage
                    .record_failure(
                        &blueprint_id,
                        &FailureRecord {
                            marker: DraftMarker::ParseError,
                            excerpt: &excerpt,
                            generation_tokens: Some(tokens),
                            generation_duration_ms: Some(duration_ms),
                        },
                    )
                    .await?;
                warn!(%blueprint_id, marker = DraftMarker::ParseError.as_str(), %error, tokens, "model output needs repair");
                return Ok(self.finish(blueprint_id, DraftState::Failed {
                    marker: DraftMarker::ParseError,
                    message: error,
                }, start, progress));
            }
        };

        progress.phase("Compiling artifacts");
        let draft = prepare_draft(accepted, source_name, &completion.model);

        self.storage
            .complete_draft(
                &blueprint_id,
                &DraftCompletion {
                    service_code: &draft.identity.code,
                    service_name: &draft.identity.name,
                    display_name: &draft.identity.display_name,
                    category: &draft.identity.category,
                    document: &draft.document,
                    llm_model: &completion.model,
                    generation_tokens: tokens,
                    generation_duration_ms: duration_ms,
                },
            )
            .await?;

        info!(
            %blueprint_id,
            code = %draft.identity.code,
            tokens,
            duration_ms,
            warnings = draft.warnings.len(),
            "draft stored"
        );

        Ok(self.finish(
            blueprint_id,
            DraftState::Accepted {
                service_code: draft.identity.code,
                service_name: draft.identity.name,
                warnings: draft.warnings,
            },
            start,
            progress,
        ))
    }

    fn finish(
        &self,
        blueprint_id: BlueprintId,
        state: DraftState,
        start: Instant,
        progress: &dyn ProgressReporter,
    ) -> GenerationOutcome {
        let outcome = GenerationOutcome {
            blueprint_id,
            state,
            elapsed: start.elapsed(),
        };
        progress.done(&outcome);
        outcome
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
