//! The synchronous compile pipeline
//!
//! ```text
//! SELECT_TEMPLATE -> CHECK_CACHE -(hit)-> OK
//!                                -(miss)-> VALIDATE_SLOTS -(invalid)-> ERROR
//!                                                         -(missing)-> NEEDED
//!                                                         -(ok)-> ASSEMBLE -> CACHE_STORE -> OK
//! ```
//!
//! Every outcome, including errors and panics inside the pipeline, produces a
//! [`CompileResponse`] and a persisted [`RunManifest`](upe_manifest::RunManifest).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use upe_config::{Config, EngineConfig};
use upe_manifest::{
    CompileStatus, ManifestBuilder, ManifestStore, RunMetrics, TemplateRef, UNAVAILABLE,
};
use upe_templates::{
    CompiledPrompt, Compatibility, Registration, Template, TemplateRegistry, compat,
};
use upe_utils::error::{ErrorInfo, UpeError, ValidationError};
use upe_utils::logging::compile_span;

use crate::assembler::{PromptAssembler, RenderOptions};
use crate::cache::{CacheStats, ResultCache, cache_key};
use crate::detector::Detector;
use crate::followups;
use crate::request::{CompileRequest, CompileResponse, CostInfo, Provenance, ResponseMetadata};
use crate::slots::SlotValidator;

/// Tunables for a [`Compiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub max_goal_chars: usize,
    /// Compared against each template's `min_engine_version`
    pub engine_version: String,
}

impl CompilerOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_engine(&config.engine)
    }

    fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            cache_capacity: engine.cache_capacity,
            cache_ttl: Duration::from_secs(engine.cache_ttl_secs),
            max_goal_chars: engine.max_goal_chars,
            engine_version: engine.engine_version.clone(),
        }
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::from_engine(&EngineConfig::default())
    }
}

/// Checksum over a template's identity, texts and base determinism block.
///
/// # Errors
///
/// Returns an error if the template cannot be serialized.
pub fn template_checksum(template: &Template) -> anyhow::Result<String> {
    template.checksum()
}

struct Outcome {
    status: CompileStatus,
    compiled: Option<CompiledPrompt>,
    questions: Vec<String>,
    error: Option<UpeError>,
    cache_hit: bool,
}

impl Outcome {
    fn ok(compiled: CompiledPrompt, cache_hit: bool) -> Self {
        Self {
            status: CompileStatus::Ok,
            compiled: Some(compiled),
            questions: Vec::new(),
            error: None,
            cache_hit,
        }
    }

    fn needed(questions: Vec<String>) -> Self {
        Self {
            status: CompileStatus::Needed,
            compiled: None,
            questions,
            error: None,
            cache_hit: false,
        }
    }

    fn error(error: UpeError) -> Self {
        Self {
            status: CompileStatus::Error,
            compiled: None,
            questions: Vec::new(),
            error: Some(error),
            cache_hit: false,
        }
    }
}

/// Orchestrates detection, validation, assembly, caching and provenance.
///
/// Shared state is limited to the registry, cache and manifest store, all of
/// which are safe for concurrent `compile` calls.
pub struct Compiler {
    registry: Arc<TemplateRegistry>,
    store: Arc<dyn ManifestStore>,
    cache: ResultCache<CompiledPrompt>,
    options: CompilerOptions,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("templates", &self.registry.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    #[must_use]
    pub fn new(
        registry: Arc<TemplateRegistry>,
        store: Arc<dyn ManifestStore>,
        options: CompilerOptions,
    ) -> Self {
        Self {
            cache: ResultCache::new(options.cache_capacity),
            registry,
            store,
            options,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ManifestStore> {
        &self.store
    }

    #[must_use]
    pub const fn options(&self) -> &CompilerOptions {
        &self.options
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Register a new template and drop any cached output under its id.
    ///
    /// # Errors
    ///
    /// Fails when the template is invalid or its id is already registered.
    pub fn register_template(&self, template: Template) -> Result<Registration, ValidationError> {
        let tag = template_tag(&template.id);
        let registration = self.registry.register(template)?;
        self.cache.invalidate_by_tag(&tag);
        Ok(registration)
    }

    /// Replace (or insert) a template and drop cached output under its id.
    ///
    /// # Errors
    ///
    /// Fails when the template is invalid or would change the content of an
    /// already registered id and version.
    pub fn replace_template(&self, template: Template) -> Result<Registration, ValidationError> {
        let tag = template_tag(&template.id);
        let registration = self.registry.replace(template)?;
        let dropped = self.cache.invalidate_by_tag(&tag);
        debug!(tag = %tag, dropped, "invalidated cache after template replacement");
        Ok(registration)
    }

    /// Compile one request. Never fails and never panics to the caller.
    pub fn compile(&self, mut request: CompileRequest) -> CompileResponse {
        let started = Instant::now();
        if request.request_id.trim().is_empty() {
            request.request_id = Uuid::new_v4().to_string();
        }
        let run_id = Uuid::new_v4().to_string();

        let span = compile_span(&request.request_id, request.mode.as_str());
        let _guard = span.enter();

        let mut manifest =
            ManifestBuilder::new(&run_id, request.echo(), &self.options.engine_version);
        let mut selected = TemplateRef::unavailable();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(&request, &mut manifest, &mut selected)
        })) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => Outcome::error(err),
            Err(payload) => Outcome::error(UpeError::Internal(format!(
                "compile pipeline panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        self.finish(&request, manifest, selected, outcome, started)
    }

    fn run(
        &self,
        request: &CompileRequest,
        manifest: &mut ManifestBuilder,
        selected: &mut TemplateRef,
    ) -> Result<Outcome, UpeError> {
        self.check_goal(&request.goal)?;

        let detection = Detector::select(&request.goal, &self.registry)?;
        manifest.detection(detection.record());
        let template = Arc::clone(&detection.template);
        debug!(
            template = %template.label(),
            score = detection.score,
            confidence = detection.confidence,
            "selected template"
        );

        let checksum = template_checksum(&template).map_err(internal)?;
        manifest.template(&template.id, &template.version, &checksum);
        *selected = TemplateRef {
            id: template.id.clone(),
            version: template.version.clone(),
            checksum: checksum.clone(),
        };

        self.check_compatibility(&template)?;

        let key = cache_key(
            &request.goal,
            &request.slots,
            request.mode,
            &template.id,
            &template.version,
            &checksum,
            request.seed_override,
        )
        .map_err(internal)?;

        if request.bypass_cache {
            debug!("cache bypassed");
        } else if let Some(compiled) = self.cache.get(&key) {
            debug!("cache hit");
            manifest.cache_hit(true);
            return Ok(Outcome::ok(compiled, true));
        }

        let report = SlotValidator::validate(&template, &request.slots);
        if let Some(err) = report.to_error() {
            return Err(err.into());
        }
        if !report.missing_required.is_empty() {
            debug!(missing = ?report.missing_required, "required slots missing");
            return Ok(Outcome::needed(report.questions(&template)));
        }

        let options = RenderOptions {
            goal: Some(&request.goal),
            seed_override: request.seed_override,
        };
        let compiled =
            PromptAssembler::render_with(&template, &request.slots, request.mode, &options);

        self.cache.set(
            key,
            compiled.clone(),
            self.options.cache_ttl,
            vec![
                template_tag(&template.id),
                format!("mode:{}", request.mode),
            ],
        );

        Ok(Outcome::ok(compiled, false))
    }

    fn check_goal(&self, goal: &str) -> Result<(), UpeError> {
        if goal.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "goal".to_string(),
            }
            .into());
        }
        let chars = goal.chars().count();
        if chars > self.options.max_goal_chars {
            return Err(ValidationError::OutOfRange {
                field: "goal".to_string(),
                value: format!("{chars} characters"),
                range: format!("<= {}", self.options.max_goal_chars),
            }
            .into());
        }
        Ok(())
    }

    fn check_compatibility(&self, template: &Template) -> Result<(), UpeError> {
        let engine_version = &self.options.engine_version;
        let required = match compat::check(template, engine_version) {
            Compatibility::Compatible => return Ok(()),
            Compatibility::EngineTooOld { required } => required,
            Compatibility::Unparseable { value, .. } => value,
        };
        Err(UpeError::Incompatible {
            template_id: template.id.clone(),
            template_version: template.version.clone(),
            required,
            engine_version: engine_version.clone(),
        })
    }

    fn finish(
        &self,
        request: &CompileRequest,
        mut manifest: ManifestBuilder,
        selected: TemplateRef,
        outcome: Outcome,
        started: Instant,
    ) -> CompileResponse {
        let compile_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let estimated_prompt_tokens = outcome
            .compiled
            .as_ref()
            .map_or(0, CompiledPrompt::estimated_prompt_tokens);
        let error = outcome.error.as_ref().map(ErrorInfo::from);

        manifest
            .metrics(RunMetrics {
                compile_time_ms,
                estimated_prompt_tokens,
            })
            .questions(outcome.questions.clone())
            .cache_hit(outcome.cache_hit);
        if let Some(compiled) = &outcome.compiled {
            manifest.compiled(compiled.clone());
        }
        if let Some(info) = &error {
            manifest.error(info.clone());
        }

        let record = manifest.build(outcome.status);
        if let Err(err) = self.store.put(&record) {
            warn!(run_id = %record.run_id, error = %err, "failed to persist run manifest");
        }

        match &outcome.error {
            Some(err) => info!(
                status = %outcome.status,
                template = %selected.id,
                kind = %err.kind(),
                error = %err,
                compile_time_ms,
                "compile finished"
            ),
            None => info!(
                status = %outcome.status,
                template = %selected.id,
                cache_hit = outcome.cache_hit,
                compile_time_ms,
                "compile finished"
            ),
        }

        let followups = if outcome.status == CompileStatus::Ok {
            followups::suggest(request.mode, &record.run_id)
        } else {
            Vec::new()
        };

        CompileResponse {
            status: outcome.status,
            template_id: selected.id.clone(),
            final_prompt: outcome.compiled,
            questions: outcome.questions,
            error,
            followups,
            metadata: ResponseMetadata {
                request_id: request.request_id.clone(),
                compile_time_ms,
                template_id: selected.id,
                template_version: selected.version,
                cache_hit: outcome.cache_hit,
                cost: CostInfo {
                    estimated_prompt_tokens,
                },
                provenance: Provenance {
                    checksum: selected.checksum,
                    run_id: record.run_id,
                    timestamp: record.created_at,
                    engine_version: record.engine_version,
                },
            },
        }
    }
}

fn template_tag(id: &str) -> String {
    format!("template:{id}")
}

fn internal(err: anyhow::Error) -> UpeError {
    UpeError::Internal(format!("{err:#}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| UNAVAILABLE.to_string())
}
