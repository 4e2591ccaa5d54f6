use chrono::{DateTime, Utc};

use upe_templates::CompiledPrompt;
use upe_utils::error::ErrorInfo;

use crate::model::{
    CompileStatus, DetectionRecord, MANIFEST_SCHEMA_VERSION, RequestEcho, RunManifest, RunMetrics,
    TemplateRef,
};

/// Incrementally collects what is known about a compile attempt.
///
/// Construction happens before any pipeline work so that a manifest can be
/// produced from whatever stage the attempt reached. Fields never set keep
/// their placeholder values.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    run_id: String,
    created_at: DateTime<Utc>,
    engine_version: String,
    request: RequestEcho,
    template: TemplateRef,
    detection: Option<DetectionRecord>,
    compiled: Option<CompiledPrompt>,
    questions: Vec<String>,
    error: Option<ErrorInfo>,
    cache_hit: bool,
    metrics: RunMetrics,
}

impl ManifestBuilder {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        request: RequestEcho,
        engine_version: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            created_at: Utc::now(),
            engine_version: engine_version.into(),
            request,
            template: TemplateRef::unavailable(),
            detection: None,
            compiled: None,
            questions: Vec::new(),
            error: None,
            cache_hit: false,
            metrics: RunMetrics::default(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn template(&mut self, id: &str, version: &str, checksum: &str) -> &mut Self {
        self.template = TemplateRef {
            id: id.to_string(),
            version: version.to_string(),
            checksum: checksum.to_string(),
        };
        self
    }

    pub fn detection(&mut self, detection: DetectionRecord) -> &mut Self {
        self.detection = Some(detection);
        self
    }

    pub fn compiled(&mut self, compiled: CompiledPrompt) -> &mut Self {
        self.compiled = Some(compiled);
        self
    }

    pub fn questions(&mut self, questions: Vec<String>) -> &mut Self {
        self.questions = questions;
        self
    }

    pub fn error(&mut self, error: ErrorInfo) -> &mut Self {
        self.error = Some(error);
        self
    }

    pub fn cache_hit(&mut self, hit: bool) -> &mut Self {
        self.cache_hit = hit;
        self
    }

    pub fn metrics(&mut self, metrics: RunMetrics) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// Finish the record with a terminal status.
    #[must_use]
    pub fn build(&self, status: CompileStatus) -> RunManifest {
        RunManifest {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            run_id: self.run_id.clone(),
            created_at: self.created_at,
            finished_at: Utc::now(),
            engine_version: self.engine_version.clone(),
            request: self.request.clone(),
            status,
            template: self.template.clone(),
            detection: self.detection.clone(),
            compiled: self.compiled.clone(),
            questions: self.questions.clone(),
            error: self.error.clone(),
            cache_hit: self.cache_hit,
            metrics: self.metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UNAVAILABLE;
    use upe_templates::{Mode, Slots};
    use upe_utils::error::ErrorKind;

    fn echo() -> RequestEcho {
        RequestEcho {
            request_id: "req-1".to_string(),
            goal: "board deck".to_string(),
            mode: Mode::Standard,
            slots: Slots::new(),
            bypass_cache: false,
            provider_override: None,
            seed_override: None,
        }
    }

    #[test]
    fn test_error_manifest_keeps_placeholders() {
        let mut builder = ManifestBuilder::new("run-1", echo(), "1.0.0");
        builder.error(ErrorInfo::new(ErrorKind::NoCandidate, "no match"));
        let manifest = builder.build(CompileStatus::Error);

        assert_eq!(manifest.schema_version, MANIFEST_SCHEMA_VERSION);
        assert_eq!(manifest.template.checksum, UNAVAILABLE);
        assert!(manifest.compiled.is_none());
        assert_eq!(manifest.error.unwrap().kind, ErrorKind::NoCandidate);
        assert!(manifest.finished_at >= manifest.created_at);
    }

    #[test]
    fn test_builder_records_progress() {
        let mut builder = ManifestBuilder::new("run-2", echo(), "1.0.0");
        builder
            .template("deck", "1.0.0", "abc")
            .detection(DetectionRecord {
                template_id: "deck".to_string(),
                score: 2,
                confidence: 1.0,
            })
            .questions(vec!["Who is the audience?".to_string()])
            .cache_hit(false);
        let manifest = builder.build(CompileStatus::Needed);

        assert_eq!(manifest.run_id, "run-2");
        assert_eq!(manifest.template.id, "deck");
        assert_eq!(manifest.detection.unwrap().score, 2);
        assert_eq!(manifest.questions.len(), 1);
    }
}
