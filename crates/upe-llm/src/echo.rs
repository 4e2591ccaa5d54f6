//! Deterministic offline generator

use async_trait::async_trait;

use upe_templates::SENTINEL_MARKER;
use upe_utils::error::GeneratorError;

use crate::types::{GenerationRequest, GenerationResult, Generator, Usage, estimate_tokens};

pub const ECHO_PROVIDER: &str = "echo";

/// Generator that echoes the user prompt back.
///
/// Output depends only on the request, so it is suitable for dry runs and
/// tests. Content always ends with the sentinel marker.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator;

impl EchoGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        ECHO_PROVIDER
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GeneratorError> {
        if request.user.trim().is_empty() {
            return Err(GeneratorError::Provider("empty user prompt".to_string()));
        }

        let body = request
            .user
            .trim_end()
            .trim_end_matches(SENTINEL_MARKER)
            .trim_end();
        let seed = request
            .seed
            .map_or_else(|| "none".to_string(), |s| s.to_string());
        let content = format!(
            "[echo t={:.2} seed={seed}]\n{body}\n{SENTINEL_MARKER}",
            request.temperature
        );

        let prompt_tokens = estimate_tokens(&request.system) + estimate_tokens(&request.user);
        let completion_tokens = estimate_tokens(&content).min(u64::from(request.max_tokens));

        Ok(GenerationResult {
            content,
            usage: Usage::new(prompt_tokens, completion_tokens),
            cost: 0.0,
        })
    }
}
