//! Request/response contract between the orchestrator and a generator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use upe_templates::CompiledPrompt;
pub use upe_templates::estimate_tokens;
use upe_utils::error::GeneratorError;

/// Input to a generator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl GenerationRequest {
    /// Map a compiled prompt onto the generator contract.
    ///
    /// The critic text is not sent; it is a second-pass prompt.
    #[must_use]
    pub fn from_compiled(compiled: &CompiledPrompt) -> Self {
        let d = &compiled.determinism;
        Self {
            system: compiled.system.clone(),
            user: compiled.user.clone(),
            temperature: d.temperature,
            top_p: d.top_p,
            max_tokens: d.max_tokens,
            seed: d.seed,
            stop: d.stop.clone(),
        }
    }
}

/// Token accounting reported by a generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Output of a generator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub usage: Usage,
    /// Provider-reported cost in USD
    pub cost: f64,
}

/// Trait for text-generation backends.
///
/// Implementations are black boxes to the orchestrator; it only relies on
/// this request/response contract.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Stable provider name used for `providerOverride` lookups
    fn name(&self) -> &str;

    /// Generate text for the given request
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` for transport, provider, timeout or budget
    /// failures.
    async fn generate(&self, request: GenerationRequest)
    -> Result<GenerationResult, GeneratorError>;
}
