//! Compile request and response wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use upe_manifest::{CompileStatus, RequestEcho, UNAVAILABLE};
use upe_templates::{CompiledPrompt, Mode, Slots};
use upe_utils::error::ErrorInfo;

use crate::followups::Followup;

/// A single compile request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub goal: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub slots: Slots,
    /// Generated when empty
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub bypass_cache: bool,
    /// Generator name for jobs that invoke one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_override: Option<String>,
    /// Seed used in precision mode instead of the template's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_override: Option<u64>,
}

impl CompileRequest {
    #[must_use]
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_slot(
        mut self,
        name: impl Into<String>,
        value: impl Into<upe_templates::SlotValue>,
    ) -> Self {
        self.slots.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    #[must_use]
    pub const fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    #[must_use]
    pub const fn with_seed_override(mut self, seed: u64) -> Self {
        self.seed_override = Some(seed);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_override = Some(provider.into());
        self
    }

    pub(crate) fn echo(&self) -> RequestEcho {
        RequestEcho {
            request_id: self.request_id.clone(),
            goal: self.goal.clone(),
            mode: self.mode,
            slots: self.slots.clone(),
            bypass_cache: self.bypass_cache,
            provider_override: self.provider_override.clone(),
            seed_override: self.seed_override,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostInfo {
    pub estimated_prompt_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Template checksum, or `unavailable`
    pub checksum: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub engine_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub request_id: String,
    pub compile_time_ms: u64,
    pub template_id: String,
    pub template_version: String,
    pub cache_hit: bool,
    pub cost: CostInfo,
    pub provenance: Provenance,
}

/// Terminal outcome of one compile call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub status: CompileStatus,
    pub template_id: String,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<CompiledPrompt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub followups: Vec<Followup>,
    pub metadata: ResponseMetadata,
}

impl CompileResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == CompileStatus::Ok
    }

    /// Whether a template was selected for this response.
    #[must_use]
    pub fn has_template(&self) -> bool {
        self.template_id != UNAVAILABLE
    }
}
