use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use upe_templates::{CompiledPrompt, Mode, Slots};
use upe_utils::error::ErrorInfo;

/// Manifest schema version written into every record.
pub const MANIFEST_SCHEMA_VERSION: &str = "1";

/// Value recorded for fields whose data was unavailable when the attempt ended.
pub const UNAVAILABLE: &str = "unavailable";

/// Terminal outcome of one compile attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompileStatus {
    Ok,
    Needed,
    Error,
}

impl CompileStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Needed => "NEEDED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for CompileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Echo of the request that produced the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEcho {
    pub request_id: String,
    pub goal: String,
    pub mode: Mode,
    pub slots: Slots,
    pub bypass_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_override: Option<u64>,
}

/// Template identity plus the checksum of its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: String,
    pub version: String,
    pub checksum: String,
}

impl TemplateRef {
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            id: UNAVAILABLE.to_string(),
            version: UNAVAILABLE.to_string(),
            checksum: UNAVAILABLE.to_string(),
        }
    }
}

/// Detection outcome recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub template_id: String,
    pub score: u32,
    pub confidence: f64,
}

/// Cost and performance metrics of one attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub compile_time_ms: u64,
    pub estimated_prompt_tokens: u64,
}

/// Immutable audit record of one compile attempt.
///
/// Every terminal outcome produces one, including cache hits and errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub engine_version: String,
    pub request: RequestEcho,
    pub status: CompileStatus,
    pub template: TemplateRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled: Option<CompiledPrompt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub cache_hit: bool,
    pub metrics: RunMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&CompileStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&CompileStatus::Needed).unwrap(),
            "\"NEEDED\""
        );
        let s: CompileStatus = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(s, CompileStatus::Error);
        assert_eq!(CompileStatus::Needed.to_string(), "NEEDED");
    }

    #[test]
    fn test_unavailable_template_ref() {
        let t = TemplateRef::unavailable();
        assert_eq!(t.id, UNAVAILABLE);
        assert_eq!(t.checksum, UNAVAILABLE);
    }
}
