use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `UpeError` is the primary error type returned by upe library operations.
/// It provides:
/// - Detailed error information for programmatic handling
/// - A stable [`ErrorKind`] recorded in responses and run manifests
/// - User-friendly messages with context and suggestions
///
/// # Error Categories
///
/// | Variant | Description |
/// |---------|-------------|
/// | `Config` | Configuration file or CLI argument errors |
/// | `Validation` | Malformed template registration or malformed request |
/// | `NoCandidate` | No registered template matched the goal |
/// | `Incompatible` | Selected template requires a newer engine |
/// | `Generator` | Text-generation backend failure |
/// | `Store` | Manifest persistence failure |
///
/// The compiler never returns `UpeError` to its caller: every error is folded
/// into a terminal `ERROR` response. Other entry points (registry, config,
/// stores) return it directly.
#[derive(Error, Debug)]
pub enum UpeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No template matched goal '{goal}'")]
    NoCandidate { goal: String },

    #[error(
        "Template {template_id}@{template_version} requires engine {required}, running {engine_version}"
    )]
    Incompatible {
        template_id: String,
        template_version: String,
        required: String,
        engine_version: String,
    },

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Manifest store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UpeError {
    /// Stable classification used in responses, manifests and exit codes.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::NoCandidate { .. } => ErrorKind::NoCandidate,
            Self::Incompatible { .. } => ErrorKind::Incompatible,
            Self::Generator(_) => ErrorKind::Compute,
            Self::Store(_) | Self::Io(_) => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }
}

/// Stable error classification.
///
/// Serialized in snake_case; values are part of the response and manifest
/// contracts and will not change in 1.x releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NoCandidate,
    Incompatible,
    Compute,
    Storage,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NoCandidate => "no_candidate",
            Self::Incompatible => "incompatible",
            Self::Compute => "compute",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable error record carried by responses, manifests and job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&UpeError> for ErrorInfo {
    fn from(err: &UpeError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

/// Structural validation failures for templates and requests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: String },

    #[error("{field} = {value} is outside the allowed range {range}")]
    OutOfRange {
        field: String,
        value: String,
        range: String,
    },

    #[error("Invalid version for {field}: '{value}' ({reason})")]
    InvalidVersion {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Template '{id}' is already registered (use replace to overwrite)")]
    DuplicateTemplate { id: String },

    #[error("Template '{id}@{version}' is already registered with different content")]
    ChangedContent { id: String, version: String },

    #[error("Unknown mode '{0}'. Available modes: precision, standard, creative")]
    UnknownMode(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("{} slot value(s) failed validation: {}", .issues.len(), .issues.join("; "))]
    InvalidSlots { issues: Vec<String> },
}

/// Failures reported by a text-generation backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    /// Transport-level failure (process spawn, HTTP connectivity)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider rejected the request or returned an unusable payload
    #[error("Provider error: {0}")]
    Provider(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Budget limit exceeded
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// No generator registered under the requested name
    #[error("Unknown generator '{0}'")]
    UnknownProvider(String),
}

/// Manifest persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Manifest for run {run_id} already exists")]
    AlreadyExists { run_id: String },

    #[error("Manifest write failed at {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Manifest read failed for {run_id}: {reason}")]
    ReadFailed { run_id: String, reason: String },
}

impl UserFriendlyError for UpeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => format!("Configuration problem: {err}"),
            Self::Validation(err) => format!("Invalid input: {err}"),
            Self::NoCandidate { goal } => {
                format!("No prompt template matches the goal \"{goal}\"")
            }
            Self::Incompatible {
                template_id,
                required,
                engine_version,
                ..
            } => format!(
                "Template '{template_id}' needs engine {required} but this is {engine_version}"
            ),
            Self::Generator(err) => format!("Text generation failed: {err}"),
            Self::Store(err) => format!("Could not persist run manifest: {err}"),
            Self::Io(err) => format!("File system error: {err}"),
            Self::Internal(msg) => format!("Internal error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NoCandidate { .. } => Some(
                "Templates are chosen by keyword overlap between the goal and each template's keyword list."
                    .to_string(),
            ),
            Self::Generator(GeneratorError::BudgetExceeded { .. }) => Some(
                "The generator budget counts attempted calls, including failed ones.".to_string(),
            ),
            Self::Store(StoreError::AlreadyExists { .. }) => {
                Some("Run manifests are write-once and keyed by run id.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(_) => vec![
                "Check .upe/config.toml for typos".to_string(),
                "Run 'upe config' to inspect effective values and their sources".to_string(),
            ],
            Self::Validation(ValidationError::UnknownMode(_)) => {
                vec!["Use one of: precision, standard, creative".to_string()]
            }
            Self::Validation(_) => vec!["Fix the reported field and resubmit".to_string()],
            Self::NoCandidate { .. } => vec![
                "Rephrase the goal using words from a template's keywords".to_string(),
                "Run 'upe templates list' to see available templates".to_string(),
            ],
            Self::Incompatible { .. } => {
                vec!["Upgrade upe or register an older template version".to_string()]
            }
            Self::Generator(_) => vec!["Retry the request or submit it as a job".to_string()],
            Self::Store(_) | Self::Io(_) => {
                vec!["Check permissions on the manifest directory".to_string()]
            }
            Self::Internal(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = UpeError::NoCandidate {
            goal: "x".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NoCandidate);

        let err = UpeError::from(ValidationError::EmptyField {
            field: "id".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = UpeError::from(GeneratorError::Transport("reset".to_string()));
        assert_eq!(err.kind(), ErrorKind::Compute);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoCandidate).unwrap();
        assert_eq!(json, "\"no_candidate\"");
        assert_eq!(ErrorKind::Compute.to_string(), "compute");
    }

    #[test]
    fn test_invalid_slots_message_counts_issues() {
        let err = ValidationError::InvalidSlots {
            issues: vec!["a: too long".to_string(), "b: not a number".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 slot value(s)"));
        assert!(msg.contains("b: not a number"));
    }

    #[test]
    fn test_display_for_user_includes_suggestions() {
        let err = UpeError::NoCandidate {
            goal: "paint a fence".to_string(),
        };
        let message = err.display_for_user();
        assert!(message.contains("paint a fence"));
        assert!(message.contains("Context:"));
        assert!(message.contains("Suggestions:"));
    }
}
