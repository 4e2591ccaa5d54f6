use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use upe_utils::error::ValidationError;

/// Compilation mode controlling the direction of the determinism override.
///
/// - `Precision` lowers temperature and pins a seed
/// - `Standard` and `Creative` raise temperature and drop any seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Mode {
    Precision,
    #[default]
    Standard,
    Creative,
}

impl Mode {
    /// Parse a mode name, accepting the legacy gear names.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownMode` if the name is not recognized.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "precision" | "proof" | "yafa" | "strict" => Ok(Self::Precision),
            "standard" | "turbo" | "default" => Ok(Self::Standard),
            "creative" | "mentor" | "ms" | "explore" => Ok(Self::Creative),
            _ => Err(ValidationError::UnknownMode(s.to_string())),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Standard => "standard",
            Self::Creative => "creative",
        }
    }

    /// Whether this mode pins a seed for reproducible generation.
    #[must_use]
    pub const fn is_deterministic(&self) -> bool {
        matches!(self, Self::Precision)
    }

    #[must_use]
    pub const fn all() -> &'static [Mode] {
        &[Self::Precision, Self::Standard, Self::Creative]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Mode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl FromStr for Mode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
