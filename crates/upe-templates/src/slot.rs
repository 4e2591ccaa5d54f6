//! Typed slot values and per-slot validation rules

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-request slot map.
///
/// Insertion order carries no meaning; anything hashed or persisted from it
/// goes through canonical JSON first.
pub type Slots = HashMap<String, SlotValue>;

/// A single slot value.
///
/// The boundary accepts plain JSON scalars. Enum membership is a rule on
/// `Text` values, declared per slot by the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SlotValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Empty or whitespace-only text counts as absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }

    /// Parse a `key=value` style CLI value: booleans and numbers are
    /// recognized, everything else is text.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => match raw.parse::<f64>() {
                Ok(n) if n.is_finite() => Self::Number(n),
                _ => Self::Text(raw.to_string()),
            },
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for SlotValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SlotValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Declared type of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    #[default]
    Text,
    Number,
    Bool,
    Enum,
}

/// Validation rule for one slot. Every bound is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotRule {
    #[serde(default)]
    pub kind: SlotKind,
    /// Minimum character count (text and enum)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    /// Maximum character count (text and enum)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Inclusive numeric lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive numeric upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Permitted values for `kind = "enum"`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl SlotRule {
    /// Check a value against this rule, returning a description of the
    /// first violation.
    pub fn check(&self, value: &SlotValue) -> Result<(), String> {
        match (self.kind, value) {
            (SlotKind::Text, SlotValue::Text(s)) => self.check_len(s),
            (SlotKind::Enum, SlotValue::Text(s)) => {
                self.check_len(s)?;
                if self.allowed.iter().any(|a| a == s) {
                    Ok(())
                } else {
                    Err(format!(
                        "'{s}' is not one of [{}]",
                        self.allowed.join(", ")
                    ))
                }
            }
            (SlotKind::Number, SlotValue::Number(n)) => {
                if let Some(min) = self.min
                    && *n < min
                {
                    return Err(format!("{n} is below minimum {min}"));
                }
                if let Some(max) = self.max
                    && *n > max
                {
                    return Err(format!("{n} is above maximum {max}"));
                }
                Ok(())
            }
            (SlotKind::Bool, SlotValue::Bool(_)) => Ok(()),
            (expected, actual) => Err(format!(
                "expected {}, got {}",
                kind_label(expected),
                actual.kind_name()
            )),
        }
    }

    fn check_len(&self, s: &str) -> Result<(), String> {
        let len = s.chars().count();
        if let Some(min) = self.min_len
            && len < min
        {
            return Err(format!("length {len} is below minimum {min}"));
        }
        if let Some(max) = self.max_len
            && len > max
        {
            return Err(format!("length {len} exceeds maximum {max}"));
        }
        Ok(())
    }
}

const fn kind_label(kind: SlotKind) -> &'static str {
    match kind {
        SlotKind::Text => "text",
        SlotKind::Number => "number",
        SlotKind::Bool => "bool",
        SlotKind::Enum => "enum text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialization() {
        let slots: Slots =
            serde_json::from_str(r#"{"a": "text", "b": 3, "c": true, "d": 2.5}"#).unwrap();
        assert_eq!(slots["a"], SlotValue::text("text"));
        assert_eq!(slots["b"], SlotValue::Number(3.0));
        assert_eq!(slots["c"], SlotValue::Bool(true));
        assert_eq!(slots["d"], SlotValue::Number(2.5));
    }

    #[test]
    fn test_display_integral_numbers() {
        assert_eq!(SlotValue::Number(12.0).to_string(), "12");
        assert_eq!(SlotValue::Number(0.25).to_string(), "0.25");
        assert_eq!(SlotValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_infer() {
        assert_eq!(SlotValue::infer("true"), SlotValue::Bool(true));
        assert_eq!(SlotValue::infer("12"), SlotValue::Number(12.0));
        assert_eq!(SlotValue::infer("board"), SlotValue::text("board"));
        assert_eq!(SlotValue::infer("NaN"), SlotValue::text("NaN"));
    }

    #[test]
    fn test_empty_detection() {
        assert!(SlotValue::text("   ").is_empty());
        assert!(!SlotValue::text("x").is_empty());
        assert!(!SlotValue::Number(0.0).is_empty());
    }

    #[test]
    fn test_rule_checks() {
        let text = SlotRule {
            kind: SlotKind::Text,
            min_len: Some(2),
            max_len: Some(4),
            ..SlotRule::default()
        };
        assert!(text.check(&SlotValue::text("abc")).is_ok());
        assert!(text.check(&SlotValue::text("a")).is_err());
        assert!(text.check(&SlotValue::text("abcde")).is_err());
        assert!(text.check(&SlotValue::Number(1.0)).is_err());

        let tone = SlotRule {
            kind: SlotKind::Enum,
            allowed: vec!["formal".to_string(), "bold".to_string()],
            ..SlotRule::default()
        };
        assert!(tone.check(&SlotValue::text("bold")).is_ok());
        let err = tone.check(&SlotValue::text("casual")).unwrap_err();
        assert!(err.contains("formal, bold"));

        let count = SlotRule {
            kind: SlotKind::Number,
            min: Some(3.0),
            max: Some(40.0),
            ..SlotRule::default()
        };
        assert!(count.check(&SlotValue::Number(10.0)).is_ok());
        assert!(count.check(&SlotValue::Number(41.0)).is_err());
        assert_eq!(
            count.check(&SlotValue::text("ten")).unwrap_err(),
            "expected number, got text"
        );
    }
}
