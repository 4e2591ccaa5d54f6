//! Slot validation against a template's declarations

use serde::{Deserialize, Serialize};

use upe_templates::{Slots, Template};
use upe_utils::error::ValidationError;

/// A rule violation on one supplied slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotIssue {
    pub slot: String,
    pub message: String,
}

impl std::fmt::Display for SlotIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.slot, self.message)
    }
}

/// Full validation outcome; nothing is short-circuited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotReport {
    pub valid: bool,
    /// Missing required slots in declaration order
    pub missing_required: Vec<String>,
    /// Rule violations ordered by slot name
    pub type_errors: Vec<SlotIssue>,
}

impl SlotReport {
    #[must_use]
    pub fn has_type_errors(&self) -> bool {
        !self.type_errors.is_empty()
    }

    /// One question per missing slot, using the template's wording when it
    /// has one.
    #[must_use]
    pub fn questions(&self, template: &Template) -> Vec<String> {
        self.missing_required
            .iter()
            .map(|slot| {
                template
                    .questions
                    .get(slot)
                    .cloned()
                    .unwrap_or_else(|| format!("Provide: {slot}"))
            })
            .collect()
    }

    /// The type errors as a single validation error, if any.
    #[must_use]
    pub fn to_error(&self) -> Option<ValidationError> {
        self.has_type_errors().then(|| ValidationError::InvalidSlots {
            issues: self.type_errors.iter().map(ToString::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlotValidator;

impl SlotValidator {
    /// Check `slots` against `template`.
    ///
    /// Empty or whitespace-only text counts as absent. Undeclared slots are
    /// accepted when non-empty.
    #[must_use]
    pub fn validate(template: &Template, slots: &Slots) -> SlotReport {
        let missing_required: Vec<String> = template
            .required_slots
            .iter()
            .filter(|name| slots.get(*name).is_none_or(|v| v.is_empty()))
            .cloned()
            .collect();

        let mut names: Vec<&String> = slots.keys().collect();
        names.sort();

        let mut type_errors = Vec::new();
        for name in names {
            let value = &slots[name];
            if value.is_empty() {
                continue;
            }
            if let Some(rule) = template.slot_rules.get(name)
                && let Err(message) = rule.check(value)
            {
                type_errors.push(SlotIssue {
                    slot: name.clone(),
                    message,
                });
            }
        }

        SlotReport {
            valid: missing_required.is_empty() && type_errors.is_empty(),
            missing_required,
            type_errors,
        }
    }
}
