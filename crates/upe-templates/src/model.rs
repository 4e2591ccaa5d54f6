use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use upe_utils::canonicalization::canonical_hash;
use upe_utils::error::ValidationError;

use crate::slot::SlotRule;

/// End-of-generation marker carried by every compiled output contract.
pub const SENTINEL_MARKER: &str = "</END>";

/// Temperature clamp bounds. A template's base temperature must lie strictly
/// inside them.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// Inclusive nucleus-sampling bounds accepted at registration.
pub const TOP_P_RANGE: (f64, f64) = (0.0, 1.0);

const DEFAULT_PINNED_SEED: u64 = 42;

/// Generation-control parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeterminismBlock {
    pub temperature: f64,
    pub top_p: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub stop: Vec<String>,
    pub max_tokens: u32,
}

impl Default for DeterminismBlock {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            seed: None,
            stop: Vec::new(),
            max_tokens: 2048,
        }
    }
}

/// Template-defined temperature deltas per mode.
///
/// Only magnitudes are configurable; the direction of each override is fixed
/// by the assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeDeltas {
    pub precision: f64,
    pub standard: f64,
    pub creative: f64,
    /// Seed used by precision mode when neither the request nor the base
    /// determinism block supplies one
    #[serde(default = "default_pinned_seed")]
    pub pinned_seed: u64,
}

fn default_pinned_seed() -> u64 {
    DEFAULT_PINNED_SEED
}

impl Default for ModeDeltas {
    fn default() -> Self {
        Self {
            precision: 0.3,
            standard: 0.1,
            creative: 0.4,
            pinned_seed: DEFAULT_PINNED_SEED,
        }
    }
}

/// Output contract defaults declared by the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub alternatives_required: bool,
}

fn default_format() -> String {
    "markdown".to_string()
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            format: default_format(),
            alternatives_required: false,
        }
    }
}

/// System, user and critic prompt texts with `{{slot}}` placeholders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptTexts {
    pub system: String,
    pub user: String,
    #[serde(default)]
    pub critic: String,
}

/// A named, versioned prompt blueprint ("cartridge").
///
/// Content is fixed once registered: the registry hands out `Arc<Template>`
/// and replacement swaps the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub required_slots: Vec<String>,
    #[serde(default)]
    pub optional_slots: Vec<String>,
    #[serde(default)]
    pub slot_rules: BTreeMap<String, SlotRule>,
    /// Bespoke follow-up question per slot, asked when the slot is missing
    #[serde(default)]
    pub questions: BTreeMap<String, String>,
    pub prompts: PromptTexts,
    #[serde(default)]
    pub determinism: DeterminismBlock,
    #[serde(default)]
    pub mode_deltas: ModeDeltas,
    #[serde(default)]
    pub output: OutputSpec,
    /// Ordered build steps surfaced to consumers as a plan hint
    #[serde(default)]
    pub builder_plan: Vec<String>,
    /// Lowest engine version able to compile this template (semver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_engine_version: Option<String>,
}

impl Template {
    /// Minimal constructor used by tests and programmatic registration.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            name: String::new(),
            description: String::new(),
            keywords: Vec::new(),
            required_slots: Vec::new(),
            optional_slots: Vec::new(),
            slot_rules: BTreeMap::new(),
            questions: BTreeMap::new(),
            prompts: PromptTexts {
                system: system.into(),
                user: user.into(),
                critic: String::new(),
            },
            determinism: DeterminismBlock::default(),
            mode_deltas: ModeDeltas::default(),
            output: OutputSpec::default(),
            builder_plan: Vec::new(),
            min_engine_version: None,
        }
    }

    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_required_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_slots = slots.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_optional_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_slots = slots.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_rule(mut self, slot: impl Into<String>, rule: SlotRule) -> Self {
        self.slot_rules.insert(slot.into(), rule);
        self
    }

    #[must_use]
    pub fn with_question(mut self, slot: impl Into<String>, question: impl Into<String>) -> Self {
        self.questions.insert(slot.into(), question.into());
        self
    }

    #[must_use]
    pub fn with_critic(mut self, critic: impl Into<String>) -> Self {
        self.prompts.critic = critic.into();
        self
    }

    #[must_use]
    pub fn with_determinism(mut self, determinism: DeterminismBlock) -> Self {
        self.determinism = determinism;
        self
    }

    #[must_use]
    pub fn with_min_engine_version(mut self, version: impl Into<String>) -> Self {
        self.min_engine_version = Some(version.into());
        self
    }

    /// `id@version` label used in logs and manifests.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    /// Checksum over identity, prompt texts and the base determinism block.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be serialized.
    pub fn checksum(&self) -> anyhow::Result<String> {
        canonical_hash(&serde_json::json!({
            "id": self.id,
            "version": self.version,
            "prompts": self.prompts,
            "determinism": self.determinism,
        }))
    }

    /// Whether `slot` is declared as required or optional.
    #[must_use]
    pub fn declares_slot(&self, slot: &str) -> bool {
        self.required_slots.iter().any(|s| s == slot)
            || self.optional_slots.iter().any(|s| s == slot)
    }

    /// Validate structural constraints checked at registration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(empty("id"));
        }
        if self.version.trim().is_empty() {
            return Err(empty("version"));
        }

        let d = &self.determinism;
        check_range("determinism.temperature", d.temperature, TEMPERATURE_RANGE)?;
        // A base on either clamp bound would leave one mode's override inert
        if d.temperature <= TEMPERATURE_RANGE.0 || d.temperature >= TEMPERATURE_RANGE.1 {
            return Err(ValidationError::OutOfRange {
                field: "determinism.temperature".to_string(),
                value: d.temperature.to_string(),
                range: format!("({}, {})", TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
            });
        }
        check_range("determinism.top_p", d.top_p, TOP_P_RANGE)?;
        if d.max_tokens == 0 {
            return Err(ValidationError::OutOfRange {
                field: "determinism.max_tokens".to_string(),
                value: "0".to_string(),
                range: ">= 1".to_string(),
            });
        }

        for (field, delta) in [
            ("mode_deltas.precision", self.mode_deltas.precision),
            ("mode_deltas.standard", self.mode_deltas.standard),
            ("mode_deltas.creative", self.mode_deltas.creative),
        ] {
            if !delta.is_finite() || delta <= 0.0 || delta > TEMPERATURE_RANGE.1 {
                return Err(ValidationError::OutOfRange {
                    field: field.to_string(),
                    value: delta.to_string(),
                    range: "(0, 2]".to_string(),
                });
            }
        }

        for slot in self.required_slots.iter().chain(&self.optional_slots) {
            if slot.trim().is_empty() {
                return Err(empty("slot name"));
            }
        }

        for (slot, rule) in &self.slot_rules {
            if let (Some(min), Some(max)) = (rule.min_len, rule.max_len)
                && min > max
            {
                return Err(ValidationError::OutOfRange {
                    field: format!("slot_rules.{slot}.min_len"),
                    value: min.to_string(),
                    range: format!("<= max_len ({max})"),
                });
            }
        }

        if let Some(min_engine) = &self.min_engine_version {
            semver::Version::parse(min_engine).map_err(|e| ValidationError::InvalidVersion {
                field: "min_engine_version".to_string(),
                value: min_engine.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

fn empty(field: &str) -> ValidationError {
    ValidationError::EmptyField {
        field: field.to_string(),
    }
}

fn check_range(field: &str, value: f64, (lo, hi): (f64, f64)) -> Result<(), ValidationError> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            range: format!("[{lo}, {hi}]"),
        })
    }
}
