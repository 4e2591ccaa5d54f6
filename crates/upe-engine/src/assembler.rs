//! Prompt rendering and mode-specific determinism overrides

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use upe_templates::{
    CompiledPrompt, DeterminismBlock, Mode, OutputContract, SENTINEL_MARKER, Slots, Template,
};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder pattern is valid")
});

const GOAL_PLACEHOLDER: &str = "goal";
const MODE_PLACEHOLDER: &str = "mode";

const RETURN_INSTRUCTIONS: &str =
    "[RETURN INSTRUCTIONS] Return only the requested output, then end with";

/// Request-level inputs that are not slots.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions<'a> {
    /// Substituted for `{{goal}}` unless a `goal` slot is supplied
    pub goal: Option<&'a str>,
    /// Honoured only in precision mode
    pub seed_override: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    /// Render `template` with `slots` under `mode`.
    #[must_use]
    pub fn render(template: &Template, slots: &Slots, mode: Mode) -> CompiledPrompt {
        Self::render_with(template, slots, mode, &RenderOptions::default())
    }

    /// Render with request-level options.
    ///
    /// Substitution is best-effort: placeholders with no value (or an empty
    /// value) are left verbatim.
    #[must_use]
    pub fn render_with(
        template: &Template,
        slots: &Slots,
        mode: Mode,
        options: &RenderOptions<'_>,
    ) -> CompiledPrompt {
        let fill = |text: &str| substitute(text, slots, mode, options.goal);

        let mut user = fill(&template.prompts.user);
        if !user.contains(SENTINEL_MARKER) {
            if !user.is_empty() && !user.ends_with('\n') {
                user.push('\n');
            }
            user.push_str(RETURN_INSTRUCTIONS);
            user.push(' ');
            user.push_str(SENTINEL_MARKER);
        }

        CompiledPrompt {
            system: fill(&template.prompts.system),
            user,
            critic: fill(&template.prompts.critic),
            determinism: Self::effective_determinism(template, mode, options.seed_override),
            output: OutputContract {
                format: template.output.format.clone(),
                sentinel: SENTINEL_MARKER.to_string(),
                alternatives_required: template.output.alternatives_required,
            },
            builder_plan: template.builder_plan.clone(),
        }
    }

    /// Apply the mode override to the template's base determinism block.
    ///
    /// Precision lowers temperature and always pins a seed. Standard and
    /// creative raise temperature and never carry a seed. The sentinel is
    /// always part of the stop list.
    #[must_use]
    pub fn effective_determinism(
        template: &Template,
        mode: Mode,
        seed_override: Option<u64>,
    ) -> DeterminismBlock {
        let base = &template.determinism;
        let deltas = &template.mode_deltas;
        let mut block = base.clone();

        match mode {
            Mode::Precision => {
                block.temperature = (base.temperature - deltas.precision).max(0.0);
                block.seed = Some(seed_override.or(base.seed).unwrap_or(deltas.pinned_seed));
            }
            Mode::Standard => {
                block.temperature = (base.temperature + deltas.standard).min(2.0);
                block.seed = None;
            }
            Mode::Creative => {
                block.temperature = (base.temperature + deltas.creative).min(2.0);
                block.seed = None;
            }
        }

        if !block.stop.iter().any(|s| s == SENTINEL_MARKER) {
            block.stop.push(SENTINEL_MARKER.to_string());
        }
        block
    }
}

fn substitute(text: &str, slots: &Slots, mode: Mode, goal: Option<&str>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            if let Some(value) = slots.get(name).filter(|v| !v.is_empty()) {
                return value.to_string();
            }
            match name {
                GOAL_PLACEHOLDER => goal
                    .filter(|g| !g.trim().is_empty())
                    .map_or_else(|| caps[0].to_string(), str::to_string),
                MODE_PLACEHOLDER => mode.as_str().to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}
