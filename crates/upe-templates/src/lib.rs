//! Prompt template ("cartridge") model, registry and loaders
//!
//! A [`Template`] is a versioned prompt blueprint: keywords for detection,
//! slot declarations with validation rules, prompt texts with `{{slot}}`
//! placeholders and a default [`DeterminismBlock`]. Templates are held by a
//! [`TemplateRegistry`] that callers construct explicitly.

pub mod builtin;
pub mod compat;
pub mod compiled;
pub mod loader;
pub mod mode;
pub mod model;
pub mod registry;
pub mod slot;

pub use compat::Compatibility;
pub use compiled::{CompiledPrompt, OutputContract, estimate_tokens};
pub use mode::Mode;
pub use model::{
    DeterminismBlock, ModeDeltas, OutputSpec, PromptTexts, SENTINEL_MARKER, Template,
};
pub use registry::{Registration, TemplateRegistry};
pub use slot::{SlotKind, SlotRule, SlotValue, Slots};
