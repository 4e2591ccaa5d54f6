//! Compilation orchestrator for upe
//!
//! [`Compiler::compile`] turns a free-text goal plus slots into a
//! [`CompiledPrompt`](upe_templates::CompiledPrompt): it selects a template
//! with the [`Detector`], checks the [`ResultCache`], validates slots with the
//! [`SlotValidator`], renders through the [`PromptAssembler`] and records a
//! run manifest for every outcome.

pub mod assembler;
pub mod cache;
pub mod compiler;
pub mod detector;
pub mod followups;
pub mod request;
pub mod slots;

pub use assembler::{PromptAssembler, RenderOptions};
pub use cache::{CacheStats, ResultCache, cache_key};
pub use compiler::{Compiler, CompilerOptions, template_checksum};
pub use detector::{DetectionResult, Detector};
pub use followups::Followup;
pub use request::{CompileRequest, CompileResponse, CostInfo, Provenance, ResponseMetadata};
pub use slots::{SlotIssue, SlotReport, SlotValidator};
