//! upe - deterministic prompt compilation with provenance manifests
//!
//! A goal plus slot values goes in; a compiled prompt (or the questions that
//! would complete it) comes out, together with a run manifest that records
//! how the result was produced. A bounded priority scheduler runs compile
//! and generate jobs asynchronously.
//!
//! upe can be used in two ways:
//! - **CLI**: `upe compile`, `upe batch`, `upe templates`, `upe manifest`,
//!   `upe config`
//! - **Library**: build a [`Compiler`] with [`setup::build_compiler`] and
//!   call [`Compiler::compile`], or wrap it in a [`JobScheduler`]
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use upe::{CompileRequest, Config, Mode};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder().build()?;
//! let compiler = upe::setup::build_compiler(&config)?;
//!
//! let response = compiler.compile(
//!     CompileRequest::new("Q3 board deck")
//!         .with_mode(Mode::Precision)
//!         .with_slot("purpose", "approve the hiring plan")
//!         .with_slot("audience", "board"),
//! );
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! Responses, job statuses and manifests serialize with camelCase fields.
//! CLI `--json` output and stored manifests use JCS (RFC 8785) canonical form
//! via [`emit_jcs`].

pub mod cli;
pub mod setup;

pub use upe_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use upe_engine::{
    CacheStats, CompileRequest, CompileResponse, Compiler, CompilerOptions, DetectionResult,
    Detector, Followup, PromptAssembler, ResultCache, SlotReport, SlotValidator,
};
pub use upe_llm::{BudgetedGenerator, EchoGenerator, GenerationRequest, Generator, Generators};
pub use upe_manifest::{
    CompileStatus, FsManifestStore, InMemoryManifestStore, ManifestBuilder, ManifestStore,
    RunManifest,
};
pub use upe_scheduler::{
    COMPILE_JOB, CompileJobHandler, GENERATE_JOB, JobContext, JobError, JobHandler, JobOptions,
    JobScheduler, JobState, JobStatus, SchedulerOptions, SchedulerStats,
};
pub use upe_templates::{CompiledPrompt, Mode, SlotValue, Template, TemplateRegistry};
pub use upe_utils::canonicalization::emit_jcs;
pub use upe_utils::error::{ErrorInfo, ErrorKind, UpeError, UserFriendlyError};
pub use upe_utils::exit_codes::ExitCode;
