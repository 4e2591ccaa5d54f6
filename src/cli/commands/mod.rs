//! CLI command implementations (facade).
//!
//! Re-exports the command surface used by `run.rs` and CLI tests.

// Some re-exports are only used by the cfg(test) CLI tests
#![allow(unused_imports)]

mod batch;
mod compile;
mod config;
mod manifest;
mod templates;

pub use batch::{BatchEntry, BatchReport, execute_batch_command, parse_batch, run_batch};
pub use compile::{build_request, execute_compile_command, response_exit_code};
pub use config::execute_config_command;
pub use manifest::execute_manifest_command;
pub use templates::execute_templates_command;
