//! Command-line interface for upe
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point, configuration and dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;


pub use args::{Cli, Commands, ManifestCommands, TemplateCommands};
pub use run::run;
