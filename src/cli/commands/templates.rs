//! Templates command implementation
//!
//! Handles `upe templates` subcommands.

use anyhow::{Context, Result};

use upe_config::Config;
use upe_templates::Compatibility;
use upe_templates::compat;
use upe_utils::canonicalization::emit_jcs;
use upe_utils::error::{UpeError, ValidationError};
use upe_utils::exit_codes::ExitCode;

use crate::cli::args::TemplateCommands;
use crate::setup::build_registry;

pub fn execute_templates_command(cmd: TemplateCommands, config: &Config) -> Result<ExitCode> {
    let registry = build_registry(config)?;

    match cmd {
        TemplateCommands::List => {
            let templates = registry.get_all();
            if templates.is_empty() {
                println!("No templates registered.");
                return Ok(ExitCode::SUCCESS);
            }
            println!("Registered templates:\n");
            for t in templates {
                println!("  {}@{}", t.id, t.version);
                if !t.name.is_empty() {
                    println!("    Name: {}", t.name);
                }
                if !t.description.is_empty() {
                    println!("    Description: {}", t.description);
                }
                println!("    Keywords: {}", t.keywords.join(", "));
                println!("    Required slots: {}", t.required_slots.join(", "));
                if !t.optional_slots.is_empty() {
                    println!("    Optional slots: {}", t.optional_slots.join(", "));
                }
                println!();
            }
            Ok(ExitCode::SUCCESS)
        }
        TemplateCommands::Show { id } => {
            let template = registry.get(&id).ok_or_else(|| {
                UpeError::Validation(ValidationError::MalformedRequest(format!(
                    "unknown template '{id}'"
                )))
            })?;
            let out = emit_jcs(template.as_ref()).context("Failed to emit template JSON")?;
            println!("{out}");
            Ok(ExitCode::SUCCESS)
        }
        TemplateCommands::Check { engine_version } => {
            let mut incompatible = 0usize;
            for t in registry.get_all() {
                match compat::check(&t, &engine_version) {
                    Compatibility::Compatible => println!("  ✓ {}", t.label()),
                    Compatibility::EngineTooOld { required } => {
                        incompatible += 1;
                        println!("  ✗ {} requires engine {required}", t.label());
                    }
                    Compatibility::Unparseable { value, reason } => {
                        incompatible += 1;
                        println!("  ✗ {} has unparseable version '{value}': {reason}", t.label());
                    }
                }
            }
            println!();
            if incompatible == 0 {
                println!("All templates compatible with engine {engine_version}");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{incompatible} template(s) incompatible with engine {engine_version}");
                Ok(ExitCode::INCOMPATIBLE)
            }
        }
    }
}
