//! CLI argument definitions and parsing structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use upe_templates::{Mode, SlotValue};

/// upe - deterministic prompt compilation with provenance manifests
#[derive(Parser, Debug)]
#[command(name = "upe")]
#[command(about = "Compile goals into deterministic prompts with provenance manifests")]
#[command(long_about = r#"
upe selects a prompt template (cartridge) for a goal, checks the supplied
slot values, and renders a prompt with mode-adjusted determinism settings.
Every compile writes a run manifest.

EXAMPLES:
  # Compile a goal with two slots
  upe compile "Q3 board deck" --slot purpose="approve hiring plan" --slot audience=board

  # Precision mode with a pinned seed, JSON output
  upe compile "exec memo on vendor choice" --mode precision --seed 7 --json

  # Run a batch of jobs through the scheduler
  upe batch jobs.json --max-concurrent 3

  # Inspect cartridges and manifests
  upe templates list
  upe templates check 1.0.0
  upe manifest show <run-id> --manifest-dir .upe/manifests

CONFIGURATION:
  Precedence: CLI flags > config file > defaults
  The config file is --config, $UPE_HOME/config.toml, or the nearest
  .upe/config.toml found upward from the working directory.

MODES:
  precision (proof, yafa, strict)   lower temperature, pinned seed
  standard  (turbo, default)        small temperature raise
  creative  (mentor, ms, explore)   larger temperature raise
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for run manifests (kept in memory when unset)
    #[arg(long, global = true)]
    pub manifest_dir: Option<PathBuf>,

    /// Additional cartridge directory
    #[arg(long, global = true)]
    pub templates_dir: Option<PathBuf>,

    /// Maximum concurrently running jobs
    #[arg(long, global = true)]
    pub max_concurrent: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a goal into a prompt
    Compile {
        /// What the prompt should achieve
        goal: String,

        /// Compilation mode (precision, standard, creative or an alias)
        #[arg(long, default_value = "standard", value_parser = parse_mode)]
        mode: Mode,

        /// Slot value as key=value (repeatable)
        #[arg(long = "slot", value_parser = parse_slot)]
        slots: Vec<(String, SlotValue)>,

        /// Caller-supplied request id (generated when omitted)
        #[arg(long)]
        request_id: Option<String>,

        /// Skip the result cache lookup
        #[arg(long)]
        bypass_cache: bool,

        /// Seed override used in precision mode
        #[arg(long)]
        seed: Option<u64>,

        /// Output the response as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect registered cartridges
    #[command(subcommand)]
    Templates(TemplateCommands),

    /// Inspect run manifests
    #[command(subcommand)]
    Manifest(ManifestCommands),

    /// Run a JSON file of jobs through the scheduler
    Batch {
        /// JSON array of {"type", "request", "priority", "maxAttempts"}
        file: PathBuf,

        /// Output job statuses and stats as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where each value came from
    Config {
        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// List registered cartridges
    List,
    /// Show one cartridge in full
    Show {
        /// Template id
        id: String,
    },
    /// Check every cartridge against an engine version
    Check {
        /// Engine version (semver)
        engine_version: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ManifestCommands {
    /// Print a stored manifest
    Show {
        /// Run id from a compile response
        run_id: String,
    },
    /// List stored manifests, oldest first
    List,
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    Mode::parse(raw).map_err(|e| e.to_string())
}

/// Parse `key=value`; the value may itself contain `=`.
pub(crate) fn parse_slot(raw: &str) -> Result<(String, SlotValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("slot name is empty in '{raw}'"));
    }
    Ok((key.to_string(), SlotValue::infer(value)))
}
