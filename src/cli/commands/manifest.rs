//! Manifest command implementation
//!
//! Handles `upe manifest` subcommands. Manifests only outlive the process
//! when `storage.manifest_dir` (or `--manifest-dir`) is set.

use anyhow::{Context, Result, bail};

use upe_config::Config;
use upe_utils::canonicalization::emit_jcs;
use upe_utils::error::{ConfigError, UpeError};
use upe_utils::exit_codes::ExitCode;

use crate::cli::args::ManifestCommands;
use crate::setup::build_store;

pub fn execute_manifest_command(cmd: ManifestCommands, config: &Config) -> Result<ExitCode> {
    if config.storage.manifest_dir.is_none() {
        return Err(UpeError::Config(ConfigError::InvalidValue {
            key: "storage.manifest_dir".to_string(),
            value: "<unset>; pass --manifest-dir or set [storage] manifest_dir".to_string(),
        })
        .into());
    }
    let store = build_store(config)?;

    match cmd {
        ManifestCommands::Show { run_id } => {
            let Some(manifest) = store.get(&run_id).map_err(UpeError::from)? else {
                bail!("No manifest found for run {run_id}");
            };
            let out = emit_jcs(&manifest).context("Failed to emit manifest JSON")?;
            println!("{out}");
        }
        ManifestCommands::List => {
            let manifests = store.list().map_err(UpeError::from)?;
            if manifests.is_empty() {
                println!("No manifests stored.");
            }
            for m in manifests {
                println!(
                    "{}  {}  {:<6}  {}@{}",
                    m.created_at.to_rfc3339(),
                    m.run_id,
                    m.status.as_str(),
                    m.template.id,
                    m.template.version
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
