//! Config command implementation
//!
//! Handles `upe config`.

use anyhow::{Context, Result};
use serde_json::json;

use upe_config::Config;
use upe_utils::canonicalization::emit_jcs;
use upe_utils::exit_codes::ExitCode;

pub fn execute_config_command(json: bool, config: &Config) -> Result<ExitCode> {
    let rows = config.effective_config();

    if json {
        let entries: Vec<_> = rows
            .iter()
            .map(|(key, value, source)| json!({"key": key, "value": value, "source": source}))
            .collect();
        let out = emit_jcs(&json!({
            "configPath": config.config_path.as_ref().map(|p| p.display().to_string()),
            "entries": entries,
        }))
        .context("Failed to emit config JSON")?;
        println!("{out}");
        return Ok(ExitCode::SUCCESS);
    }

    match &config.config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: <none>"),
    }
    println!();
    let width = rows.iter().map(|(k, _, _)| k.len()).max().unwrap_or(0);
    for (key, value, source) in &rows {
        println!("  {key:<width$}  {value}  [{source}]");
    }
    Ok(ExitCode::SUCCESS)
}
