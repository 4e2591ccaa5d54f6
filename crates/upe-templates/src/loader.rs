//! TOML cartridge loading

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::Template;
use crate::registry::TemplateRegistry;

/// File extension recognized as a cartridge.
pub const CARTRIDGE_EXTENSION: &str = "toml";

/// Parse a single cartridge from TOML text and validate it.
pub fn parse_cartridge(content: &str) -> Result<Template> {
    let template: Template =
        toml::from_str(content).with_context(|| "Failed to parse cartridge TOML")?;
    template
        .validate()
        .with_context(|| format!("Cartridge {} failed validation", template.label()))?;
    Ok(template)
}

/// Read and parse a cartridge file.
pub fn load_cartridge(path: &Path) -> Result<Template> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read cartridge: {}", path.display()))?;
    parse_cartridge(&content).with_context(|| format!("Invalid cartridge: {}", path.display()))
}

/// Load every `*.toml` cartridge in `dir`, sorted by file name.
///
/// Sorting makes registration order, and therefore detector tie-breaks,
/// independent of directory iteration order.
pub fn load_dir(dir: &Path) -> Result<Vec<Template>> {
    if !dir.is_dir() {
        bail!("Cartridge directory not found: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list cartridge directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == CARTRIDGE_EXTENSION))
        .collect();
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in &paths {
        let template = load_cartridge(path)?;
        debug!(path = %path.display(), template = %template.label(), "loaded cartridge");
        templates.push(template);
    }
    Ok(templates)
}

/// Load `dir` into `registry`, rejecting ids that are already registered.
///
/// Returns the number of templates registered.
pub fn register_dir(registry: &TemplateRegistry, dir: &Path) -> Result<usize> {
    let templates = load_dir(dir)?;
    let count = templates.len();
    for template in templates {
        let label = template.label();
        registry
            .register(template)
            .with_context(|| format!("Failed to register cartridge {label}"))?;
    }
    Ok(count)
}
