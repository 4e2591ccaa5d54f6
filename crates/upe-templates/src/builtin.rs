//! Cartridges shipped with the crate

use anyhow::{Context, Result};

use crate::loader::parse_cartridge;
use crate::model::Template;
use crate::registry::TemplateRegistry;

/// (file name, TOML source) in registration order.
const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("board-deck.toml", include_str!("../cartridges/board-deck.toml")),
    ("exec-memo.toml", include_str!("../cartridges/exec-memo.toml")),
    (
        "research-brief.toml",
        include_str!("../cartridges/research-brief.toml"),
    ),
];

/// Parse all built-in cartridges.
pub fn builtin_templates() -> Result<Vec<Template>> {
    BUILTIN_SOURCES
        .iter()
        .map(|(name, source)| {
            parse_cartridge(source).with_context(|| format!("Built-in cartridge {name} is invalid"))
        })
        .collect()
}

/// Register every built-in cartridge into `registry`.
pub fn register_builtins(registry: &TemplateRegistry) -> Result<usize> {
    let templates = builtin_templates()?;
    let count = templates.len();
    for template in templates {
        let id = template.id.clone();
        registry
            .register(template)
            .with_context(|| format!("Failed to register built-in cartridge '{id}'"))?;
    }
    Ok(count)
}
