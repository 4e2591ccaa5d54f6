//! Wiring from a [`Config`] to a ready compiler and scheduler

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use upe_config::Config;
use upe_engine::{Compiler, CompilerOptions};
use upe_llm::Generators;
use upe_manifest::{FsManifestStore, InMemoryManifestStore, ManifestStore};
use upe_scheduler::{CompileJobHandler, JobScheduler, SchedulerOptions};
use upe_templates::TemplateRegistry;
use upe_templates::builtin::register_builtins;
use upe_templates::loader::register_dir;

/// Registry holding the built-in cartridges (unless disabled) followed by
/// the cartridges in `templates.dir`.
pub fn build_registry(config: &Config) -> Result<TemplateRegistry> {
    let registry = TemplateRegistry::new();
    if config.templates.include_builtin {
        let count = register_builtins(&registry)?;
        debug!(count, "registered built-in cartridges");
    }
    if let Some(dir) = &config.templates.dir {
        let count = register_dir(&registry, dir)
            .with_context(|| format!("Failed to load cartridges from {}", dir.display()))?;
        debug!(count, dir = %dir.display(), "registered cartridge directory");
    }
    Ok(registry)
}

/// Filesystem store when `storage.manifest_dir` is set, in-memory otherwise.
pub fn build_store(config: &Config) -> Result<Arc<dyn ManifestStore>> {
    match &config.storage.manifest_dir {
        Some(dir) => {
            let dir = Utf8PathBuf::from_path_buf(dir.clone()).map_err(|p| {
                anyhow::anyhow!("Manifest directory is not valid UTF-8: {}", p.display())
            })?;
            Ok(Arc::new(FsManifestStore::new(dir)))
        }
        None => Ok(Arc::new(InMemoryManifestStore::new())),
    }
}

pub fn build_compiler(config: &Config) -> Result<Arc<Compiler>> {
    let registry = build_registry(config)?;
    let store = build_store(config)?;
    info!(
        templates = registry.len(),
        engine_version = %config.engine.engine_version,
        "compiler ready"
    );
    Ok(Arc::new(Compiler::new(
        Arc::new(registry),
        store,
        CompilerOptions::from_config(config),
    )))
}

/// Scheduler running compile and generate jobs on the current runtime.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
#[must_use]
pub fn build_scheduler(
    compiler: Arc<Compiler>,
    generators: Generators,
    config: &Config,
) -> JobScheduler {
    let handler = Arc::new(CompileJobHandler::new(compiler, generators));
    JobScheduler::new(handler, SchedulerOptions::from_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_registered_by_default() {
        let config = Config::builder().build().unwrap();
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("board-deck").is_some());
    }

    #[test]
    fn test_cartridge_dir_extends_builtins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("release-notes.toml"),
            r#"
id = "release-notes"
version = "0.3.0"
keywords = ["release", "changelog"]
required_slots = ["version"]

[prompts]
system = "You write release notes."
user = "Release notes for {{version}}: {{goal}}"
"#,
        )
        .unwrap();

        let config = Config::builder()
            .templates_dir(dir.path())
            .build()
            .unwrap();
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.len(), 4);
        assert!(registry.get("release-notes").is_some());
    }

    #[test]
    fn test_builtins_can_be_disabled() {
        let config = Config::builder().include_builtin(false).build().unwrap();
        assert!(build_registry(&config).unwrap().is_empty());
    }

    #[test]
    fn test_manifest_dir_selects_fs_store() {
        let dir = TempDir::new().unwrap();
        let config = Config::builder()
            .manifest_dir(dir.path())
            .build()
            .unwrap();
        let compiler = build_compiler(&config).unwrap();

        let response = compiler.compile(
            upe_engine::CompileRequest::new("board deck for the offsite")
                .with_slot("purpose", "approve budget")
                .with_slot("audience", "board"),
        );
        assert!(response.is_ok());

        let run_id = &response.metadata.provenance.run_id;
        assert!(dir.path().join(format!("{run_id}.json")).exists());
    }
}
