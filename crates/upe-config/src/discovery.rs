use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::{CliArgs, Config, ConfigSource, TomlConfig};

/// Directory searched for upward from the working directory.
pub const CONFIG_DIR_NAME: &str = ".upe";
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable naming a directory that holds `config.toml`.
pub const HOME_ENV_VAR: &str = "UPE_HOME";

fn apply<T>(
    target: &mut T,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(v) = value {
        *target = v;
        attribution.insert(key.to_string(), source.clone());
    }
}

/// Relative paths in a config file are relative to the file's directory.
fn resolve_path(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// The file is `--config` when given, otherwise `$UPE_HOME/config.toml`
    /// when that exists, otherwise the nearest `.upe/config.toml` found by
    /// walking up from the current directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        if cli_args.config_path.is_none()
            && let Some(home) = env::var_os(HOME_ENV_VAR)
        {
            let candidate = PathBuf::from(home).join(CONFIG_FILE_NAME);
            if candidate.exists() {
                debug!(path = %candidate.display(), "using config from {HOME_ENV_VAR}");
                let mut args = cli_args.clone();
                args.config_path = Some(candidate);
                return Self::discover_from(&start_dir, &args);
            }
        }
        Self::discover_from(&start_dir, cli_args)
    }

    /// Path-driven variant of [`Config::discover`] that ignores the
    /// environment, used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut config = Self::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            config.apply_file(file_config, path);
            config.config_path = Some(path.clone());
        }

        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    /// Walk up from `start_dir` looking for `.upe/config.toml`, stopping at a
    /// repository root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists() || current_dir.join(".hg").exists() {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))
    }

    fn apply_file(&mut self, file: TomlConfig, path: &Path) {
        let source = ConfigSource::ConfigFile(path.to_path_buf());
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let attr = &mut self.source_attribution;

        if let Some(e) = file.engine {
            apply(
                &mut self.engine.cache_capacity,
                e.cache_capacity,
                "engine.cache_capacity",
                &source,
                attr,
            );
            apply(
                &mut self.engine.cache_ttl_secs,
                e.cache_ttl_secs,
                "engine.cache_ttl_secs",
                &source,
                attr,
            );
            apply(
                &mut self.engine.max_goal_chars,
                e.max_goal_chars,
                "engine.max_goal_chars",
                &source,
                attr,
            );
            apply(
                &mut self.engine.engine_version,
                e.engine_version,
                "engine.engine_version",
                &source,
                attr,
            );
        }

        if let Some(s) = file.scheduler {
            apply(
                &mut self.scheduler.max_concurrent,
                s.max_concurrent,
                "scheduler.max_concurrent",
                &source,
                attr,
            );
            apply(
                &mut self.scheduler.default_max_attempts,
                s.default_max_attempts,
                "scheduler.default_max_attempts",
                &source,
                attr,
            );
            apply(
                &mut self.scheduler.default_priority,
                s.default_priority,
                "scheduler.default_priority",
                &source,
                attr,
            );
            apply(
                &mut self.scheduler.job_timeout_secs,
                s.job_timeout_secs.map(Some),
                "scheduler.job_timeout_secs",
                &source,
                attr,
            );
            apply(
                &mut self.scheduler.job_retention_secs,
                s.job_retention_secs,
                "scheduler.job_retention_secs",
                &source,
                attr,
            );
            apply(
                &mut self.scheduler.max_retained_jobs,
                s.max_retained_jobs,
                "scheduler.max_retained_jobs",
                &source,
                attr,
            );
        }

        if let Some(st) = file.storage {
            let dir = st.manifest_dir.map(|p| Some(resolve_path(base, p)));
            apply(&mut self.storage.manifest_dir, dir, "storage.manifest_dir", &source, attr);
        }

        if let Some(t) = file.templates {
            let dir = t.dir.map(|p| Some(resolve_path(base, p)));
            apply(&mut self.templates.dir, dir, "templates.dir", &source, attr);
            apply(
                &mut self.templates.include_builtin,
                t.include_builtin,
                "templates.include_builtin",
                &source,
                attr,
            );
        }

        if let Some(l) = file.logging {
            apply(&mut self.logging.verbose, l.verbose, "logging.verbose", &source, attr);
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let source = ConfigSource::Cli;
        let attr = &mut self.source_attribution;
        apply(&mut self.logging.verbose, cli.verbose, "logging.verbose", &source, attr);
        apply(
            &mut self.storage.manifest_dir,
            cli.manifest_dir.clone().map(Some),
            "storage.manifest_dir",
            &source,
            attr,
        );
        apply(
            &mut self.templates.dir,
            cli.templates_dir.clone().map(Some),
            "templates.dir",
            &source,
            attr,
        );
        apply(
            &mut self.scheduler.max_concurrent,
            cli.max_concurrent,
            "scheduler.max_concurrent",
            &source,
            attr,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_when_no_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
        assert!(config.config_path.is_none());
        assert_eq!(config.scheduler.max_concurrent, 3);
        assert_eq!(config.source_of("scheduler.max_concurrent"), ConfigSource::Defaults);
    }

    #[test]
    fn test_upward_discovery_and_attribution() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let path = write_config(
            temp.path(),
            "[scheduler]\nmax_concurrent = 5\n\n[storage]\nmanifest_dir = \"runs\"\n",
        );
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.scheduler.max_concurrent, 5);
        assert_eq!(
            config.source_of("scheduler.max_concurrent"),
            ConfigSource::ConfigFile(path.clone())
        );
        assert_eq!(
            config.storage.manifest_dir,
            Some(temp.path().join(CONFIG_DIR_NAME).join("runs"))
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[scheduler]\nmax_concurrent = 5\n");
        let cli = CliArgs {
            max_concurrent: Some(8),
            verbose: Some(true),
            ..CliArgs::default()
        };

        let config = Config::discover_from(temp.path(), &cli).unwrap();
        assert_eq!(config.scheduler.max_concurrent, 8);
        assert!(config.logging.verbose);
        assert_eq!(config.source_of("scheduler.max_concurrent"), ConfigSource::Cli);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[engine]\nturbo = true\n");
        assert!(Config::discover_from(temp.path(), &CliArgs::default()).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[scheduler]\ndefault_priority = 11\n");
        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        assert!(format!("{err:#}").contains("default_priority"));
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };
        assert!(Config::discover_from(temp.path(), &cli).is_err());
    }
}
