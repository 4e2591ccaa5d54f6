use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Engine version reported in manifests unless overridden.
pub const DEFAULT_ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    ConfigFile(PathBuf),
    Cli,
    Programmatic,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::ConfigFile(path) => write!(f, "config file ({})", path.display()),
            Self::Cli => write!(f, "CLI"),
            Self::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// `[engine]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub max_goal_chars: usize,
    pub engine_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 512,
            cache_ttl_secs: 3600,
            max_goal_chars: 2000,
            engine_version: DEFAULT_ENGINE_VERSION.to_string(),
        }
    }
}

/// `[scheduler]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    pub default_max_attempts: u32,
    pub default_priority: u8,
    pub job_timeout_secs: Option<u64>,
    pub job_retention_secs: u64,
    pub max_retained_jobs: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_max_attempts: 3,
            default_priority: 5,
            job_timeout_secs: None,
            job_retention_secs: 3600,
            max_retained_jobs: 1000,
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Manifest directory; manifests stay in memory when unset
    pub manifest_dir: Option<PathBuf>,
}

/// `[templates]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatesConfig {
    pub dir: Option<PathBuf>,
    pub include_builtin: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: None,
            include_builtin: true,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub verbose: bool,
}

/// Effective configuration with per-key source attribution.
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub scheduler: SchedulerSettings,
    pub storage: StorageConfig,
    pub templates: TemplatesConfig,
    pub logging: LoggingConfig,
    pub source_attribution: HashMap<String, ConfigSource>,
    /// Config file that was loaded, if any
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut source_attribution = HashMap::new();
        for key in ATTRIBUTED_KEYS {
            source_attribution.insert((*key).to_string(), ConfigSource::Defaults);
        }
        Self {
            engine: EngineConfig::default(),
            scheduler: SchedulerSettings::default(),
            storage: StorageConfig::default(),
            templates: TemplatesConfig::default(),
            logging: LoggingConfig::default(),
            source_attribution,
            config_path: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.engine.cache_ttl_secs)
    }

    #[must_use]
    pub fn job_timeout(&self) -> Option<Duration> {
        self.scheduler.job_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.scheduler.job_retention_secs)
    }

    /// Source of a key, `Defaults` when never recorded.
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Defaults)
    }
}

/// Keys that carry source attribution, in display order.
pub const ATTRIBUTED_KEYS: &[&str] = &[
    "engine.cache_capacity",
    "engine.cache_ttl_secs",
    "engine.max_goal_chars",
    "engine.engine_version",
    "scheduler.max_concurrent",
    "scheduler.default_max_attempts",
    "scheduler.default_priority",
    "scheduler.job_timeout_secs",
    "scheduler.job_retention_secs",
    "scheduler.max_retained_jobs",
    "storage.manifest_dir",
    "templates.dir",
    "templates.include_builtin",
    "logging.verbose",
];

/// CLI overrides applied on top of file and default values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub manifest_dir: Option<PathBuf>,
    pub templates_dir: Option<PathBuf>,
    pub max_concurrent: Option<usize>,
}

/// On-disk TOML layout. Every field is optional so a file only states what
/// it overrides.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub engine: Option<TomlEngine>,
    pub scheduler: Option<TomlScheduler>,
    pub storage: Option<TomlStorage>,
    pub templates: Option<TomlTemplates>,
    pub logging: Option<TomlLogging>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlEngine {
    pub cache_capacity: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub max_goal_chars: Option<usize>,
    pub engine_version: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlScheduler {
    pub max_concurrent: Option<usize>,
    pub default_max_attempts: Option<u32>,
    pub default_priority: Option<u8>,
    pub job_timeout_secs: Option<u64>,
    pub job_retention_secs: Option<u64>,
    pub max_retained_jobs: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlStorage {
    pub manifest_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlTemplates {
    pub dir: Option<PathBuf>,
    pub include_builtin: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlLogging {
    pub verbose: Option<bool>,
}
