use std::path::PathBuf;
use std::time::Duration;

use upe_utils::error::ConfigError;

use crate::model::{Config, ConfigSource};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use upe_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .max_concurrent(4)
    ///     .cache_ttl(Duration::from_secs(60))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.scheduler.max_concurrent, 4);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Fluent construction of a [`Config`] without files or environment.
///
/// Every value set here is attributed to `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    cache_capacity: Option<usize>,
    cache_ttl: Option<Duration>,
    max_goal_chars: Option<usize>,
    engine_version: Option<String>,
    max_concurrent: Option<usize>,
    default_max_attempts: Option<u32>,
    default_priority: Option<u8>,
    job_timeout: Option<Duration>,
    job_retention: Option<Duration>,
    max_retained_jobs: Option<usize>,
    manifest_dir: Option<PathBuf>,
    templates_dir: Option<PathBuf>,
    include_builtin: Option<bool>,
    verbose: Option<bool>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn max_goal_chars(mut self, chars: usize) -> Self {
        self.max_goal_chars = Some(chars);
        self
    }

    #[must_use]
    pub fn engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = Some(n);
        self
    }

    #[must_use]
    pub fn default_max_attempts(mut self, n: u32) -> Self {
        self.default_max_attempts = Some(n);
        self
    }

    #[must_use]
    pub fn default_priority(mut self, priority: u8) -> Self {
        self.default_priority = Some(priority);
        self
    }

    #[must_use]
    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = Some(retention);
        self
    }

    #[must_use]
    pub fn max_retained_jobs(mut self, n: usize) -> Self {
        self.max_retained_jobs = Some(n);
        self
    }

    #[must_use]
    pub fn manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn include_builtin(mut self, include: bool) -> Self {
        self.include_builtin = Some(include);
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is out of range.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let touched: [(bool, &str); 14] = [
            (self.cache_capacity.is_some(), "engine.cache_capacity"),
            (self.cache_ttl.is_some(), "engine.cache_ttl_secs"),
            (self.max_goal_chars.is_some(), "engine.max_goal_chars"),
            (self.engine_version.is_some(), "engine.engine_version"),
            (self.max_concurrent.is_some(), "scheduler.max_concurrent"),
            (self.default_max_attempts.is_some(), "scheduler.default_max_attempts"),
            (self.default_priority.is_some(), "scheduler.default_priority"),
            (self.job_timeout.is_some(), "scheduler.job_timeout_secs"),
            (self.job_retention.is_some(), "scheduler.job_retention_secs"),
            (self.max_retained_jobs.is_some(), "scheduler.max_retained_jobs"),
            (self.manifest_dir.is_some(), "storage.manifest_dir"),
            (self.templates_dir.is_some(), "templates.dir"),
            (self.include_builtin.is_some(), "templates.include_builtin"),
            (self.verbose.is_some(), "logging.verbose"),
        ];
        for (is_set, key) in touched {
            if is_set {
                config
                    .source_attribution
                    .insert(key.to_string(), ConfigSource::Programmatic);
            }
        }

        if let Some(v) = self.cache_capacity {
            config.engine.cache_capacity = v;
        }
        if let Some(v) = self.cache_ttl {
            config.engine.cache_ttl_secs = v.as_secs();
        }
        if let Some(v) = self.max_goal_chars {
            config.engine.max_goal_chars = v;
        }
        if let Some(v) = self.engine_version {
            config.engine.engine_version = v;
        }
        if let Some(v) = self.max_concurrent {
            config.scheduler.max_concurrent = v;
        }
        if let Some(v) = self.default_max_attempts {
            config.scheduler.default_max_attempts = v;
        }
        if let Some(v) = self.default_priority {
            config.scheduler.default_priority = v;
        }
        if let Some(v) = self.job_timeout {
            config.scheduler.job_timeout_secs = Some(v.as_secs());
        }
        if let Some(v) = self.job_retention {
            config.scheduler.job_retention_secs = v.as_secs();
        }
        if let Some(v) = self.max_retained_jobs {
            config.scheduler.max_retained_jobs = v;
        }
        if self.manifest_dir.is_some() {
            config.storage.manifest_dir = self.manifest_dir;
        }
        if self.templates_dir.is_some() {
            config.templates.dir = self.templates_dir;
        }
        if let Some(v) = self.include_builtin {
            config.templates.include_builtin = v;
        }
        if let Some(v) = self.verbose {
            config.logging.verbose = v;
        }

        config.validate()?;
        Ok(config)
    }
}
