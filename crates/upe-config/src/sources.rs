use crate::model::{ATTRIBUTED_KEYS, Config, ConfigSource};

fn stable_source_label(source: &ConfigSource) -> &'static str {
    match source {
        ConfigSource::Cli => "cli",
        ConfigSource::ConfigFile(_) => "config",
        ConfigSource::Programmatic => "programmatic",
        ConfigSource::Defaults => "default",
    }
}

fn display_path(path: Option<&std::path::PathBuf>) -> String {
    path.map_or_else(|| "<unset>".to_string(), |p| p.display().to_string())
}

impl Config {
    /// Effective configuration as `(key, value, source)` rows in a stable order.
    #[must_use]
    pub fn effective_config(&self) -> Vec<(String, String, String)> {
        ATTRIBUTED_KEYS
            .iter()
            .map(|key| {
                let value = self.display_value(key);
                let source = stable_source_label(&self.source_of(key)).to_string();
                ((*key).to_string(), value, source)
            })
            .collect()
    }

    fn display_value(&self, key: &str) -> String {
        match key {
            "engine.cache_capacity" => self.engine.cache_capacity.to_string(),
            "engine.cache_ttl_secs" => self.engine.cache_ttl_secs.to_string(),
            "engine.max_goal_chars" => self.engine.max_goal_chars.to_string(),
            "engine.engine_version" => self.engine.engine_version.clone(),
            "scheduler.max_concurrent" => self.scheduler.max_concurrent.to_string(),
            "scheduler.default_max_attempts" => self.scheduler.default_max_attempts.to_string(),
            "scheduler.default_priority" => self.scheduler.default_priority.to_string(),
            "scheduler.job_timeout_secs" => self
                .scheduler
                .job_timeout_secs
                .map_or_else(|| "<none>".to_string(), |s| s.to_string()),
            "scheduler.job_retention_secs" => self.scheduler.job_retention_secs.to_string(),
            "scheduler.max_retained_jobs" => self.scheduler.max_retained_jobs.to_string(),
            "storage.manifest_dir" => display_path(self.storage.manifest_dir.as_ref()),
            "templates.dir" => display_path(self.templates.dir.as_ref()),
            "templates.include_builtin" => self.templates.include_builtin.to_string(),
            "logging.verbose" => self.logging.verbose.to_string(),
            _ => String::new(),
        }
    }
}
