use upe_utils::error::ConfigError;

use crate::model::Config;

/// Inclusive job priority range.
pub const PRIORITY_RANGE: (u8, u8) = (1, 10);

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        if e.cache_capacity == 0 {
            return Err(invalid("engine.cache_capacity", "must be greater than 0"));
        }
        if e.cache_ttl_secs == 0 {
            return Err(invalid("engine.cache_ttl_secs", "must be greater than 0"));
        }
        if e.max_goal_chars == 0 {
            return Err(invalid("engine.max_goal_chars", "must be greater than 0"));
        }
        if let Err(err) = semver::Version::parse(&e.engine_version) {
            return Err(invalid(
                "engine.engine_version",
                format!("'{}' is not a semantic version ({err})", e.engine_version),
            ));
        }

        let s = &self.scheduler;
        if s.max_concurrent == 0 {
            return Err(invalid("scheduler.max_concurrent", "must be at least 1"));
        }
        if s.max_concurrent > 256 {
            return Err(invalid("scheduler.max_concurrent", "exceeds maximum of 256"));
        }
        if s.default_max_attempts == 0 {
            return Err(invalid("scheduler.default_max_attempts", "must be at least 1"));
        }
        let (lo, hi) = PRIORITY_RANGE;
        if !(lo..=hi).contains(&s.default_priority) {
            return Err(invalid(
                "scheduler.default_priority",
                format!("{} is outside {lo}-{hi}", s.default_priority),
            ));
        }
        if s.job_timeout_secs == Some(0) {
            return Err(invalid("scheduler.job_timeout_secs", "must be greater than 0"));
        }
        if s.job_retention_secs == 0 {
            return Err(invalid("scheduler.job_retention_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.scheduler.max_concurrent = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "scheduler.max_concurrent"
        ));
    }

    #[test]
    fn test_rejects_priority_out_of_range() {
        let mut config = Config::default();
        config.scheduler.default_priority = 0;
        assert!(config.validate().is_err());
        config.scheduler.default_priority = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_semver_engine_version() {
        let mut config = Config::default();
        config.engine.engine_version = "v2".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::default();
        config.scheduler.job_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
