//! Configuration for upe
//!
//! Values resolve with precedence CLI > config file > defaults, and every
//! key records where its value came from.

mod builder;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, HOME_ENV_VAR};
pub use model::{
    ATTRIBUTED_KEYS, CliArgs, Config, ConfigSource, DEFAULT_ENGINE_VERSION, EngineConfig,
    LoggingConfig, SchedulerSettings, StorageConfig, TemplatesConfig,
};
pub use validation::PRIORITY_RANGE;
