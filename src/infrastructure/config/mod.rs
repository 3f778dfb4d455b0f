//! Loader configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{CacheParams, LoaderConfig, LogLevel, NetworkConfig, PoolConfig};
pub use args::CliArgs;
pub use storage::{ConfigError, ConfigStore};
