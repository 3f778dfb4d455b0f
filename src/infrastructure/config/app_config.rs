//! Loader configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::image::{WorkerPoolConfig, default_cache_root};

const APP_NAME: &str = "pixcache";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Smallest accepted memory fraction.
pub const MIN_MEMORY_FRACTION: f32 = 0.01;
/// Largest accepted memory fraction.
pub const MAX_MEMORY_FRACTION: f32 = 0.8;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache sizing and location.
    #[serde(default)]
    pub cache: CacheParams,

    /// Worker pool sizing.
    #[serde(default)]
    pub pool: PoolConfig,

    /// HTTP settings.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Cache sizing and location, forwarded to the memory and disk caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheParams {
    /// Fraction of `memory_ceiling_bytes` given to decoded images.
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f32,

    /// Memory the fraction is taken from.
    #[serde(default = "default_memory_ceiling")]
    pub memory_ceiling_bytes: u64,

    /// Root directory for the disk cache. Defaults to the platform cache dir.
    #[serde(default)]
    pub disk_dir: Option<PathBuf>,

    /// Subdirectory holding this cache's entries.
    #[serde(default = "default_disk_cache_name")]
    pub disk_cache_name: String,

    /// Disk budget in bytes.
    #[serde(default = "default_disk_cache_size")]
    pub disk_cache_size: u64,

    /// Persist downloads to disk.
    #[serde(default = "default_true")]
    pub disk_cache_enabled: bool,
}

impl CacheParams {
    /// Creates parameters for a named cache directory with default sizes.
    #[must_use]
    pub fn named(disk_cache_name: impl Into<String>) -> Self {
        Self {
            disk_cache_name: disk_cache_name.into(),
            ..Self::default()
        }
    }

    /// Memory fraction clamped to the accepted range.
    #[must_use]
    pub fn effective_memory_fraction(&self) -> f32 {
        if self.memory_fraction.is_nan() {
            return default_memory_fraction();
        }
        self.memory_fraction
            .clamp(MIN_MEMORY_FRACTION, MAX_MEMORY_FRACTION)
    }

    /// Byte budget for the memory cache.
    #[must_use]
    /// Byte budget for the memory tier.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn memory_budget_bytes(&self) -> u64 {
        (self.memory_ceiling_bytes as f64 * f64::from(self.effective_memory_fraction())) as u64
    }

    /// Directory holding the disk entries.
    #[must_use]
    pub fn disk_cache_dir(&self) -> PathBuf {
        self.disk_dir
            .clone()
            .unwrap_or_else(default_cache_root)
            .join(&self.disk_cache_name)
    }
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            memory_fraction: default_memory_fraction(),
            memory_ceiling_bytes: default_memory_ceiling(),
            disk_dir: None,
            disk_cache_name: default_disk_cache_name(),
            disk_cache_size: default_disk_cache_size(),
            disk_cache_enabled: true,
        }
    }
}

/// Worker pool sizing; absent sizes derive from available parallelism.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Threads kept alive while idle.
    #[serde(default)]
    pub core_size: Option<usize>,

    /// Maximum concurrently running loads.
    #[serde(default)]
    pub max_size: Option<usize>,

    /// Idle keep-alive in seconds for threads above the core size.
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,
}

impl PoolConfig {
    /// Resolves to a concrete pool configuration.
    #[must_use]
    pub fn to_worker_pool_config(&self) -> WorkerPoolConfig {
        let defaults = WorkerPoolConfig::default();
        WorkerPoolConfig {
            core_size: self.core_size.unwrap_or(defaults.core_size),
            max_size: self.max_size.unwrap_or(defaults.max_size),
            keep_alive: self
                .keep_alive_secs
                .map_or(defaults.keep_alive, Duration::from_secs),
        }
        .normalized()
    }
}

/// HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl NetworkConfig {
    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

const fn default_memory_fraction() -> f32 {
    0.25
}

const fn default_memory_ceiling() -> u64 {
    256 * 1024 * 1024
}

fn default_disk_cache_name() -> String {
    "thumbs".to_string()
}

const fn default_disk_cache_size() -> u64 {
    crate::infrastructure::image::DEFAULT_MAX_CACHE_SIZE
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", APP_NAME, crate::VERSION)
}

fn default_true() -> bool {
    true
}

use super::args::CliArgs;

impl LoaderConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.disk_dir = Some(cache_dir.clone());
        }
        if args.no_disk_cache {
            self.cache.disk_cache_enabled = false;
        }
        if let Some(max_workers) = args.max_workers {
            self.pool.max_size = Some(max_workers);
        }
        if let Some(timeout) = args.timeout_secs {
            self.network.timeout_secs = timeout;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns the log file path; `None` logs to stderr.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone()
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            log_level: LogLevel::Info,
            cache: CacheParams::default(),
            pool: PoolConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}
