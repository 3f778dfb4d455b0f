//! Infrastructure layer with adapters for caches, network and configuration.

/// Loader configuration.
pub mod config;
/// Image handling (caching, fetching, decoding, loading).
pub mod image;

pub use config::{CliArgs, ConfigError, ConfigStore, LoaderConfig, LogLevel};
pub use self::image::{
    BindOutcome, BindRequest, HttpFetcher, ImageCache, ImageLoader, NetworkMonitor,
    ResultDispatcher, SampledDecoder, WorkerPool, WorkerPoolConfig,
};
