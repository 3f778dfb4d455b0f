//! Command-line arguments.

use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "pixcache",
    version,
    about = "Load images through a memory, disk and network cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image URIs to load.
    #[arg(value_name = "URI")]
    pub uris: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Root directory for the disk cache.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Keep downloads in memory only.
    #[arg(long)]
    pub no_disk_cache: bool,

    /// Maximum concurrent loads.
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Requested width for downsampling (0 keeps full size).
    #[arg(long, default_value_t = 0)]
    pub width: u32,

    /// Requested height for downsampling (0 keeps full size).
    #[arg(long, default_value_t = 0)]
    pub height: u32,

    /// Treat the network as unavailable.
    #[arg(long)]
    pub offline: bool,

    /// Clear both caches before loading.
    #[arg(long)]
    pub clear: bool,
}
