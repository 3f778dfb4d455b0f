//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction under a byte budget
//! - Disk caching for persistence
//! - Network fetching and sampled decoding
//! - The worker pool, result dispatcher and loading orchestrator

pub mod cache;
pub mod connectivity;
pub mod decoder;
pub mod disk_cache;
pub mod dispatcher;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod worker_pool;

pub use cache::ImageCache;
pub use connectivity::NetworkMonitor;
pub use decoder::{SampledDecoder, sample_size};
pub use disk_cache::{
    DEFAULT_MAX_CACHE_SIZE, DiskCacheState, DiskEditor, DiskImageCache, default_cache_root,
};
pub use dispatcher::{Delivery, DispatchStats, LoadResult, ResultDispatcher, ResultSender};
pub use http_fetcher::{HttpFetcher, IO_BUFFER_SIZE};
pub use loader::{BindOutcome, BindRequest, ImageLoader};
pub use memory_cache::{CacheStats, DEFAULT_MEMORY_BUDGET, MemoryImageCache};
pub use worker_pool::{DEFAULT_KEEP_ALIVE, WorkerPool, WorkerPoolConfig};
