mod image_cache_port;
mod network_port;

pub use image_cache_port::{CacheError, CacheResult, ImageDecoder};
pub use network_port::{ConnectivityPort, NetworkFetcher};
