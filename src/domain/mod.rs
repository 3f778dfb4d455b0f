//! Domain layer with core entities and port definitions.

/// Connection status definitions.
pub mod connection;
/// Entity definitions.
pub mod entities;
/// Port definitions.
pub mod ports;

pub use connection::ConnectionStatus;
pub use entities::{
    BindingState, CacheKey, DisplayTarget, ImageCallback, ImageSlot, ImageSource, KeyHasher,
    LoadedImage,
};
pub use ports::{CacheError, CacheResult, ConnectivityPort, ImageDecoder, NetworkFetcher};
