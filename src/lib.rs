//! Pixcache - asynchronous image loading through memory, disk and network tiers.
//!
//! Display targets are bound to image URIs on the UI thread. Misses are loaded
//! on a bounded worker pool and delivered back to the UI thread, where results
//! for targets that were rebound in the meantime are discarded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, connection state, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, fetchers, and configuration.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixcache";
