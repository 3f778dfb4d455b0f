//! Port definitions for image caching and decoding.

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while producing an image from one tier.
///
/// None of these escape the loader: each is turned into a miss for the tier
/// where it happened.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Image not found in cache.
    #[error("Image not found: {0}")]
    NotFound(String),
    /// Failed to decode image.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Network error during download.
    #[error("Network error: {0}")]
    NetworkError(String),
    /// No usable network connection.
    #[error("Network unavailable")]
    Offline,
    /// Server answered with a non-success status.
    #[error("HTTP {status}")]
    HttpStatus {
        /// Numeric status code.
        status: u16,
    },
    /// Disk cache is not ready (uninitialized, failed, or closed).
    #[error("Disk cache unavailable")]
    Unavailable,
    /// Another edit for the same key has not finished.
    #[error("Edit already in progress for {0}")]
    EditInProgress(String),
    /// Worker pool could not run the task.
    #[error("Worker pool error: {0}")]
    PoolError(String),
}

impl CacheError {
    /// Returns whether the error came from the network tier.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::Offline | Self::HttpStatus { .. }
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Port for turning encoded bytes into a decoded image.
pub trait ImageDecoder: Send + Sync {
    /// Decodes `bytes`, downsampled toward the requested size when both
    /// dimensions are non-zero.
    ///
    /// # Errors
    /// Returns `CacheError::DecodeError` for corrupt or unsupported data.
    fn decode(
        &self,
        bytes: &[u8],
        requested_width: u32,
        requested_height: u32,
    ) -> CacheResult<image::DynamicImage>;
}
