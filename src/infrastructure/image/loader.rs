//! Image loading orchestrator.
//!
//! Implements a three-tier cache: Memory -> Disk -> Network. Binding happens on
//! the UI thread; misses run as one task each on the [`WorkerPool`] and come
//! back through the [`ResultDispatcher`](super::ResultDispatcher).

use std::sync::{Arc, Weak};

use image::DynamicImage;
use tracing::{debug, error, trace, warn};

use crate::domain::entities::{CacheKey, DisplayTarget, ImageCallback, ImageSource, LoadedImage};
use crate::domain::ports::{CacheError, CacheResult, ImageDecoder, NetworkFetcher};

use super::cache::ImageCache;
use super::dispatcher::{LoadResult, ResultSender, apply};
use super::worker_pool::WorkerPool;

/// A bind call: which URI to show and how to show it.
#[derive(Clone)]
pub struct BindRequest {
    /// Source URI.
    pub uri: String,
    /// Target width for downsampling, 0 for full size.
    pub requested_width: u32,
    /// Target height for downsampling, 0 for full size.
    pub requested_height: u32,
    /// Called instead of assigning the image to the target.
    pub callback: Option<ImageCallback>,
}

impl std::fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindRequest")
            .field("uri", &self.uri)
            .field("requested_width", &self.requested_width)
            .field("requested_height", &self.requested_height)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl BindRequest {
    /// Full-size request for `uri` without a callback.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            requested_width: 0,
            requested_height: 0,
            callback: None,
        }
    }

    /// Downsample to roughly `width` x `height`.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.requested_width = width;
        self.requested_height = height;
        self
    }

    /// Hand the result to `callback` instead of the target.
    #[must_use]
    pub fn with_callback(mut self, callback: ImageCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// How a bind was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Memory hit, already shown.
    Immediate,
    /// Queued on the worker pool; the result arrives through the dispatcher.
    Queued,
}

/// What the disk probe found before the network step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiskEntry {
    Absent,
    /// Present but unreadable or undecodable.
    Unusable,
}

/// State shared with load tasks. Holds no reference to the pool so a task
/// never ends up owning the runtime it runs on.
struct LoaderInner {
    cache: Arc<ImageCache>,
    fetcher: Arc<dyn NetworkFetcher>,
    decoder: Arc<dyn ImageDecoder>,
    results: ResultSender,
}

/// Orchestrates image loading from memory, disk, and network.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
    pool: Arc<WorkerPool>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("cache", &self.inner.cache)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader over a shared cache and pool. Results are posted
    /// through `results` to the dispatcher on the UI thread.
    #[must_use]
    pub fn new(
        cache: Arc<ImageCache>,
        pool: Arc<WorkerPool>,
        fetcher: Arc<dyn NetworkFetcher>,
        decoder: Arc<dyn ImageDecoder>,
        results: ResultSender,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                cache,
                fetcher,
                decoder,
                results,
            }),
            pool,
        }
    }

    /// Shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.inner.cache
    }

    /// Shows `uri` on `target` at full size.
    pub fn bind<T: DisplayTarget + 'static>(&self, uri: &str, target: &Arc<T>) -> BindOutcome {
        self.bind_request(BindRequest::new(uri), target)
    }

    /// Hands the image for `uri` to `callback` instead of assigning it.
    pub fn bind_with_callback<T: DisplayTarget + 'static>(
        &self,
        uri: &str,
        target: &Arc<T>,
        callback: ImageCallback,
    ) -> BindOutcome {
        self.bind_request(BindRequest::new(uri).with_callback(callback), target)
    }

    /// Binds `target` to `request.uri` and shows the image once available.
    ///
    /// Call from the UI thread. The binding is recorded before anything is
    /// queued, so results of earlier binds for the same target are discarded.
    pub fn bind_request<T: DisplayTarget + 'static>(
        &self,
        request: BindRequest,
        target: &Arc<T>,
    ) -> BindOutcome {
        let BindRequest {
            uri,
            requested_width,
            requested_height,
            callback,
        } = request;

        target.binding().bind(&uri);

        let key = CacheKey::from_uri(&uri);
        if let Some(image) = self.inner.cache.memory().get(&key) {
            trace!(uri = %uri, key = %key, "Memory cache hit at bind");
            let loaded = LoadedImage {
                key,
                image,
                source: ImageSource::MemoryCache,
            };
            apply(target.as_ref(), Some(loaded), callback.as_ref());
            return BindOutcome::Immediate;
        }

        let weak: Weak<T> = Arc::downgrade(target);
        let weak: Weak<dyn DisplayTarget> = weak;
        let inner = self.inner.clone();
        trace!(uri = %uri, queued = self.pool.queued_count(), "Queueing load");
        drop(self.pool.submit(async move {
            let image = inner.load(&uri, requested_width, requested_height).await;
            inner.results.post(LoadResult {
                target: weak,
                uri,
                image,
                callback,
            });
        }));
        BindOutcome::Queued
    }

    /// Loads `uri` through every tier. For callers already off the UI thread.
    pub async fn load(
        &self,
        uri: &str,
        requested_width: u32,
        requested_height: u32,
    ) -> Option<LoadedImage> {
        self.inner.load(uri, requested_width, requested_height).await
    }

    /// Loads `uri` on the pool and blocks until it finishes.
    ///
    /// Must not be called from inside an async context.
    pub fn load_synchronously(
        &self,
        uri: &str,
        requested_width: u32,
        requested_height: u32,
    ) -> Option<LoadedImage> {
        if self.inner.results.is_ui_thread() {
            warn!(uri = %uri, "Synchronous load called on the UI thread");
        }
        let inner = self.inner.clone();
        let uri = uri.to_owned();
        match self
            .pool
            .run(async move { inner.load(&uri, requested_width, requested_height).await })
        {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Synchronous load did not complete");
                None
            }
        }
    }

    /// Empties the memory and disk tiers.
    pub fn clear_cache(&self) {
        let cache = self.inner.cache.clone();
        self.pool.block_on(async move { cache.clear().await });
    }

    /// Flushes the disk tier.
    pub fn flush_cache(&self) {
        let cache = self.inner.cache.clone();
        self.pool.block_on(async move { cache.flush().await });
    }

    /// Flushes and closes the disk tier. Loads keep working from memory and network.
    pub fn close_cache(&self) {
        let cache = self.inner.cache.clone();
        self.pool.block_on(async move { cache.close().await });
    }
}

impl LoaderInner {
    async fn load(
        &self,
        uri: &str,
        requested_width: u32,
        requested_height: u32,
    ) -> Option<LoadedImage> {
        let on_ui_thread = self.results.is_ui_thread();
        if on_ui_thread {
            error!(uri = %uri, "Image load running on the UI thread");
        }
        debug_assert!(!on_ui_thread, "image loads must not run on the UI thread");

        let key = CacheKey::from_uri(uri);
        let loaded = |image, source| {
            Some(LoadedImage {
                key: key.clone(),
                image,
                source,
            })
        };

        if let Some(image) = self.cache.memory().get(&key) {
            trace!(key = %key, "Memory cache hit");
            return loaded(image, ImageSource::MemoryCache);
        }

        let disk = self.cache.disk();
        if disk.is_ready() {
            let entry = match self.load_from_disk(&key, requested_width, requested_height).await {
                Ok(Some(image)) => {
                    trace!(key = %key, "Disk cache hit");
                    return loaded(image, ImageSource::DiskCache);
                }
                Ok(None) => {
                    trace!(key = %key, "Disk cache miss");
                    DiskEntry::Absent
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Disk cache entry unusable, refetching");
                    DiskEntry::Unusable
                }
            };

            match self
                .fetch_through_disk(uri, &key, entry, requested_width, requested_height)
                .await
            {
                Ok(image) => {
                    debug!(uri = %uri, key = %key, source = "network", "Image loaded");
                    return loaded(image, ImageSource::Network);
                }
                Err(CacheError::Unavailable | CacheError::EditInProgress(_)) => {
                    debug!(key = %key, "Disk cache not writable, downloading directly");
                }
                Err(e) => {
                    Self::log_failure(uri, &e);
                    return None;
                }
            }
        } else {
            trace!(key = %key, state = %disk.state(), "Disk cache not ready, network only");
        }

        match self
            .download_direct(uri, &key, requested_width, requested_height)
            .await
        {
            Ok(image) => {
                debug!(uri = %uri, key = %key, source = "network", "Image loaded without disk cache");
                loaded(image, ImageSource::Network)
            }
            Err(e) => {
                Self::log_failure(uri, &e);
                None
            }
        }
    }

    async fn load_from_disk(
        &self,
        key: &CacheKey,
        requested_width: u32,
        requested_height: u32,
    ) -> CacheResult<Option<Arc<DynamicImage>>> {
        let Some(bytes) = self.cache.disk().get_bytes(key).await? else {
            return Ok(None);
        };
        let image = self.decode(bytes, requested_width, requested_height).await?;
        self.cache.memory().put(key.clone(), image.clone());
        Ok(Some(image))
    }

    /// Downloads into the disk tier under the edit lock, then decodes the
    /// stored bytes.
    ///
    /// An entry another task committed while this one waited for the lock is
    /// reused; an `Unusable` entry is overwritten. The bytes are read back
    /// before the budget is enforced, so an entry larger than the whole disk
    /// budget is still shown once.
    async fn fetch_through_disk(
        &self,
        uri: &str,
        key: &CacheKey,
        entry: DiskEntry,
        requested_width: u32,
        requested_height: u32,
    ) -> CacheResult<Arc<DynamicImage>> {
        let disk = self.cache.disk();
        let bytes = {
            let _edits = self.cache.lock_edits().await;
            let reuse = entry == DiskEntry::Absent && disk.contains(key).await;
            if reuse {
                trace!(key = %key, "Entry committed by another task");
                disk.get_bytes(key).await?
            } else {
                let Some(mut editor) = disk.edit(key).await? else {
                    return Err(CacheError::EditInProgress(key.to_string()));
                };
                match self.fetcher.fetch(uri, &mut editor).await {
                    Ok(written) => {
                        trace!(key = %key, bytes = written, "Downloaded into disk cache");
                        editor.commit().await?;
                    }
                    Err(e) => {
                        editor.abort().await;
                        return Err(e);
                    }
                }
                let bytes = disk.get_bytes(key).await?;
                if let Err(e) = disk.flush().await {
                    warn!(error = %e, "Failed to flush disk cache");
                }
                bytes
            }
        };

        let Some(bytes) = bytes else {
            return Err(CacheError::NotFound(key.to_string()));
        };
        let image = self.decode(bytes, requested_width, requested_height).await?;
        self.cache.memory().put(key.clone(), image.clone());
        Ok(image)
    }

    async fn download_direct(
        &self,
        uri: &str,
        key: &CacheKey,
        requested_width: u32,
        requested_height: u32,
    ) -> CacheResult<Arc<DynamicImage>> {
        let mut body = Vec::new();
        self.fetcher.fetch(uri, &mut body).await?;
        let image = self.decode(body, requested_width, requested_height).await?;
        self.cache.memory().put(key.clone(), image.clone());
        Ok(image)
    }

    async fn decode(
        &self,
        bytes: Vec<u8>,
        requested_width: u32,
        requested_height: u32,
    ) -> CacheResult<Arc<DynamicImage>> {
        let decoder = self.decoder.clone();
        tokio::task::spawn_blocking(move || {
            decoder.decode(&bytes, requested_width, requested_height)
        })
        .await
        .map_err(|e| CacheError::DecodeError(format!("Decode task panicked: {e}")))?
        .map(Arc::new)
    }

    fn log_failure(uri: &str, error: &CacheError) {
        if error.is_network_error() {
            debug!(uri = %uri, error = %error, "No image available");
        } else {
            warn!(uri = %uri, error = %error, "Failed to load image");
        }
    }
}
