//! Shared cache facade owning the memory and disk tiers.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::disk_cache::DiskImageCache;
use super::memory_cache::MemoryImageCache;
use crate::infrastructure::config::CacheParams;

/// Memory and disk tiers shared by every loader built against the same parameters.
///
/// Holds the single critical section that serializes disk-cache edits
/// (probe-miss, fetch, commit or abort, flush) across all loaders.
pub struct ImageCache {
    memory: MemoryImageCache,
    disk: DiskImageCache,
    edit_lock: Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("memory", &self.memory.stats())
            .field("disk", &self.disk)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Wraps already constructed tiers.
    #[must_use]
    pub fn new(memory: MemoryImageCache, disk: DiskImageCache) -> Self {
        Self {
            memory,
            disk,
            edit_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Builds both tiers from `params`. The disk tier is initialized here; if
    /// that fails the cache runs memory and network only.
    pub async fn open(params: &CacheParams) -> Self {
        let memory = MemoryImageCache::new(params.memory_budget_bytes());
        let dir = params.disk_cache_dir();
        let disk = if params.disk_cache_enabled {
            DiskImageCache::open(dir, params.disk_cache_size).await
        } else {
            info!("Disk cache disabled by configuration");
            DiskImageCache::disabled(dir)
        };
        debug!(
            memory_budget = memory.budget(),
            disk_state = %disk.state(),
            "Image cache opened"
        );
        Self::new(memory, disk)
    }

    /// Memory tier.
    #[must_use]
    pub const fn memory(&self) -> &MemoryImageCache {
        &self.memory
    }

    /// Disk tier.
    #[must_use]
    pub const fn disk(&self) -> &DiskImageCache {
        &self.disk
    }

    /// Enters the disk-edit critical section.
    pub async fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edit_lock.lock().await
    }

    /// Returns true after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Empties both tiers.
    pub async fn clear(&self) {
        if self.is_closed() {
            return;
        }
        self.memory.clear();
        let _edits = self.lock_edits().await;
        if self.disk.is_ready()
            && let Err(e) = self.disk.clear().await
        {
            warn!(error = %e, "Failed to clear disk cache");
        }
        info!("Cleared image caches");
    }

    /// Flushes pending disk bookkeeping.
    pub async fn flush(&self) {
        if self.is_closed() || !self.disk.is_ready() {
            return;
        }
        let _edits = self.lock_edits().await;
        if let Err(e) = self.disk.flush().await {
            warn!(error = %e, "Failed to flush disk cache");
        }
    }

    /// Flushes and closes the disk tier. Later loads use memory and network only.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _edits = self.lock_edits().await;
        if self.disk.is_ready() {
            if let Err(e) = self.disk.flush().await {
                warn!(error = %e, "Failed to flush disk cache before closing");
            }
            self.disk.close();
        }
        info!("Closed image cache");
    }
}
