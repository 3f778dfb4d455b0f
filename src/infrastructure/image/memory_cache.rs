//! In-memory LRU image cache bounded by a byte budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;

/// Default memory budget in bytes (32 MiB).
pub const DEFAULT_MEMORY_BUDGET: u64 = 32 * 1024 * 1024;

struct Entries {
    lru: LruCache<CacheKey, Arc<image::DynamicImage>>,
    bytes: u64,
}

/// In-memory LRU cache for decoded images.
/// Thread-safe; all operations are synchronous so the UI thread can probe it.
pub struct MemoryImageCache {
    entries: Mutex<Entries>,
    budget: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Approximate in-memory cost of a decoded image.
fn image_cost(image: &image::DynamicImage) -> u64 {
    image.as_bytes().len() as u64
}

impl MemoryImageCache {
    /// Creates a cache holding at most `budget` bytes of decoded pixels.
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                bytes: 0,
            }),
            budget: budget.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache with the default budget.
    #[must_use]
    pub fn with_default_budget() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET)
    }

    /// Configured budget in bytes.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Looks up an image, promoting it in the LRU order.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        let mut entries = self.entries.lock();
        if let Some(img) = entries.lru.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        self.entries.lock().lru.peek(key).cloned()
    }

    /// Stores an image, evicting least-recently-used entries to stay in budget.
    pub fn put(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        let cost = image_cost(&image);
        if cost > self.budget {
            debug!(key = %key, cost, budget = self.budget, "Image exceeds memory budget, not cached");
            return;
        }

        let mut entries = self.entries.lock();
        if let Some(old) = entries.lru.put(key.clone(), image) {
            entries.bytes -= image_cost(&old);
        }
        entries.bytes += cost;

        while entries.bytes > self.budget {
            let Some((evicted, img)) = entries.lru.pop_lru() else {
                break;
            };
            entries.bytes -= image_cost(&img);
            trace!(key = %evicted, "Evicted image from memory cache");
        }
        debug!(key = %key, bytes = entries.bytes, "Stored image in memory cache");
    }

    /// Removes an image.
    pub fn evict(&self, key: &CacheKey) {
        let mut entries = self.entries.lock();
        if let Some(img) = entries.lru.pop(key) {
            entries.bytes -= image_cost(&img);
            debug!(key = %key, "Evicted image from memory cache");
        }
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.entries.lock().bytes
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.lru.clear();
        entries.bytes = 0;
        debug!("Cleared memory image cache");
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let entries = self.entries.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: entries.lru.len(),
            bytes: entries.bytes,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Bytes of decoded pixels held.
    pub bytes: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.bytes, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 RGB8 = 300 bytes.
    fn small_image() -> Arc<image::DynamicImage> {
        Arc::new(image::DynamicImage::new_rgb8(10, 10))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_uri(name)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(1024 * 1024);
        let img = Arc::new(image::DynamicImage::new_rgb8(100, 100));

        cache.put(key("test1"), img);
        let retrieved = cache.get(&key("test1"));

        assert_eq!(retrieved.map(|i| i.width()), Some(100));
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(1024);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_budget_eviction() {
        let cache = MemoryImageCache::new(700);

        cache.put(key("test1"), small_image());
        cache.put(key("test2"), small_image());
        cache.put(key("test3"), small_image());

        // test1 is least recently used and pushed out by the third 300-byte entry
        assert!(cache.get(&key("test1")).is_none());
        assert!(cache.get(&key("test2")).is_some());
        assert!(cache.get(&key("test3")).is_some());
        assert_eq!(cache.size_bytes(), 600);
    }

    #[test]
    fn test_oversized_image_not_cached() {
        let cache = MemoryImageCache::new(100);
        cache.put(key("big"), small_image());
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_replace_updates_size() {
        let cache = MemoryImageCache::new(10_000);
        cache.put(key("a"), small_image());
        cache.put(key("a"), Arc::new(image::DynamicImage::new_rgb8(5, 5)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 75);

        cache.evict(&key("a"));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(10_000);
        cache.put(key("test1"), small_image());

        let _ = cache.get(&key("test1"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.bytes, 300);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(600);

        cache.put(key("test1"), small_image());
        cache.put(key("test2"), small_image());

        let _ = cache.peek(&key("test1"));
        cache.put(key("test3"), small_image());

        assert!(cache.peek(&key("test1")).is_none());
        assert!(cache.peek(&key("test2")).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = MemoryImageCache::new(10_000);
        cache.put(key("a"), small_image());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(MemoryImageCache::new(1024 * 1024));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let k = key(&format!("{t}-{i}"));
                        cache.put(k.clone(), small_image());
                        assert!(cache.get(&k).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 200);
    }
}
