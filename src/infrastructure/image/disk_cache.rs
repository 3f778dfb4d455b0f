//! Disk-based image cache for persistence across sessions.
//!
//! Entries are raw encoded bytes stored as `<key>.img`. Writes go through a
//! [`DiskEditor`] that fills `<key>.img.tmp` and renames it on commit, so a
//! reader never observes a half-written entry.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use parking_lot::{Mutex, RwLock};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::ports::{CacheError, CacheResult};

/// Maximum disk cache size in bytes (10 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 10 * 1024 * 1024;

const ENTRY_EXTENSION: &str = "img";
const TEMP_EXTENSION: &str = "tmp";

/// Lifecycle of a disk cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskCacheState {
    /// Created but `initialize` has not run yet.
    Uninitialized,
    /// Directory scanned and usable.
    Ready,
    /// Initialization failed; permanent for this instance.
    Unavailable,
    /// Closed by the owner; behaves like `Unavailable`.
    Closed,
}

impl std::fmt::Display for DiskCacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

struct DiskInner {
    cache_dir: PathBuf,
    max_size: u64,
    state: RwLock<DiskCacheState>,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    pending: Mutex<HashSet<CacheKey>>,
}

/// Disk-based image cache that persists raw image bytes.
///
/// Cloning is cheap; clones share the same directory state.
#[derive(Clone)]
pub struct DiskImageCache {
    inner: Arc<DiskInner>,
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.inner.cache_dir)
            .field("max_size", &self.inner.max_size)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DiskImageCache {
    /// Creates an uninitialized cache for `cache_dir`. Nothing touches the disk
    /// until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(cache_dir: PathBuf, max_size: u64) -> Self {
        Self {
            inner: Arc::new(DiskInner {
                cache_dir,
                max_size,
                state: RwLock::new(DiskCacheState::Uninitialized),
                current_size: AtomicU64::new(0),
                item_count: AtomicUsize::new(0),
                pending: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Creates a cache that is permanently unavailable, for running memory and
    /// network only.
    #[must_use]
    pub fn disabled(cache_dir: PathBuf) -> Self {
        let cache = Self::new(cache_dir, 0);
        *cache.inner.state.write() = DiskCacheState::Unavailable;
        cache
    }

    /// Creates and initializes a cache. Never fails: an unusable directory
    /// yields a cache in the `Unavailable` state.
    pub async fn open(cache_dir: PathBuf, max_size: u64) -> Self {
        let cache = Self::new(cache_dir, max_size);
        cache.initialize().await;
        cache
    }

    /// Creates the directory and accounts existing entries.
    ///
    /// Only the first call does any work; later calls return the current state.
    pub async fn initialize(&self) -> DiskCacheState {
        if self.state() != DiskCacheState::Uninitialized {
            return self.state();
        }

        match self.inner.scan().await {
            Ok((size, count)) => {
                self.inner.current_size.store(size, Ordering::Relaxed);
                self.inner.item_count.store(count, Ordering::Relaxed);
                *self.inner.state.write() = DiskCacheState::Ready;
                info!(
                    dir = %self.inner.cache_dir.display(),
                    entries = count,
                    size,
                    "Disk cache ready"
                );
                self.inner.cleanup_if_needed().await;
            }
            Err(e) => {
                *self.inner.state.write() = DiskCacheState::Unavailable;
                warn!(
                    dir = %self.inner.cache_dir.display(),
                    error = %e,
                    "Disk cache unavailable, continuing with memory and network only"
                );
            }
        }
        self.state()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DiskCacheState {
        *self.inner.state.read()
    }

    /// Returns true if reads and edits are possible.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == DiskCacheState::Ready
    }

    /// Directory holding the entries.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Size budget in bytes.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.inner.max_size
    }

    fn ensure_ready(&self) -> CacheResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CacheError::Unavailable)
        }
    }

    /// Gets raw image bytes from disk cache.
    ///
    /// # Errors
    /// Returns `CacheError::Unavailable` if the cache is not ready, or an I/O
    /// error other than a missing entry.
    pub async fn get_bytes(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.ensure_ready()?;
        let path = self.inner.entry_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(key = %key, "Disk cache miss");
                Ok(None)
            }
            Err(e) => Err(CacheError::IoError(format!("Failed to read cache file: {e}"))),
        }
    }

    /// Checks if an entry is cached.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        if !self.is_ready() {
            return false;
        }
        fs::try_exists(self.inner.entry_path(key))
            .await
            .unwrap_or(false)
    }

    /// Opens an editor for `key`.
    ///
    /// Returns `Ok(None)` while another edit for the same key is pending.
    ///
    /// # Errors
    /// Returns error if the cache is not ready or the temp file cannot be created.
    pub async fn edit(&self, key: &CacheKey) -> CacheResult<Option<DiskEditor>> {
        self.ensure_ready()?;
        if !self.inner.pending.lock().insert(key.clone()) {
            debug!(key = %key, "Edit already pending");
            return Ok(None);
        }

        let temp_path = self.inner.temp_path(key);
        match fs::File::create(&temp_path).await {
            Ok(file) => Ok(Some(DiskEditor {
                key: key.clone(),
                cache: self.inner.clone(),
                temp_path,
                file: Some(file),
                finished: false,
            })),
            Err(e) => {
                self.inner.pending.lock().remove(key);
                Err(CacheError::IoError(format!("Failed to create cache file: {e}")))
            }
        }
    }

    /// Enforces the size budget after a batch of edits.
    ///
    /// # Errors
    /// Returns `CacheError::Unavailable` if the cache is not ready.
    pub async fn flush(&self) -> CacheResult<()> {
        self.ensure_ready()?;
        self.inner.cleanup_if_needed().await;
        trace!("Flushed disk cache");
        Ok(())
    }

    /// Closes the cache. Later operations behave as if it were unavailable.
    pub fn close(&self) {
        let mut state = self.inner.state.write();
        if *state == DiskCacheState::Ready {
            *state = DiskCacheState::Closed;
            info!(dir = %self.inner.cache_dir.display(), "Closed disk cache");
        }
    }

    /// Removes an entry from disk cache.
    pub async fn evict(&self, key: &CacheKey) {
        if !self.is_ready() {
            return;
        }
        let path = self.inner.entry_path(key);
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(key = %key, error = %e, "Failed to evict from disk cache");
            }
        } else if let Some(s) = size {
            self.inner.current_size.fetch_sub(s, Ordering::Relaxed);
            self.inner.item_count.fetch_sub(1, Ordering::Relaxed);
            debug!(key = %key, "Evicted from disk cache");
        }
    }

    /// Clears the entire disk cache.
    ///
    /// # Errors
    /// Returns error if the cache is not ready or its directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        self.ensure_ready()?;
        let mut entries = fs::read_dir(&self.inner.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if is_entry(&path) && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.inner.current_size.store(0, Ordering::Relaxed);
        self.inner.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.inner.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_entry(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
}

impl DiskInner {
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXTENSION}.{TEMP_EXTENSION}", key.as_str()))
    }

    /// Creates the directory, drops leftover temp files, and sums entry sizes.
    async fn scan(&self) -> CacheResult<(u64, usize)> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;

        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        let mut total_size = 0u64;
        let mut count = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                let _ = fs::remove_file(&path).await;
            } else if is_entry(&path)
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }
        Ok((total_size, count))
    }

    /// Cleans up old cache entries if over size limit.
    async fn cleanup_if_needed(&self) {
        let current_size = self.current_size.load(Ordering::Relaxed);
        if current_size <= self.max_size {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.max_size,
            "Disk cache over limit, cleaning up"
        );

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_entry(&path) {
                continue;
            }

            if let Ok(meta) = entry.metadata().await {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, accessed, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                debug!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size.fetch_sub(freed_size, Ordering::Relaxed);
        self.item_count.fetch_sub(freed_count, Ordering::Relaxed);

        debug!(
            freed_size = freed_size,
            freed_count = freed_count,
            "Disk cache cleanup complete"
        );
    }
}

/// Pending write of one disk-cache entry.
///
/// Write the body through the [`AsyncWrite`] impl, then [`commit`](Self::commit)
/// or [`abort`](Self::abort). Dropping an editor without committing aborts it.
pub struct DiskEditor {
    key: CacheKey,
    cache: Arc<DiskInner>,
    temp_path: PathBuf,
    file: Option<fs::File>,
    finished: bool,
}

impl DiskEditor {
    /// Key being written.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Publishes the written bytes as the entry for this key.
    ///
    /// # Errors
    /// Returns error if the data cannot be synced or renamed into place; the
    /// partial file is removed in that case.
    pub async fn commit(mut self) -> CacheResult<u64> {
        let Some(mut file) = self.file.take() else {
            return Err(CacheError::IoError("Editor already finished".to_string()));
        };
        file.flush()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to flush cache file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to sync cache file: {e}")))?;
        drop(file);

        let new_size = fs::metadata(&self.temp_path).await?.len();
        let final_path = self.cache.entry_path(&self.key);
        let old_size = fs::metadata(&final_path).await.map(|m| m.len()).ok();

        fs::rename(&self.temp_path, &final_path)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to publish cache file: {e}")))?;
        self.finished = true;

        if let Some(old) = old_size {
            if new_size > old {
                self.cache
                    .current_size
                    .fetch_add(new_size - old, Ordering::Relaxed);
            } else {
                self.cache
                    .current_size
                    .fetch_sub(old - new_size, Ordering::Relaxed);
            }
        } else {
            self.cache
                .current_size
                .fetch_add(new_size, Ordering::Relaxed);
            self.cache.item_count.fetch_add(1, Ordering::Relaxed);
        }

        debug!(key = %self.key, path = %final_path.display(), size = new_size, "Stored image in disk cache");
        Ok(new_size)
    }

    /// Discards the written bytes.
    pub async fn abort(mut self) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.temp_path).await
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(key = %self.key, error = %e, "Failed to remove aborted cache file");
        }
        self.finished = true;
        debug!(key = %self.key, "Aborted disk cache edit");
    }

    fn file_mut(&mut self) -> io::Result<Pin<&mut fs::File>> {
        self.file
            .as_mut()
            .map(Pin::new)
            .ok_or_else(|| io::Error::other("disk cache editor already finished"))
    }
}

impl AsyncWrite for DiskEditor {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().file_mut() {
            Ok(file) => file.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().file_mut() {
            Ok(file) => file.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().file_mut() {
            Ok(file) => file.poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl Drop for DiskEditor {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.temp_path);
            debug!(key = %self.key, "Disk cache edit dropped without commit");
        }
        self.cache.pending.lock().remove(&self.key);
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_root() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "pixcache").map_or_else(
        || std::env::temp_dir().join("pixcache").join("cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_cache() -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::open(temp_dir.path().to_path_buf(), 1024 * 1024).await;
        (cache, temp_dir)
    }

    async fn put(cache: &DiskImageCache, key: &CacheKey, data: &[u8]) {
        let mut editor = cache.edit(key).await.unwrap().unwrap();
        editor.write_all(data).await.unwrap();
        editor.commit().await.unwrap();
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_uri(name)
    }

    #[tokio::test]
    async fn test_commit_and_get_bytes() {
        let (cache, _temp) = create_test_cache().await;
        assert!(cache.is_ready());

        put(&cache, &key("test1"), b"test image data").await;

        let retrieved = cache.get_bytes(&key("test1")).await.unwrap();
        assert_eq!(retrieved.as_deref(), Some(&b"test image data"[..]));
        assert!(cache.contains(&key("test1")).await);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache().await;
        assert!(cache.get_bytes(&key("nonexistent")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_edit_for_same_key_is_refused() {
        let (cache, _temp) = create_test_cache().await;
        let first = cache.edit(&key("k")).await.unwrap();
        assert!(first.is_some());
        assert!(cache.edit(&key("k")).await.unwrap().is_none());
        assert!(cache.edit(&key("other")).await.unwrap().is_some());

        if let Some(editor) = first {
            editor.abort().await;
        }
        assert!(cache.edit(&key("k")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_abort_leaves_no_entry() {
        let (cache, temp) = create_test_cache().await;
        let mut editor = cache.edit(&key("k")).await.unwrap().unwrap();
        editor.write_all(b"partial").await.unwrap();
        editor.abort().await;

        assert!(!cache.contains(&key("k")).await);
        assert_eq!(cache.len(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_editor_aborts() {
        let (cache, temp) = create_test_cache().await;
        {
            let mut editor = cache.edit(&key("k")).await.unwrap().unwrap();
            editor.write_all(b"partial").await.unwrap();
        }
        assert!(!cache.contains(&key("k")).await);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
        assert!(cache.edit(&key("k")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_evict() {
        let (cache, _temp) = create_test_cache().await;
        put(&cache, &key("test1"), b"test").await;
        assert!(cache.contains(&key("test1")).await);

        cache.evict(&key("test1")).await;
        assert!(!cache.contains(&key("test1")).await);
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _temp) = create_test_cache().await;
        put(&cache, &key("test1"), b"data1").await;
        put(&cache, &key("test2"), b"data2").await;
        assert_eq!(cache.len(), 2);

        cache.clear().await.unwrap();
        assert_eq!(cache.len(), 0);
        assert!(cache.get_bytes(&key("test1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_atomic_counters_sync() {
        let (cache, _temp) = create_test_cache().await;
        assert_eq!(cache.current_size(), 0);

        put(&cache, &key("test1"), b"hello").await;
        put(&cache, &key("test2"), b"world!").await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11);

        put(&cache, &key("test1"), b"hey").await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9);

        cache.evict(&key("test2")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3);
    }

    #[tokio::test]
    async fn test_flush_enforces_budget() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::open(temp_dir.path().to_path_buf(), 10).await;

        put(&cache, &key("test1"), b"123456").await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        put(&cache, &key("test2"), b"123456").await;
        assert_eq!(cache.len(), 2);

        cache.flush().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 6);
    }

    #[tokio::test]
    async fn test_reopen_accounts_existing_entries() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = DiskImageCache::open(temp_dir.path().to_path_buf(), 1024).await;
            put(&cache, &key("a"), b"abcd").await;
            put(&cache, &key("b"), b"ef").await;
        }
        let cache = DiskImageCache::open(temp_dir.path().to_path_buf(), 1024).await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 6);
    }

    #[tokio::test]
    async fn test_unusable_directory_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let cache = DiskImageCache::open(blocker.join("images"), 1024).await;
        assert_eq!(cache.state(), DiskCacheState::Unavailable);
        assert!(matches!(
            cache.get_bytes(&key("a")).await,
            Err(CacheError::Unavailable)
        ));
        assert!(matches!(cache.edit(&key("a")).await, Err(CacheError::Unavailable)));
        assert_eq!(cache.initialize().await, DiskCacheState::Unavailable);
    }

    #[tokio::test]
    async fn test_uninitialized_and_closed_refuse_access() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().join("images"), 1024);
        assert_eq!(cache.state(), DiskCacheState::Uninitialized);
        assert!(cache.get_bytes(&key("a")).await.is_err());

        assert_eq!(cache.initialize().await, DiskCacheState::Ready);
        cache.close();
        assert_eq!(cache.state(), DiskCacheState::Closed);
        assert!(!cache.contains(&key("a")).await);
        assert!(cache.flush().await.is_err());
    }
}
