//! Bounded pool that runs image load tasks off the UI thread.
//!
//! The pool owns a dedicated multi-thread runtime. A FIFO semaphore with
//! `max_size` permits caps how many load tasks run at once; tasks waiting for
//! a permit form an unbounded queue. The pool is created once at startup and
//! shut down at teardown; it must be dropped outside of any async context.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, info, trace};

use crate::domain::ports::{CacheError, CacheResult};

/// Idle time before threads above the core size are torn down.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Sizing of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Threads kept alive while idle.
    pub core_size: usize,
    /// Upper bound on concurrently running load tasks.
    pub max_size: usize,
    /// Idle keep-alive for threads beyond the core.
    pub keep_alive: Duration,
}

impl WorkerPoolConfig {
    /// Sizes the pool from a CPU count: core = n + 1, max = 2n + 1.
    #[must_use]
    pub fn for_parallelism(cpus: usize) -> Self {
        let cpus = cpus.max(1);
        Self {
            core_size: cpus + 1,
            max_size: cpus * 2 + 1,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    /// Returns a copy with sizes clamped so that `1 <= core <= max`.
    #[must_use]
    pub fn normalized(self) -> Self {
        let core_size = self.core_size.max(1);
        Self {
            core_size,
            max_size: self.max_size.max(core_size),
            keep_alive: self.keep_alive,
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::for_parallelism(cpus)
    }
}

#[derive(Default)]
struct PoolCounters {
    queued: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

/// Decrements the active count even if the task panics.
struct ActiveGuard(Arc<PoolCounters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed-size pool executing one load task per request.
pub struct WorkerPool {
    runtime: Runtime,
    permits: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
    config: WorkerPoolConfig,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("active", &self.active_count())
            .field("queued", &self.queued_count())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Starts the pool's runtime and threads.
    ///
    /// # Errors
    /// Returns `CacheError::PoolError` if the runtime cannot be built.
    pub fn new(config: WorkerPoolConfig) -> CacheResult<Self> {
        let config = config.normalized();
        let thread_counter = Arc::new(AtomicUsize::new(1));
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.core_size)
            .max_blocking_threads(config.max_size)
            .thread_keep_alive(config.keep_alive)
            .thread_name_fn(move || {
                let n = thread_counter.fetch_add(1, Ordering::Relaxed);
                format!("image-loader#{n}")
            })
            .enable_all()
            .build()
            .map_err(|e| CacheError::PoolError(format!("Failed to start worker pool: {e}")))?;

        info!(
            core = config.core_size,
            max = config.max_size,
            keep_alive_secs = config.keep_alive.as_secs(),
            "Worker pool started"
        );

        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(config.max_size)),
            counters: Arc::new(PoolCounters::default()),
            config,
        })
    }

    /// Creates a pool sized from the machine's available parallelism.
    ///
    /// # Errors
    /// Returns `CacheError::PoolError` if the runtime cannot be built.
    pub fn with_defaults() -> CacheResult<Self> {
        Self::new(WorkerPoolConfig::default())
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> WorkerPoolConfig {
        self.config
    }

    /// Queues `task`. It starts once a permit is free and always runs to completion.
    pub fn submit<F>(&self, task: F) -> tokio::task::JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        let counters = self.counters.clone();
        counters.queued.fetch_add(1, Ordering::SeqCst);

        self.runtime.spawn(async move {
            let permit = permits.acquire_owned().await;
            counters.queued.fetch_sub(1, Ordering::SeqCst);
            let Ok(_permit) = permit else {
                debug!("Worker pool closed, dropping queued task");
                return None;
            };

            let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            counters.peak.fetch_max(now, Ordering::SeqCst);
            let _active = ActiveGuard(counters.clone());
            trace!(active = now, "Load task started");

            Some(task.await)
        })
    }

    /// Queues `task` and blocks the calling thread until it finishes.
    ///
    /// Must not be called from inside an async context.
    ///
    /// # Errors
    /// Returns `CacheError::PoolError` if the task panicked or the pool is closed.
    pub fn run<F>(&self, task: F) -> CacheResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.submit(task);
        self.runtime
            .block_on(handle)
            .map_err(|e| CacheError::PoolError(format!("Load task failed: {e}")))?
            .ok_or_else(|| CacheError::PoolError("Worker pool closed".to_string()))
    }

    /// Runs a future on the calling thread inside the pool's runtime, outside
    /// the task bound. Used for setup and teardown work.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Tasks currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a permit.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed running at once.
    #[must_use]
    pub fn peak_active(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Tasks that have finished.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// Stops accepting queued work and waits up to `timeout` for running tasks.
    pub fn shutdown(self, timeout: Duration) {
        self.permits.close();
        self.runtime.shutdown_timeout(timeout);
        info!("Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn small_pool(core: usize, max: usize) -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig {
            core_size: core,
            max_size: max,
            keep_alive: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test_case(1, 2, 3 ; "single_cpu")]
    #[test_case(4, 5, 9 ; "quad_core")]
    #[test_case(0, 2, 3 ; "zero_treated_as_one")]
    fn test_sizing_from_parallelism(cpus: usize, core: usize, max: usize) {
        let config = WorkerPoolConfig::for_parallelism(cpus);
        assert_eq!((config.core_size, config.max_size), (core, max));
        assert_eq!(config.keep_alive, DEFAULT_KEEP_ALIVE);
    }

    #[test]
    fn test_normalized_keeps_max_above_core() {
        let config = WorkerPoolConfig {
            core_size: 0,
            max_size: 0,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
        .normalized();
        assert_eq!((config.core_size, config.max_size), (1, 1));
    }

    #[test]
    fn test_run_returns_output() {
        let pool = small_pool(1, 2);
        assert_eq!(pool.run(async { 21 * 2 }).unwrap(), 42);
        assert_eq!(pool.completed_count(), 1);
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_concurrency_never_exceeds_max() {
        let pool = small_pool(1, 3);
        let handles: Vec<_> = (0..12)
            .map(|_| {
                pool.submit(async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                })
            })
            .collect();

        for handle in handles {
            assert!(pool.block_on(handle).unwrap().is_some());
        }

        assert_eq!(pool.completed_count(), 12);
        assert!(pool.peak_active() <= 3);
        assert!(pool.peak_active() >= 1);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.queued_count(), 0);
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_worker_threads_are_named() {
        let pool = small_pool(1, 1);
        let name = pool
            .run(async { std::thread::current().name().map(str::to_owned) })
            .unwrap();
        assert!(name.is_some_and(|n| n.starts_with("image-loader#")));
        pool.shutdown(Duration::from_secs(1));
    }
}
