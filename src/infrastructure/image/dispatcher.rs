//! Delivery of finished loads back to the UI thread.
//!
//! Workers post a [`LoadResult`] through a [`ResultSender`]. The UI thread owns
//! the [`ResultDispatcher`] and drains it from its event loop; every result is
//! checked against the target's current binding before it is applied, so a
//! recycled target never shows an image it was rebound away from.

use std::sync::Weak;
use std::thread::ThreadId;

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::domain::entities::{DisplayTarget, ImageCallback, LoadedImage};

/// Outcome of one load task, produced on a worker and consumed once on the UI thread.
pub struct LoadResult {
    /// Target the load was started for. Not kept alive by the result.
    pub target: Weak<dyn DisplayTarget>,
    /// URI the target was bound to when the load started.
    pub uri: String,
    /// The image, or `None` when every tier missed.
    pub image: Option<LoadedImage>,
    /// Optional callback replacing direct assignment.
    pub callback: Option<ImageCallback>,
}

impl std::fmt::Debug for LoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadResult")
            .field("uri", &self.uri)
            .field("image", &self.image)
            .field("has_callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

/// What the dispatcher did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Shown on the target or handed to the callback.
    Applied,
    /// Target was rebound to another URI; discarded.
    Stale,
    /// Target no longer exists; discarded.
    TargetDropped,
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Results applied to their target.
    pub applied: u64,
    /// Results discarded because the target was rebound.
    pub stale: u64,
    /// Results discarded because the target was gone.
    pub dropped: u64,
}

/// Shows `image` on `target`, through `callback` when one is given.
pub(crate) fn apply(
    target: &dyn DisplayTarget,
    image: Option<LoadedImage>,
    callback: Option<&ImageCallback>,
) {
    match callback {
        Some(callback) => callback(target, image),
        None => target.set_image(image),
    }
}

/// Handle used by loaders to post results to the UI thread.
#[derive(Clone)]
pub struct ResultSender {
    tx: mpsc::UnboundedSender<LoadResult>,
    ui_thread: ThreadId,
}

impl std::fmt::Debug for ResultSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSender")
            .field("ui_thread", &self.ui_thread)
            .finish_non_exhaustive()
    }
}

impl ResultSender {
    /// Posts a result. Silently dropped if the dispatcher is gone.
    pub fn post(&self, result: LoadResult) {
        if let Err(e) = self.tx.send(result) {
            debug!(uri = %e.0.uri, "Result dispatcher closed, dropping load result");
        }
    }

    /// Returns true when called on the thread that owns the dispatcher.
    #[must_use]
    pub fn is_ui_thread(&self) -> bool {
        std::thread::current().id() == self.ui_thread
    }
}

/// UI-thread side of result delivery.
pub struct ResultDispatcher {
    rx: mpsc::UnboundedReceiver<LoadResult>,
    ui_thread: ThreadId,
    stats: DispatchStats,
}

impl std::fmt::Debug for ResultDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultDispatcher")
            .field("ui_thread", &self.ui_thread)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ResultDispatcher {
    /// Creates a dispatcher bound to the calling thread, which becomes the UI thread.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, ResultSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ui_thread = std::thread::current().id();
        (
            Self {
                rx,
                ui_thread,
                stats: DispatchStats::default(),
            },
            ResultSender { tx, ui_thread },
        )
    }

    /// Applies `result` if its target still exists and is still bound to its URI.
    pub fn deliver(&mut self, result: LoadResult) -> Delivery {
        let on_ui_thread = std::thread::current().id() == self.ui_thread;
        if !on_ui_thread {
            error!(uri = %result.uri, "Load result delivered off the UI thread");
        }
        debug_assert!(on_ui_thread, "ResultDispatcher::deliver called off the UI thread");

        let Some(target) = result.target.upgrade() else {
            trace!(uri = %result.uri, "Target dropped before delivery");
            self.stats.dropped += 1;
            return Delivery::TargetDropped;
        };

        if !target.binding().is_current(&result.uri) {
            debug!(
                uri = %result.uri,
                current = ?target.binding().current(),
                "Target rebound since load started, ignoring result"
            );
            self.stats.stale += 1;
            return Delivery::Stale;
        }

        apply(target.as_ref(), result.image, result.callback.as_ref());
        self.stats.applied += 1;
        Delivery::Applied
    }

    /// Delivers the next queued result without waiting.
    pub fn try_dispatch_next(&mut self) -> Option<Delivery> {
        let result = self.rx.try_recv().ok()?;
        Some(self.deliver(result))
    }

    /// Delivers every queued result and returns how many were processed.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while self.try_dispatch_next().is_some() {
            count += 1;
        }
        count
    }

    /// Waits for the next result and delivers it. `None` once every sender is gone.
    pub async fn dispatch_next(&mut self) -> Option<Delivery> {
        let result = self.rx.recv().await?;
        Some(self.deliver(result))
    }

    /// Blocking variant of [`dispatch_next`](Self::dispatch_next) for
    /// synchronous event loops. Must not be called inside an async context.
    pub fn blocking_dispatch_next(&mut self) -> Option<Delivery> {
        let result = self.rx.blocking_recv()?;
        Some(self.deliver(result))
    }

    /// Delivery counters so far.
    #[must_use]
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }
}
