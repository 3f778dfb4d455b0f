//! Network fetch and connectivity port definitions.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use super::CacheResult;

/// Reports whether the network can currently be used.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectivityPort: Send + Sync {
    /// True when a connection is active and connected or connecting.
    fn is_network_available(&self) -> bool;
}

/// Port for downloading a URI into a byte sink.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Streams the body of `uri` into `sink` and returns the number of bytes written.
    ///
    /// # Errors
    /// Returns `CacheError::Offline` without touching the network when there is
    /// no connectivity, or another network error if the transfer fails.
    async fn fetch(&self, uri: &str, sink: &mut (dyn AsyncWrite + Send + Unpin))
    -> CacheResult<u64>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Semaphore;

    use crate::domain::ports::CacheError;

    /// Fetcher serving canned bodies, counting calls and tracking concurrency.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        bodies: Mutex<HashMap<String, Vec<u8>>>,
        gates: Mutex<HashMap<String, Arc<Semaphore>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct ActiveGuard(Arc<AtomicUsize>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every fetch sleeps for `delay` before answering.
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn serve(&self, uri: &str, body: Vec<u8>) {
            self.bodies.lock().insert(uri.to_owned(), body);
        }

        /// Holds fetches of `uri` until the returned semaphore gets a permit.
        pub fn gate(&self, uri: &str) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            self.gates.lock().insert(uri.to_owned(), gate.clone());
            gate
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NetworkFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            uri: &str,
            sink: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> CacheResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = ActiveGuard(self.active.clone());

            let gate = self.gates.lock().get(uri).cloned();
            if let Some(gate) = gate {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| CacheError::NetworkError(e.to_string()))?;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let body = self.bodies.lock().get(uri).cloned();
            let Some(body) = body else {
                return Err(CacheError::HttpStatus { status: 404 });
            };
            sink.write_all(&body).await?;
            sink.flush().await?;
            Ok(body.len() as u64)
        }
    }
}
