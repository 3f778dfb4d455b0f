//! HTTP implementation of the network fetch port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

use crate::domain::ports::{CacheError, CacheResult, ConnectivityPort, NetworkFetcher};

/// Buffer size used between the response body and the sink.
pub const IO_BUFFER_SIZE: usize = 8 * 1024;

/// Downloads image bodies with `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    connectivity: Arc<dyn ConnectivityPort>,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl HttpFetcher {
    /// Creates a fetcher with the given request timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        connectivity: Arc<dyn ConnectivityPort>,
        timeout: Duration,
        user_agent: &str,
    ) -> CacheResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::NetworkError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            connectivity,
        })
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(
        &self,
        uri: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CacheResult<u64> {
        if !self.connectivity.is_network_available() {
            debug!(uri, "Skipping download, network unavailable");
            return Err(CacheError::Offline);
        }

        let mut response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| CacheError::NetworkError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CacheError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        let mut out = BufWriter::with_capacity(IO_BUFFER_SIZE, sink);
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CacheError::NetworkError(format!("Failed to read body: {e}")))?
        {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        trace!(uri, bytes = written, "Downloaded image body");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::MockConnectivityPort;

    fn fetcher(online: bool) -> HttpFetcher {
        let mut connectivity = MockConnectivityPort::new();
        connectivity
            .expect_is_network_available()
            .return_const(online);
        HttpFetcher::new(Arc::new(connectivity), Duration::from_secs(5), "pixcache-test")
            .unwrap()
    }

    #[tokio::test]
    async fn test_offline_fails_fast() {
        let fetcher = fetcher(false);
        let mut sink = Vec::new();

        let result = fetcher.fetch("https://example.com/a.png", &mut sink).await;

        assert!(matches!(result, Err(CacheError::Offline)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_uri_is_network_error() {
        let fetcher = fetcher(true);
        let mut sink = Vec::new();

        let result = fetcher.fetch("not a uri", &mut sink).await;

        assert!(matches!(result, Err(CacheError::NetworkError(_))));
    }
}
