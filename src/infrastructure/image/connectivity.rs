//! Connectivity tracking.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

use crate::domain::ConnectionStatus;
use crate::domain::ports::ConnectivityPort;

/// Holds the last connection status reported by the platform layer.
#[derive(Debug)]
pub struct NetworkMonitor {
    status: AtomicU8,
}

impl NetworkMonitor {
    /// Monitor starting at `status`.
    #[must_use]
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            status: AtomicU8::new(status as u8),
        }
    }

    /// Monitor that starts out connected.
    #[must_use]
    pub fn online() -> Self {
        Self::new(ConnectionStatus::Connected)
    }

    /// Monitor that starts out disconnected.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(ConnectionStatus::Disconnected)
    }

    /// Last reported status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from(self.status.load(Ordering::Acquire))
    }

    /// Records a status change from the platform layer.
    pub fn set_status(&self, status: ConnectionStatus) {
        let previous = ConnectionStatus::from(self.status.swap(status as u8, Ordering::AcqRel));
        if previous != status {
            debug!(?previous, ?status, "Connection status changed");
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::online()
    }
}

impl ConnectivityPort for NetworkMonitor {
    fn is_network_available(&self) -> bool {
        self.status().is_usable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let monitor = NetworkMonitor::offline();
        assert!(!monitor.is_network_available());

        monitor.set_status(ConnectionStatus::Connecting);
        assert!(monitor.is_network_available());

        monitor.set_status(ConnectionStatus::Error);
        assert!(!monitor.is_network_available());
        assert_eq!(monitor.status(), ConnectionStatus::Error);
    }

    #[test]
    fn test_default_is_online() {
        assert!(NetworkMonitor::default().is_network_available());
    }
}
