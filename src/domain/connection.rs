/// Network link state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionStatus {
    /// No link.
    #[default]
    Disconnected,
    /// Link is being established.
    Connecting,
    /// Link is up.
    Connected,
    /// Link dropped and is being restored.
    Reconnecting,
    /// Platform reported a failure.
    Error,
}

impl ConnectionStatus {
    /// True when a request may be attempted: the link is up or coming up.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Connected | Self::Connecting)
    }
}

impl From<u8> for ConnectionStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}
