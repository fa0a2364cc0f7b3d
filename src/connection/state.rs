//! Connection lifecycle states.

/// State of a connection.
///
/// `Connecting -> Open -> Closing -> Closed`, with `Errored` reachable from
/// any state before `Closed` and always followed by `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Opening handshake in progress.
    #[default]
    Connecting,
    /// Handshake complete; messages flow both ways.
    Open,
    /// A close frame was sent or received; waiting for the exchange to finish.
    Closing,
    /// A protocol or transport error ended the connection.
    Errored,
    /// Terminal state. No further callbacks fire.
    Closed,
}

impl ConnectionState {
    /// Returns `true` until the connection reaches `Closed`.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Only `Open` accepts new outgoing messages.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Errored => "Errored",
            ConnectionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}
