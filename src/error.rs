//! Error types for the WebSocket engine.
//!
//! Every failure is classified into one of three kinds (see [`ErrorKind`]):
//! protocol violations by the peer, transport failures of the underlying
//! channel, and handshake failures that happen before a connection exists.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The peer violated the framing protocol. Terminates the connection.
    Protocol,
    /// The byte channel failed or ended unexpectedly.
    Transport,
    /// The opening handshake failed; no connection was created.
    Handshake,
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Payload length does not fit in this platform's address space.
    #[error("Payload too large for platform: {size} bytes")]
    PayloadTooLargeForPlatform {
        /// Declared payload size.
        size: u64,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake exceeded the configured size limit.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Handshake did not complete in time.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// No endpoint matched the requested path.
    #[error("No endpoint matches path: {0}")]
    RouteNotFound(String),

    /// Server answered the upgrade request with a non-101 status.
    #[error("Upgrade rejected with status {0}")]
    UpgradeRejected(u16),

    /// An endpoint pattern failed to compile.
    #[error("Invalid endpoint pattern: {0}")]
    InvalidPattern(String),

    /// The target URL of a client could not be parsed.
    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    /// The server or client is already running.
    #[error("Already running")]
    AlreadyRunning,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::ConnectionClosed(_) => ErrorKind::Transport,
            Error::InvalidHandshake(_)
            | Error::HandshakeTooLarge { .. }
            | Error::HandshakeTimeout
            | Error::RouteNotFound(_)
            | Error::UpgradeRejected(_)
            | Error::InvalidPattern(_)
            | Error::InvalidUrl(_)
            | Error::AlreadyRunning => ErrorKind::Handshake,
            _ => ErrorKind::Protocol,
        }
    }

    /// Returns `true` for peer protocol violations.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self.kind(), ErrorKind::Protocol)
    }

    /// Close status to send to the peer when this error terminates a connection.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Error::InvalidUtf8 => 1007,
            Error::MessageTooLarge { .. }
            | Error::FrameTooLarge { .. }
            | Error::TooManyFragments { .. }
            | Error::PayloadTooLargeForPlatform { .. } => 1009,
            _ if self.is_protocol() => 1002,
            _ => 1006,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidPattern(err.to_string())
    }
}
