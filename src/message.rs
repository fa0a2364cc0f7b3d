//! Message types handed to and accepted from applications, and close codes
//! as defined in RFC 6455.

use std::fmt;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::protocol::{Frame, OpCode};

/// Header byte of a final text frame, the default for [`OutMessage`].
pub const FINAL_TEXT: u8 = 0x81;

/// Header byte of a final binary frame.
pub const FINAL_BINARY: u8 = 0x82;

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001), e.g. server shutdown.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Abnormal closure (1006). Reported locally when the channel dropped
    /// without a close frame; never sent on the wire.
    Abnormal,
    /// Invalid payload (1007), e.g. non-UTF-8 text.
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Internal error (1011).
    InternalError,
    /// Any other code (1010, 1012-1014, 3000-4999, or illegal values).
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Whether this code may appear in a close frame (RFC 6455 Section 7.4.1).
    ///
    /// Legal: 1000-1003, 1007-1014 and 3000-4999.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Codes an endpoint must never put in a close frame: 1004-1006 and 1015.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Close frame contents: status code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason for closing (UTF-8, at most 123 bytes on the wire).
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A complete message received from the peer.
///
/// Text messages are guaranteed to hold valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMessage {
    opcode: OpCode,
    payload: Bytes,
}

impl InMessage {
    pub(crate) fn new(opcode: OpCode, payload: Bytes) -> Self {
        Self { opcode, payload }
    }

    /// Opcode of the first frame: `Text` or `Binary`.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// `FIN | opcode` byte of the message as if it had arrived in one frame.
    #[must_use]
    pub const fn header_byte(&self) -> u8 {
        0x80 | self.opcode.as_u8()
    }

    /// Returns `true` for text messages.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.opcode == OpCode::Text
    }

    /// Returns `true` for binary messages.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.opcode == OpCode::Binary
    }

    /// The reassembled payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as text, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            std::str::from_utf8(&self.payload).ok()
        } else {
            None
        }
    }

    /// The payload as a `String`. Binary payloads are converted lossily.
    #[must_use]
    pub fn string(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Take the payload.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}

/// A message built by the application for sending.
///
/// The header byte is `FIN << 7 | opcode` and defaults to [`FINAL_TEXT`].
/// Successive header bytes `0x01`, `0x00`, `0x80` send one text message in
/// three fragments.
///
/// The payload can be streamed in through `std::io::Write` or
/// `std::fmt::Write`. Bring only one of the two into scope where `write!`
/// targets an `OutMessage`, since both provide `write_fmt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutMessage {
    header: u8,
    payload: BytesMut,
}

impl Default for OutMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl OutMessage {
    /// An empty final text message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: FINAL_TEXT,
            payload: BytesMut::new(),
        }
    }

    /// A final text message.
    #[must_use]
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::new().with_payload(text.as_ref().as_bytes())
    }

    /// A final binary message.
    #[must_use]
    pub fn binary(data: impl AsRef<[u8]>) -> Self {
        Self::new().with_header(FINAL_BINARY).with_payload(data)
    }

    /// Replace the header byte.
    #[must_use]
    pub const fn with_header(mut self, header: u8) -> Self {
        self.header = header;
        self
    }

    /// Append `data` to the payload.
    #[must_use]
    pub fn with_payload(mut self, data: impl AsRef<[u8]>) -> Self {
        self.payload.put_slice(data.as_ref());
        self
    }

    /// The header byte.
    #[must_use]
    pub const fn header(&self) -> u8 {
        self.header
    }

    /// The payload written so far.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Turn the message into the frame it describes.
    ///
    /// # Errors
    ///
    /// Fails if the header byte has reserved bits or a reserved opcode, or if
    /// it describes an invalid control frame.
    pub fn into_frame(self) -> Result<Frame> {
        let frame = Frame::from_header_byte(self.header, self.payload.freeze())?;
        frame.validate()?;
        Ok(frame)
    }
}

impl io::Write for OutMessage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.payload.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for OutMessage {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.payload.put_slice(s.as_bytes());
        Ok(())
    }
}

impl From<&str> for OutMessage {
    fn from(text: &str) -> Self {
        OutMessage::text(text)
    }
}

impl From<String> for OutMessage {
    fn from(text: String) -> Self {
        OutMessage::text(text)
    }
}

impl From<&[u8]> for OutMessage {
    fn from(data: &[u8]) -> Self {
        OutMessage::binary(data)
    }
}

impl From<Vec<u8>> for OutMessage {
    fn from(data: Vec<u8>) -> Self {
        OutMessage::binary(data)
    }
}
