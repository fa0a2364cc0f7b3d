//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::InMessage;
use crate::protocol::{Frame, OpCode};

/// Accumulates data frames into complete [`InMessage`]s.
///
/// Owned by the read loop of exactly one connection.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns the complete message once a frame with FIN arrives. Control
    /// frames are ignored and leave any message in progress untouched.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation without a started
    ///   message, or a new data frame while one is in progress
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` on limit breaches
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<InMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "continuation frame without a message in progress".into(),
                ));
            }
        } else if self.opcode.is_some() {
            return Err(Error::ProtocolViolation(
                "expected continuation frame".into(),
            ));
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        let fin = frame.fin;
        let opcode = match self.opcode {
            Some(opcode) => opcode,
            None => {
                self.opcode = Some(frame.opcode);
                frame.opcode
            }
        };

        // Unfragmented messages skip the copy.
        let payload = if self.buffer.is_empty() && fin {
            frame.into_payload()
        } else {
            self.buffer.extend_from_slice(frame.payload());
            self.fragment_count += 1;
            if !fin {
                return Ok(None);
            }
            self.buffer.split().freeze()
        };

        self.reset();

        if opcode == OpCode::Text {
            std::str::from_utf8(&payload)?;
        }
        Ok(Some(InMessage::new(opcode, payload)))
    }

    /// Returns `true` while a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Discard any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}
