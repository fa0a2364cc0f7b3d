//! WebSocket frame encoding and decoding (RFC 6455 Section 5.2).
//!
//! This is the pure codec: it never touches I/O. [`decode`] works on whatever
//! bytes have arrived so far and reports [`Decoded::NeedMoreData`] when the
//! buffer does not yet hold a whole frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;
use crate::protocol::validation::FrameValidator;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded fixed part of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN bit.
    pub fin: bool,
    /// RSV1-3 as the raw `0x70` bits of the first byte.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, if the MASK bit was set.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: usize,
    /// Bytes occupied by the header, including extended length and mask key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` ends inside the header
    /// - `Error::ReservedOpcode` for reserved opcodes
    /// - `Error::InvalidFrame` for a non-minimal length encoding
    /// - `Error::PayloadTooLargeForPlatform` if the length does not fit `usize`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];
        let opcode = OpCode::from_u8(byte0)?;
        let masked = byte1 & 0x80 != 0;

        let (payload_len, len_end) = match byte1 & 0x7F {
            short @ 0..=125 => (short as usize, 2),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
                if len <= 125 {
                    return Err(Error::InvalidFrame(
                        "16-bit length used for short payload".into(),
                    ));
                }
                (len, 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len >> 63 != 0 {
                    return Err(Error::InvalidFrame(
                        "most significant length bit must be zero".into(),
                    ));
                }
                if len <= 0xFFFF {
                    return Err(Error::InvalidFrame(
                        "64-bit length used for short payload".into(),
                    ));
                }
                let len = usize::try_from(len)
                    .map_err(|_| Error::PayloadTooLargeForPlatform { size: len })?;
                (len, 10)
            }
        };

        let header_len = if masked { len_end + 4 } else { len_end };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let mask = masked.then(|| [buf[len_end], buf[len_end + 1], buf[len_end + 2], buf[len_end + 3]]);

        Ok(Self {
            fin: byte0 & 0x80 != 0,
            rsv: byte0 & 0x70,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }
}

/// A WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (client frames only)              |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0, no extensions are negotiated.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload: payload.into(),
        }
    }

    /// Build a frame from a caller-supplied `FIN | RSV | opcode` header byte.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if any of the `0x70` bits are set
    /// - `Error::ReservedOpcode` if the opcode nibble is reserved
    pub fn from_header_byte(header: u8, payload: impl Into<Bytes>) -> Result<Self> {
        if header & 0x70 != 0 {
            return Err(Error::ReservedBitsSet);
        }
        let opcode = OpCode::from_u8(header)?;
        Ok(Self::new(header & 0x80 != 0, opcode, payload))
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    ///
    /// The reason is truncated on a character boundary so the payload fits in
    /// a control frame.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut end = reason.len().min(MAX_CONTROL_FRAME_PAYLOAD - 2);
                while !reason.is_char_boundary(end) {
                    end -= 1;
                }
                let mut data = BytesMut::with_capacity(2 + end);
                data.put_u16(code);
                data.put_slice(&reason.as_bytes()[..end]);
                data.freeze()
            }
            None => Bytes::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// First header byte: `FIN | RSV1-3 | opcode`.
    #[must_use]
    pub fn header_byte(&self) -> u8 {
        let mut byte = self.opcode.as_u8();
        if self.fin {
            byte |= 0x80;
        }
        if self.rsv1 {
            byte |= 0x40;
        }
        if self.rsv2 {
            byte |= 0x20;
        }
        if self.rsv3 {
            byte |= 0x10;
        }
        byte
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Parse one frame from the start of `buf` without role checks.
    ///
    /// Returns the frame (unmasked) and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - header errors as per [`FrameHeader::parse`]
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        Self::from_parts(&header, buf)
    }

    fn from_parts(header: &FrameHeader, buf: &[u8]) -> Result<(Self, usize)> {
        let total = header
            .header_len
            .checked_add(header.payload_len)
            .ok_or(Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
            })?;

        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = BytesMut::from(&buf[header.header_len..total]);
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv & 0x40 != 0,
            rsv2: header.rsv & 0x20 != 0,
            rsv3: header.rsv & 0x10 != 0,
            opcode: header.opcode,
            payload: payload.freeze(),
        };
        Ok((frame, total))
    }

    /// Validate the frame according to RFC 6455.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control frame payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Interpret the payload of a close frame.
    ///
    /// Returns `None` for an empty payload.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a 1-byte payload
    /// - `Error::InvalidCloseCode` if the status is not legal on the wire
    /// - `Error::InvalidUtf8` if the reason is not UTF-8
    pub fn close_frame(&self) -> Result<Option<CloseFrame>> {
        match self.payload.len() {
            0 => Ok(None),
            1 => Err(Error::ProtocolViolation(
                "close payload of one byte".into(),
            )),
            _ => {
                let code = CloseCode::from_u16(u16::from_be_bytes([
                    self.payload[0],
                    self.payload[1],
                ]));
                if !code.is_valid() {
                    return Err(Error::InvalidCloseCode(code.as_u16()));
                }
                let reason = std::str::from_utf8(&self.payload[2..])?;
                Ok(Some(CloseFrame::new(code, reason)))
            }
        }
    }

    /// Size of the encoded frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let extended = match len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        2 + extended + if masked { 4 } else { 0 } + len
    }

    /// Append the wire encoding of this frame to `dst`.
    ///
    /// With `Some(mask)` the MASK bit is set and the payload is XORed with the
    /// key; server frames pass `None`.
    pub fn encode_into(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        let len = self.payload.len();
        dst.reserve(self.wire_size(mask.is_some()));
        dst.put_u8(self.header_byte());

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        match len {
            0..=125 => dst.put_u8(mask_bit | len as u8),
            126..=65535 => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(len as u16);
            }
            _ => {
                dst.put_u8(mask_bit | 127);
                dst.put_u64(len as u64);
            }
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Encode this frame into a fresh buffer.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));
        self.encode_into(&mut buf, mask);
        buf
    }
}

/// Outcome of [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied.
    Frame {
        /// The unmasked frame.
        frame: Frame,
        /// Bytes to drop from the front of the buffer.
        consumed: usize,
    },
    /// The buffer ends inside a frame; at least this many more bytes are needed.
    NeedMoreData(usize),
}

/// Decode the first frame in `buf`, enforcing the rules of `validator`.
///
/// The header is validated as soon as it is complete, so oversized or
/// malformed frames are rejected before their payload arrives.
///
/// # Errors
///
/// Any protocol error: reserved bits or opcodes, bad masking for the role,
/// fragmented or oversized control frames, or a frame above the size limit.
pub fn decode(buf: &[u8], validator: &FrameValidator) -> Result<Decoded> {
    let header = match FrameHeader::parse(buf) {
        Ok(header) => header,
        Err(Error::IncompleteFrame { needed }) => return Ok(Decoded::NeedMoreData(needed)),
        Err(e) => return Err(e),
    };

    validator.validate(&header)?;

    match Frame::from_parts(&header, buf) {
        Ok((frame, consumed)) => Ok(Decoded::Frame { frame, consumed }),
        Err(Error::IncompleteFrame { needed }) => Ok(Decoded::NeedMoreData(needed)),
        Err(e) => Err(e),
    }
}

/// Encode a frame from its parts. Pass a mask for client-originated frames.
#[must_use]
pub fn encode(opcode: OpCode, fin: bool, payload: &[u8], mask: Option<[u8; 4]>) -> BytesMut {
    Frame::new(fin, opcode, Bytes::copy_from_slice(payload)).encode(mask)
}
