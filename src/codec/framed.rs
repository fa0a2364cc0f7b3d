use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{Decoded, decode};
use crate::protocol::mask::generate_mask;
use crate::protocol::validation::FrameValidator;
use crate::protocol::Frame;

const READ_CHUNK: usize = 8 * 1024;

/// Reads validated frames from the read half of a channel.
///
/// `read_frame` is cancel safe: the only suspension point is the channel
/// read, and buffered bytes survive a dropped future.
#[derive(Debug)]
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    validator: FrameValidator,
}

impl<R> FrameReader<R> {
    /// Create a reader. `buffered` holds bytes that were read past the end
    /// of the handshake head.
    #[must_use]
    pub fn new(io: R, validator: FrameValidator, buffered: BytesMut) -> Self {
        Self {
            io,
            buf: buffered,
            validator,
        }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed(None)` if the channel reached EOF
    /// - `Error::Io` on read failure
    /// - any protocol error raised while decoding
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Decoded::Frame { frame, consumed } = decode(&self.buf, &self.validator)? {
                self.buf.advance(consumed);
                return Ok(frame);
            }

            self.buf.reserve(READ_CHUNK);
            if self.io.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }
}

/// Writes frames to the write half of a channel, masking them when the local
/// role requires it.
#[derive(Debug)]
pub struct FrameWriter<W> {
    io: W,
    role: Role,
    buf: BytesMut,
}

impl<W> FrameWriter<W> {
    /// Create a writer for `role`.
    #[must_use]
    pub fn new(io: W, role: Role) -> Self {
        Self {
            io,
            role,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Get a reference to the underlying channel.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.io
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Encode `frames` and write them as one contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the channel write or flush fails.
    pub async fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        self.buf.clear();
        for frame in frames {
            let mask = self.role.must_mask().then(generate_mask);
            frame.encode_into(&mut self.buf, mask);
        }
        self.io.write_all(&self.buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Encode and write a single frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the channel write or flush fails.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frames(std::slice::from_ref(frame)).await
    }

    /// Shut down the write direction of the channel.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
