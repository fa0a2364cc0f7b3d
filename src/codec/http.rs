//! Reading the HTTP head of the opening handshake off a channel.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::Limits;
use crate::error::{Error, Result};

const HEAD_END: &[u8] = b"\r\n\r\n";

/// Position just past the `\r\n\r\n` that ends the head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_END.len())
        .position(|window| window == HEAD_END)
        .map(|pos| pos + HEAD_END.len())
}

/// Read until the end of the HTTP head.
///
/// Returns the head and any bytes that arrived after it; the latter belong to
/// the frame stream.
///
/// # Errors
///
/// - `Error::HandshakeTooLarge` if no head end appears within
///   `limits.max_handshake_size` bytes
/// - `Error::InvalidHandshake` if the channel closes first
/// - `Error::Io` on read failure
pub async fn read_head<R>(io: &mut R, limits: &Limits) -> Result<(BytesMut, BytesMut)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let mut scanned: usize = 0;
    loop {
        // Re-scan the last few bytes in case the terminator straddles reads.
        let from = scanned.saturating_sub(HEAD_END.len() - 1);
        if let Some(end) = find_head_end(&buf[from..]) {
            let head_len = from + end;
            let rest = buf.split_off(head_len);
            return Ok((buf, rest));
        }
        limits.check_handshake_size(buf.len())?;
        scanned = buf.len();

        if io.read_buf(&mut buf).await? == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during handshake".into(),
            ));
        }
    }
}
